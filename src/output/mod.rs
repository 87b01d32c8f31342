//! Output module for status reports and run summaries
//!
//! This module handles:
//! - Loading aggregate queue and book counts from the store
//! - Rendering the status report and a finished run's summary to the console

pub mod stats;

pub use stats::{load_status, print_statistics, StatusReport};

use crate::crawler::{ModePlan, RunSummary, Seeding, StoreTarget};

/// Prints a finished run's summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Run {} ({}) ===\n", summary.run_id, summary.mode);
    println!("Status: {}", summary.status.to_db_string());
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    println!("Queue:");
    println!("  Recovered from a previous run: {}", summary.recovered);
    println!("  Seeded: {}", summary.seeded);
    println!("  Discovered: {}", summary.discovered);
    println!("  Retried: {}", summary.retried);
    println!();
    println!("Outcomes:");
    println!("  Completed: {}", summary.totals.completed);
    println!("    Persisted: {}", summary.totals.persisted);
    println!("    Rejected: {}", summary.totals.rejected);
    println!("  Failed: {}", summary.totals.failed);
}

/// Prints what a mode plan would do without running it
pub fn print_plan(plan: &ModePlan) {
    println!("=== Catalog Crawler Dry Run ===\n");
    println!("Mode: {}", plan.mode);

    println!("\nLimits:");
    println!("  Max concurrent URLs: {}", plan.limits.max_concurrent_urls);
    println!("  Max concurrent listing pages: {}", plan.limits.max_concurrent_pages);
    println!(
        "  Delay between requests: {}ms",
        plan.limits.delay_between_requests.as_millis()
    );
    println!("  Timeout: {}ms", plan.limits.timeout.as_millis());
    println!(
        "  Retry attempts: {} (backoff {}ms, capped at {}ms)",
        plan.limits.retry.retry_attempts,
        plan.limits.retry.initial_backoff.as_millis(),
        plan.limits.retry.max_backoff.as_millis()
    );

    println!("\nStore:");
    match &plan.store {
        StoreTarget::Primary(path) => println!("  Database: {}", path.display()),
        StoreTarget::Isolated(Some(path)) => println!("  Test database: {}", path.display()),
        StoreTarget::Isolated(None) => println!("  In-memory database"),
    }

    println!("\nSeeding:");
    match &plan.seeding {
        Seeding::Seeds(seeds) => {
            println!("  {} seed URLs", seeds.len());
            for seed in seeds {
                println!("    * [{}] {} (priority {})", seed.kind, seed.url, seed.priority);
            }
        }
        Seeding::RefreshCompleted { older_than, limit } => {
            println!("  Refresh completed detail pages older than {}", older_than);
            if let Some(limit) = limit {
                println!("  At most {} pages", limit);
            }
        }
        Seeding::RequeueUrlRejected { limit } => {
            println!("  Refetch detail pages whose links were rejected");
            if let Some(limit) = limit {
                println!("  At most {} pages", limit);
            }
        }
    }

    if let Some(budget) = plan.seed_budget {
        println!("\nSeed budget: {} URLs", budget);
    }

    println!("\n✓ Configuration is valid");
}
