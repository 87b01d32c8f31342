//! State module for tracking crawl progress
//!
//! This module provides the lifecycle enums for queue items and stored books.
//!
//! # Components
//!
//! - `QueueStatus`: Tracks a URL through the queue (pending, processing, completed, failed)
//! - `CrawlStatus`: Tracks the crawl lifecycle of a persisted book

mod crawl_status;
mod queue_status;

// Re-export main types
pub use crawl_status::CrawlStatus;
pub use queue_status::QueueStatus;
