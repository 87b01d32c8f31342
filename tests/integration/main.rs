//! Integration test harness
//!
//! - `scenarios`: end-to-end runs against an in-process scripted fetcher
//! - `crawl_tests`: the HTTP fetch adapter and full crawls against wiremock

mod crawl_tests;
mod scenarios;
