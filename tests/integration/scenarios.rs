//! End-to-end crawl scenarios with a scripted page fetcher

use async_trait::async_trait;
use catalog_crawler::crawler::{
    discovered, CrawlLimits, Crawler, FetchError, FetchedPage, ModePlan, PageFetcher,
    RetryPolicy, RunMode, Seeding, StoreTarget,
};
use catalog_crawler::storage::{
    BookId, LogLevel, RunStatus, SeedUrl, SqliteStorage, Storage, UrlKind,
};
use catalog_crawler::{CandidateRecord, CrawlStatus, QueueStatus};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Answers each URL from its own script, in order; unscripted URLs are 404s
#[derive(Default)]
struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Vec<Result<FetchedPage, FetchError>>>>,
}

impl ScriptedFetcher {
    fn on(self, url: &str, response: Result<FetchedPage, FetchError>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(response);
        self
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, url: &str, _kind: UrlKind) -> Result<FetchedPage, FetchError> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(script) if !script.is_empty() => script.remove(0),
            _ => Err(FetchError::Permanent("HTTP 404".to_string())),
        }
    }
}

fn record(value: Value) -> Result<FetchedPage, FetchError> {
    Ok(FetchedPage::Record(CandidateRecord::from_value(value).unwrap()))
}

fn transient() -> Result<FetchedPage, FetchError> {
    Err(FetchError::Transient("connection reset".to_string()))
}

fn limits() -> CrawlLimits {
    CrawlLimits {
        max_concurrent_urls: 2,
        max_concurrent_pages: 1,
        delay_between_requests: Duration::ZERO,
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        save_404s: true,
    }
}

fn plan(mode: RunMode, seeding: Seeding) -> ModePlan {
    ModePlan {
        mode,
        seeding,
        limits: limits(),
        seed_budget: None,
        store: StoreTarget::Isolated(None),
    }
}

fn seed_detail(url: &str) -> Seeding {
    Seeding::Seeds(vec![SeedUrl::new(url, UrlKind::Detail, 0)])
}

fn queue_status<S: Storage>(storage: &S, url: &str) -> QueueStatus {
    storage.get_queue_item(url).unwrap().unwrap().status
}

#[tokio::test]
async fn test_valid_record_is_persisted() {
    let fetcher = ScriptedFetcher::default().on(
        "a",
        record(json!({"id": 1, "title": "T", "author": "A", "duration": "1ժ 0ր"})),
    );
    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        fetcher,
        plan(RunMode::Full, seed_detail("a")),
        "hash",
    );

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.totals.persisted, 1);
    assert_eq!(summary.totals.completed, 1);

    let storage = crawler.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_books().unwrap(), 1);

    let book = storage.get_book(&BookId::Numeric(1)).unwrap().unwrap();
    assert_eq!(book.duration_total_minutes, 60);
    assert_eq!(book.duration_formatted, "1ժ 0ր");
    assert_eq!(book.crawl_status, CrawlStatus::Completed);
    assert_eq!(book.source_url.as_deref(), Some("a"));
    assert_eq!(queue_status(&*storage, "a"), QueueStatus::Completed);
}

#[tokio::test]
async fn test_missing_author_is_rejected_but_completed() {
    let fetcher = ScriptedFetcher::default().on("a", record(json!({"id": 1, "title": "T"})));
    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        fetcher,
        plan(RunMode::Full, seed_detail("a")),
        "hash",
    );

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.totals.rejected, 1);
    assert_eq!(summary.totals.completed, 1);
    assert_eq!(summary.totals.failed, 0);

    let storage = crawler.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_books().unwrap(), 0);
    assert_eq!(queue_status(&*storage, "a"), QueueStatus::Completed);

    let logs = storage.get_logs(Some("a")).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Warn);
    assert_eq!(logs[0].url.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_transient_failures_exhaust_into_failed() {
    let fetcher = ScriptedFetcher::default()
        .on("a", transient())
        .on("a", transient())
        .on("a", transient())
        .on("a", transient());
    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        fetcher,
        plan(RunMode::Full, seed_detail("a")),
        "hash",
    );

    let summary = crawler.run().await.unwrap();
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(summary.retried, 2);

    let storage = crawler.storage();
    let storage = storage.lock().unwrap();
    let item = storage.get_queue_item("a").unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.attempts, 3);
    assert!(item.last_error.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_reseeding_completed_does_not_refetch() {
    let fetcher = ScriptedFetcher::default()
        .on("a", record(json!({"id": 1, "title": "T", "author": "A"})))
        .on("a", record(json!({"id": 1, "title": "Again", "author": "A"})));
    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        fetcher,
        plan(RunMode::Full, seed_detail("a")),
        "hash",
    );

    crawler.run().await.unwrap();
    let second = crawler.run().await.unwrap();

    assert_eq!(second.totals.completed, 0);
    let storage = crawler.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(queue_status(&*storage, "a"), QueueStatus::Completed);
    assert_eq!(
        storage.get_book(&BookId::Numeric(1)).unwrap().unwrap().title,
        "T"
    );
}

#[tokio::test]
async fn test_reseeding_failed_requeues() {
    let fetcher = ScriptedFetcher::default()
        .on("a", Err(FetchError::Permanent("HTTP 404".to_string())))
        .on("a", record(json!({"id": 1, "title": "T", "author": "A"})));
    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        fetcher,
        plan(RunMode::Full, seed_detail("a")),
        "hash",
    );

    let first = crawler.run().await.unwrap();
    assert_eq!(first.totals.failed, 1);

    let second = crawler.run().await.unwrap();
    assert_eq!(second.totals.persisted, 1);
}

#[tokio::test]
async fn test_update_mode_refreshes_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");

    let first = Crawler::new(
        SqliteStorage::new(&db_path).unwrap(),
        ScriptedFetcher::default().on("a", record(json!({"id": 7, "title": "Old", "author": "A"}))),
        plan(RunMode::Full, seed_detail("a")),
        "hash",
    );
    first.run().await.unwrap();
    let before = first
        .storage()
        .lock()
        .unwrap()
        .get_book(&BookId::Numeric(7))
        .unwrap()
        .unwrap();
    drop(first);

    tokio::time::sleep(Duration::from_millis(5)).await;

    let update = plan(
        RunMode::Update,
        Seeding::RefreshCompleted {
            older_than: Utc::now(),
            limit: None,
        },
    );
    let second = Crawler::new(
        SqliteStorage::new(&db_path).unwrap(),
        ScriptedFetcher::default().on("a", record(json!({"id": 7, "title": "New", "author": "A"}))),
        update,
        "hash",
    );
    let summary = second.run().await.unwrap();
    assert_eq!(summary.mode, RunMode::Update);
    assert_eq!(summary.totals.persisted, 1);

    let shared = second.storage();
    let storage = shared.lock().unwrap();
    assert_eq!(storage.count_books().unwrap(), 1);
    let after = storage.get_book(&BookId::Numeric(7)).unwrap().unwrap();
    assert_eq!(after.title, "New");
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn test_fix_download_all_refetches_rejected_links() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");

    let first = Crawler::new(
        SqliteStorage::new(&db_path).unwrap(),
        ScriptedFetcher::default()
            .on(
                "a",
                record(json!({
                    "id": 3,
                    "title": "T",
                    "author": "A",
                    "downloadUrl": "ftp://files.example.com/3.zip"
                })),
            )
            .on("b", record(json!({"id": 4, "title": "T"}))),
        plan(
            RunMode::Full,
            Seeding::Seeds(vec![
                SeedUrl::new("a", UrlKind::Detail, 0),
                SeedUrl::new("b", UrlKind::Detail, 0),
            ]),
        ),
        "hash",
    );
    let summary = first.run().await.unwrap();
    assert_eq!(summary.totals.rejected, 2);
    drop(first);

    let fetcher = ScriptedFetcher::default().on(
        "a",
        record(json!({
            "id": 3,
            "title": "T",
            "author": "A",
            "downloadUrl": "https://files.example.com/3.zip"
        })),
    );
    let second = Crawler::new(
        SqliteStorage::new(&db_path).unwrap(),
        fetcher,
        plan(RunMode::FixDownloadAll, Seeding::RequeueUrlRejected { limit: None }),
        "hash",
    );
    let summary = second.run().await.unwrap();

    // Only the link rejection is retried; the missing author stays settled
    assert_eq!(summary.totals.persisted, 1);
    assert_eq!(summary.totals.completed, 1);
    let shared = second.storage();
    let storage = shared.lock().unwrap();
    let book = storage.get_book(&BookId::Numeric(3)).unwrap().unwrap();
    assert_eq!(
        book.download_url.as_deref(),
        Some("https://files.example.com/3.zip")
    );
    assert!(!storage.get_queue_item("a").unwrap().unwrap().url_rejected);
}

#[tokio::test]
async fn test_listing_pages_feed_the_queue() {
    let root = "https://source.example/audiobooks";
    let fetcher = ScriptedFetcher::default()
        .on(
            root,
            Ok(FetchedPage::Listing(vec![
                discovered("/audiobooks?page=2", UrlKind::Listing),
                discovered("/book/1", UrlKind::Detail),
            ])),
        )
        .on(
            "https://source.example/audiobooks?page=2",
            Ok(FetchedPage::Listing(vec![
                discovered("/book/1", UrlKind::Detail),
                discovered("/book/2", UrlKind::Detail),
            ])),
        )
        .on(
            "https://source.example/book/1",
            record(json!({"id": 1, "title": "One", "author": "A"})),
        )
        .on(
            "https://source.example/book/2",
            record(json!({"id": "b-2", "title": "Two", "author": "<b>B</b>"})),
        );

    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        fetcher,
        plan(
            RunMode::Full,
            Seeding::Seeds(vec![SeedUrl::new(root, UrlKind::Listing, 100)]),
        ),
        "hash",
    );
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.totals.persisted, 2);
    assert_eq!(summary.totals.completed, 4);

    let shared = crawler.storage();
    let storage = shared.lock().unwrap();
    let two = storage
        .get_book(&BookId::Text("b-2".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(two.author, "B");
}

#[tokio::test]
async fn test_seed_budget_bounds_discovery() {
    let root = "https://source.example/audiobooks";
    let fetcher = ScriptedFetcher::default().on(
        root,
        Ok(FetchedPage::Listing(
            (1..=5)
                .map(|i| discovered(format!("/book/{}", i), UrlKind::Detail))
                .collect(),
        )),
    );
    let mut test_plan = plan(
        RunMode::Test,
        Seeding::Seeds(vec![SeedUrl::new(root, UrlKind::Listing, 100)]),
    );
    test_plan.seed_budget = Some(3);

    let crawler = Crawler::new(SqliteStorage::new_in_memory().unwrap(), fetcher, test_plan, "hash");
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.seeded, 1);
    assert_eq!(summary.discovered, 2);
    let shared = crawler.storage();
    let storage = shared.lock().unwrap();
    let total: u64 = storage.count_queue_by_status().unwrap().values().sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_permanent_failure_fetched_once() {
    let crawler = Crawler::new(
        SqliteStorage::new_in_memory().unwrap(),
        ScriptedFetcher::default(),
        plan(RunMode::Full, seed_detail("gone")),
        "hash",
    );
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(summary.retried, 0);
}
