//! Integration tests for the HTTP fetch adapter and full crawls
//!
//! These tests use wiremock to stand in for the extraction service.

use catalog_crawler::config::{
    Config, CrawlerConfig, FetcherConfig, ModesConfig, OutputConfig,
};
use catalog_crawler::crawler::{
    crawl, FetchError, FetchedPage, HttpPageFetcher, PageFetcher, RunMode,
    DISCOVERED_DETAIL_PRIORITY,
};
use catalog_crawler::storage::{BookId, RunStatus, SeedUrl, SqliteStorage, Storage, UrlKind};
use catalog_crawler::QueueStatus;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_config(endpoint: String) -> FetcherConfig {
    FetcherConfig {
        endpoint,
        user_agent: "catalog-crawler/test".to_string(),
    }
}

fn fetcher_for(server: &MockServer) -> HttpPageFetcher {
    HttpPageFetcher::new(
        &fetcher_config(format!("{}/extract", server.uri())),
        Duration::from_secs(5),
    )
    .expect("Failed to build HTTP client")
}

/// Creates a test configuration pointing at the given extraction endpoint
fn create_test_config(endpoint: String, db_path: &str, test_db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_urls: 2,
            max_concurrent_pages: 1,
            delay_between_requests: 0,
            timeout: 5_000,
            retry_attempts: 2,
            retry_backoff: 10,
            max_retry_backoff: 20,
            save_404s: true,
        },
        fetcher: fetcher_config(endpoint),
        output: OutputConfig {
            database_path: db_path.to_string(),
            test_database_path: Some(test_db_path.to_string()),
        },
        modes: ModesConfig {
            update_freshness_hours: 168,
            update_limit: None,
            fix_limit: None,
            test_limit: 10,
        },
        seeds: vec![SeedUrl::new(
            "https://source.example/audiobooks",
            UrlKind::Listing,
            100,
        )],
    }
}

#[tokio::test]
async fn test_detail_page_yields_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .and(query_param("url", "https://source.example/book/1"))
        .and(query_param("kind", "detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "title": "Title",
            "author": "Author",
            "duration": "2ժ 5ր"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetcher_for(&server)
        .fetch_page("https://source.example/book/1", UrlKind::Detail)
        .await
        .expect("fetch should succeed");

    match page {
        FetchedPage::Record(candidate) => {
            assert_eq!(candidate.get("title"), Some(&json!("Title")));
            assert_eq!(candidate.book_id(), Some(BookId::Numeric(1)));
        }
        other => panic!("expected a record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_listing_page_yields_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .and(query_param("kind", "listing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "urls": [
                {"url": "/audiobooks?page=2", "kind": "listing", "priority": 90},
                {"url": "/book/1", "kind": "detail"}
            ]
        })))
        .mount(&server)
        .await;

    let page = fetcher_for(&server)
        .fetch_page("https://source.example/audiobooks", UrlKind::Listing)
        .await
        .expect("fetch should succeed");

    match page {
        FetchedPage::Listing(urls) => {
            assert_eq!(urls.len(), 2);
            assert_eq!(urls[0].kind, UrlKind::Listing);
            assert_eq!(urls[0].priority, 90);
            assert_eq!(urls[1].url, "/book/1");
            assert_eq!(urls[1].priority, DISCOVERED_DETAIL_PRIORITY);
        }
        other => panic!("expected a listing, got {:?}", other),
    }
}

#[tokio::test]
async fn test_status_classification() {
    let server = MockServer::start().await;
    for (page, status) in [("/gone", 404), ("/busy", 503), ("/slow-down", 429), ("/forbidden", 403)] {
        Mock::given(method("GET"))
            .and(path("/extract"))
            .and(query_param("url", format!("https://source.example{}", page)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let fetcher = fetcher_for(&server);
    let classify = |page: &'static str| {
        let fetcher = &fetcher;
        async move {
            fetcher
                .fetch_page(&format!("https://source.example{}", page), UrlKind::Detail)
                .await
                .expect_err("fetch should fail")
        }
    };

    assert_eq!(
        classify("/gone").await,
        FetchError::Permanent("HTTP 404".to_string())
    );
    assert_eq!(
        classify("/busy").await,
        FetchError::Transient("HTTP 503".to_string())
    );
    assert!(classify("/slow-down").await.is_retryable());
    assert!(!classify("/forbidden").await.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let error = fetcher_for(&server)
        .fetch_page("https://source.example/book/1", UrlKind::Detail)
        .await
        .expect_err("fetch should fail");
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_non_object_record_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&server)
        .await;

    let error = fetcher_for(&server)
        .fetch_page("https://source.example/book/1", UrlKind::Detail)
        .await
        .expect_err("fetch should fail");
    assert_eq!(
        error,
        FetchError::Permanent("record body is not a JSON object".to_string())
    );
}

#[tokio::test]
async fn test_slow_response_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 1}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(
        &fetcher_config(format!("{}/extract", server.uri())),
        Duration::from_millis(50),
    )
    .expect("Failed to build HTTP client");

    let error = fetcher
        .fetch_page("https://source.example/book/1", UrlKind::Detail)
        .await
        .expect_err("fetch should time out");
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_test_mode_crawl_uses_isolated_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .and(query_param("url", "https://source.example/audiobooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "urls": [
                {"url": "/book/1", "kind": "detail"},
                {"url": "/book/2", "kind": "detail"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/extract"))
        .and(query_param("url", "https://source.example/book/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "title": "  The <i>First</i> Book ",
            "author": "Author",
            "category": "",
            "duration": "1 hour 30 min",
            "rating": 4.5,
            "mainAudioUrl": "https://cdn.example/1.mp3"
        })))
        .mount(&server)
        .await;
    // /book/2 falls through to wiremock's default 404

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("catalog.db");
    let test_db_path = dir.path().join("catalog-test.db");
    let config = create_test_config(
        format!("{}/extract", server.uri()),
        db_path.to_str().unwrap(),
        test_db_path.to_str().unwrap(),
    );

    let summary = crawl(&config, "hash", RunMode::Test, CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.totals.persisted, 1);
    assert_eq!(summary.totals.failed, 1);
    assert!(!db_path.exists(), "production database must stay untouched");

    let storage = SqliteStorage::new(&test_db_path).expect("Failed to open test database");
    let book = storage
        .get_book(&BookId::Numeric(1))
        .unwrap()
        .expect("book should be stored");
    assert_eq!(book.title, "The First Book");
    assert_eq!(book.category, "Unknown");
    assert_eq!(book.duration_total_minutes, 90);
    assert_eq!(book.rating, Some(4.5));

    let failed = storage
        .get_queue_item("https://source.example/book/2")
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("HTTP 404"));

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.mode, "test");
    assert_eq!(run.status, RunStatus::Completed);
}
