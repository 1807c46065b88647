//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock search sites and run the full
//! fetch, extract, flatten and persist cycle end-to-end.

use serde_json::json;
use sumi_harvest::config::Config;
use sumi_harvest::crawler::{crawl, CrawlOrchestrator};
use sumi_harvest::storage::{
    export_columns, CheckpointStore, CsvDatasetStore, DatasetStore, FileCheckpointStore,
};
use sumi_harvest::CrawlOutcome;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server, with no waits
fn create_test_config(server: &MockServer, dir: &tempfile::TempDir) -> Config {
    let mut config = Config::for_base_url(format!("{}/search?location=dubai", server.uri()));
    config.http.timeout_secs = 5;
    config.crawl.retry_delay_ms = 0;
    config.crawl.inter_page_delay_ms = 0;
    config.crawl.cooldown_secs = 0;
    config.output.dataset_path = dir.path().join("listings.csv");
    config
}

/// Builds a search page whose data island carries `count` listings
fn search_page(first_id: usize, count: usize) -> String {
    let listings: Vec<_> = (first_id..first_id + count)
        .map(|id| {
            json!({
                "property": {
                    "id": id.to_string(),
                    "title": format!("Apartment {}", id),
                    "price": {"value": 50_000 + id, "currency": "AED"},
                    "bedrooms": 2,
                    "images": [{"small": "a.jpg"}, {"small": "b.jpg"}]
                }
            })
        })
        .collect();
    data_island_page(&json!({
        "props": {"pageProps": {"searchResult": {"listings": listings}}}
    }))
}

fn data_island_page(data: &serde_json::Value) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>Properties for rent</title></head>
<body><div id="__next">Loading...</div>
<script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
        data
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

async fn mount_page(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", page.to_string().as_str()))
        .respond_with(response)
        .mount(server)
        .await;
}

fn stored_rows(config: &Config) -> usize {
    CsvDatasetStore::new(config.output.dataset_path.clone())
        .load()
        .unwrap()
        .len()
}

fn stored_page(config: &Config) -> u32 {
    FileCheckpointStore::new(config.checkpoint_path())
        .load()
        .unwrap()
        .unwrap()
        .last_page
}

#[tokio::test]
async fn test_full_harvest_until_empty_page() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, &dir);

    for page in 1..=3 {
        mount_page(&server, page, html(search_page((page as usize - 1) * 20 + 1, 20))).await;
    }
    mount_page(&server, 4, html(search_page(0, 0))).await;

    let report = crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.total_rows, 60);
    assert_eq!(report.resume_page, 4);
    assert_eq!(stored_rows(&config), 60);
    assert_eq!(stored_page(&config), 4);

    let csv = std::fs::read_to_string(&config.output.dataset_path).unwrap();
    let header = csv.lines().next().unwrap();
    assert_eq!(
        header,
        "property.id,property.title,property.price.value,property.price.currency,\
         property.bedrooms,property.images"
    );
    assert!(csv.contains("60,Apartment 60,50060,AED,2,"));
}

#[tokio::test]
async fn test_resume_skips_completed_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&server, &dir);

    for page in 1..=3 {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", page.to_string().as_str()))
            .respond_with(html(search_page((page as usize - 1) * 10 + 1, 10)))
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_page(&server, 4, html(search_page(0, 0))).await;

    // First run stops at the page limit
    config.crawl.max_pages = 2;
    let first = crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.total_rows, 20);
    assert_eq!(stored_page(&config), 3);

    // Second run carries on from page 3
    config.crawl.max_pages = 100;
    let second = crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.outcome, CrawlOutcome::Completed);
    assert_eq!(second.pages_fetched, 2);
    assert_eq!(second.total_rows, 30);
    assert_eq!(stored_rows(&config), 30);
}

#[tokio::test]
async fn test_transient_http_errors_are_retried() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, 1, html(search_page(1, 5))).await;
    mount_page(&server, 2, html(search_page(0, 0))).await;

    let report = crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.total_rows, 5);
}

#[tokio::test]
async fn test_path_mismatch_fails_instead_of_ending() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&server, &dir);
    config.crawl.max_consecutive_failures = 1;
    config.crawl.max_cooldowns = Some(0);

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .respond_with(html(data_island_page(&json!({"props": {"pageProps": {}}}))))
        .expect(3)
        .mount(&server)
        .await;

    let report = crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::Fatal);
    assert_eq!(report.resume_page, 1);
    assert_eq!(stored_page(&config), 1);
    assert_eq!(report.outcome.exit_code(), 1);
}

#[tokio::test]
async fn test_browser_headers_are_sent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&server, &dir);
    config
        .http
        .extra_headers
        .insert("Referer".to_string(), "https://example.com/".to_string());

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .and(header_regex("user-agent", "Mozilla/5.0|Chrome/"))
        .and(header_regex("accept-language", "^en"))
        .and(header("referer", "https://example.com/"))
        .respond_with(html(search_page(1, 3)))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, 2, html(search_page(0, 0))).await;

    let report = crawl(config, CancellationToken::new()).await.unwrap();
    assert_eq!(report.total_rows, 3);
}

#[tokio::test]
async fn test_export_selected_columns() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, &dir);

    mount_page(&server, 1, html(search_page(1, 2))).await;
    mount_page(&server, 2, html(search_page(0, 0))).await;

    crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();

    let out = dir.path().join("selected.csv");
    let columns = vec!["property.price.value".to_string(), "property.id".to_string()];
    let exported = export_columns(&config.output.dataset_path, &columns, &out).unwrap();

    assert_eq!(exported, 2);
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "property.price.value,property.id\n50001,1\n50002,2\n"
    );
}

#[tokio::test]
async fn test_fresh_start_discards_previous_harvest() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&server, &dir);

    mount_page(&server, 1, html(search_page(1, 4))).await;
    mount_page(&server, 2, html(search_page(0, 0))).await;

    crawl(config.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stored_rows(&config), 4);

    let mut orchestrator = CrawlOrchestrator::new(config.clone()).unwrap();
    orchestrator.reset_storage().unwrap();
    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.total_rows, 4);
    assert_eq!(stored_rows(&config), 4);
}
