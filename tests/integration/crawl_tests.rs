//! Integration tests for the archiver
//!
//! These tests use wiremock to stand in for a WebDriver server and drive
//! the crawl engine through the real HTTP client end-to-end.

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tidemark::browser::{BrowserError, BrowserLauncher, Locator, WebDriverLauncher};
use tidemark::config::{parse_config, validate, Config, ConfigOverrides};
use tidemark::crawler::{markup, CrawlContext, CrawlScheduler};
use tidemark::storage::{Kind, Ledger, Owner, OwnerPaths, RecordStore};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const SESSION: &str = "/session/s1";

fn value(v: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "value": v }))
}

fn no_such_element() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "value": {
            "error": "no such element",
            "message": "Unable to locate element",
            "stacktrace": ""
        }
    }))
}

/// Mounts session creation, navigation and teardown
async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(value(json!({ "sessionId": "s1", "capabilities": {} })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/url", SESSION)))
        .respond_with(value(json!(null)))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(SESSION))
        .respond_with(value(json!(null)))
        .mount(server)
        .await;
}

fn test_config(server: &MockServer, data_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.browser.webdriver_url = server.uri();
    config.crawler.retry_delay_ms = 1;
    config.crawler.settle_delay_ms = 1;
    config.crawler.scroll_delay_ms = 1;
    config.output.data_dir = data_dir.path().to_path_buf();
    config
}

async fn count_requests(server: &MockServer, verb: &str, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.to_string() == verb && r.url.path() == url_path)
        .count()
}

#[tokio::test]
async fn test_webdriver_session_commands() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/element", SESSION)))
        .and(body_partial_json(json!({ "using": "css selector", "value": "article" })))
        .respond_with(value(json!({ ELEMENT_KEY: "e1" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/element", SESSION)))
        .and(body_partial_json(json!({ "using": "xpath" })))
        .respond_with(no_such_element())
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/element/e1/text", SESSION)))
        .respond_with(value(json!("Hello world")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/element/e1/attribute/href", SESSION)))
        .respond_with(value(json!("/alice/status/111")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/element/e1/screenshot", SESSION)))
        .respond_with(value(json!("iVBORw0KGgo=")))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.browser.webdriver_url = server.uri();
    let launcher = WebDriverLauncher::new(&config.browser, None).unwrap();
    let browser = launcher.launch().await.unwrap();

    browser.navigate("https://twitter.com/alice").await.unwrap();

    let article = browser
        .find_first(&Locator::css("article"))
        .await
        .unwrap()
        .expect("article should be found");
    assert_eq!(browser.text(&article).await.unwrap(), "Hello world");
    assert_eq!(
        browser.attribute(&article, "href").await.unwrap(),
        Some("/alice/status/111".to_string())
    );
    assert_eq!(
        browser.screenshot(&article).await.unwrap(),
        vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
    );

    let missing = browser.find_first(&Locator::xpath("//nothing")).await.unwrap();
    assert!(missing.is_none());

    browser.quit().await.unwrap();
    assert_eq!(count_requests(&server, "DELETE", SESSION).await, 1);
}

#[tokio::test]
async fn test_webdriver_errors_surface() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "value": { "error": "session not created", "message": "no firefox binary" }
        })))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.browser.webdriver_url = server.uri();
    let launcher = WebDriverLauncher::new(&config.browser, None).unwrap();

    match launcher.launch().await {
        Err(BrowserError::Protocol { status, error, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(error, "session not created");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("launch should fail"),
    }
}

#[tokio::test]
async fn test_day_without_results_over_webdriver() {
    let server = MockServer::start().await;
    let data_dir = TempDir::new().unwrap();
    mount_session(&server).await;

    let owner = Owner::parse("Alice").unwrap();
    let day = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let query = markup::search_query(&owner, day);

    // The first render is rate limited, the second is a normal page.
    Mock::given(method("GET"))
        .and(path(format!("{}/source", SESSION)))
        .respond_with(value(json!(format!(
            "<html><body><span>{}</span></body></html>",
            markup::RATE_LIMITED_BANNER
        ))))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/source", SESSION)))
        .respond_with(value(json!("<html><body><main></main></body></html>")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/element", SESSION)))
        .and(body_partial_json(json!({
            "using": "xpath",
            "value": markup::no_results(&query).value()
        })))
        .respond_with(value(json!({ ELEMENT_KEY: "notice" })))
        .mount(&server)
        .await;

    let config = test_config(&server, &data_dir);
    let launcher: Arc<dyn BrowserLauncher> =
        Arc::new(WebDriverLauncher::new(&config.browser, None).unwrap());
    let ctx = CrawlContext::open(owner, &config, launcher, None, CancellationToken::new()).unwrap();

    let mut scheduler = CrawlScheduler::new(ctx, Some(day), day, false).unwrap();
    let report = scheduler.run().await.unwrap();

    assert_eq!(report.days, 1);
    assert_eq!(report.discovered, 0);
    assert_eq!(report.archived, 0);

    // One browser per load attempt, each torn down.
    assert_eq!(count_requests(&server, "POST", "/session").await, 2);
    assert_eq!(count_requests(&server, "DELETE", SESSION).await, 2);

    let ctx = scheduler.into_context();
    assert_eq!(ctx.checkpoint.load().unwrap(), Some(day));
    let checkpoint = std::fs::read_to_string(data_dir.path().join("alice/alice.lock")).unwrap();
    assert_eq!(checkpoint, "2021-01-01");
}

#[test]
fn test_ledger_survives_reopen_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let owner = Owner::parse("alice").unwrap();
    let record = tidemark::Record {
        id: "111".to_string(),
        timestamp: chrono::DateTime::parse_from_rfc3339("2021-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
        kind: Kind::Reply,
        text: "a | b \"quoted\"".to_string(),
    };

    {
        let mut ledger = Ledger::open(OwnerPaths::new(dir.path(), &owner)).unwrap();
        assert!(ledger.append(&record).unwrap());
    }

    let mut ledger = Ledger::open(OwnerPaths::new(dir.path(), &owner)).unwrap();
    assert!(ledger.contains("111"));
    assert!(!ledger.append(&record).unwrap());
    assert_eq!(ledger.records().unwrap(), vec![record]);
}

#[test]
fn test_legacy_ledger_rows_are_read() {
    let dir = TempDir::new().unwrap();
    let owner = Owner::parse("bob").unwrap();
    let paths = OwnerPaths::new(dir.path(), &owner);
    paths.ensure_dirs().unwrap();
    std::fs::write(
        &paths.ledger,
        "1|2020-05-01T12:30:00|T|first post\n2|2020-05-02T08:00:00|C|a reply\n",
    )
    .unwrap();

    let ledger = Ledger::open(paths).unwrap();
    let records = ledger.records().unwrap();

    assert_eq!(ledger.len(), 2);
    assert_eq!(records[0].kind, Kind::Original);
    assert_eq!(records[1].kind, Kind::Reply);
    assert_eq!(records[1].text, "a reply");
}

#[test]
fn test_config_file_with_overrides() {
    let mut config = parse_config(
        r#"
        [crawler]
        max-retries = 5
        reuse-browser = true

        [proxy]
        enabled = false

        [output]
        data-dir = "archive"
        "#,
    )
    .unwrap();

    config.apply(ConfigOverrides {
        use_tor: Some(true),
        data_dir: Some("elsewhere".into()),
        ..ConfigOverrides::default()
    });
    validate(&config).unwrap();

    assert_eq!(config.crawler.max_retries, 5);
    assert!(config.crawler.reuse_browser);
    assert!(config.proxy.enabled);
    assert_eq!(config.output.data_dir, std::path::PathBuf::from("elsewhere"));
    assert_eq!(config.crawler.retry_delay_ms, 10_000);
}
