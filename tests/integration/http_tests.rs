use crate::common::listing_page;
use catalog_harvest::backend::{BackendError, GenerativeBackend, HttpGenerativeBackend};
use catalog_harvest::config::{GeneratorConfig, UserAgentConfig};
use catalog_harvest::fetch::{FetchOptions, HttpFetcher, PageFetcher};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    let agent = UserAgentConfig {
        crawler_name: "HarvestTest".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/about".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    HttpFetcher::from_config(&agent, Duration::from_secs(5)).unwrap()
}

fn no_wait() -> FetchOptions {
    FetchOptions {
        wait_for_dynamic: false,
        ..FetchOptions::default()
    }
}

#[tokio::test]
async fn test_fetch_html_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tvs.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(listing_page(3, true), "text/html"))
        .mount(&server)
        .await;

    let outcome = fetcher()
        .fetch(&format!("{}/tvs.html", server.uri()), &no_wait())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, Some(200));
    assert!(outcome.content.unwrap().contains("ProductTile_3"));
}

#[tokio::test]
async fn test_fetch_reports_failures_in_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy.html"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let fetcher = fetcher();

    let missing = fetcher
        .fetch(&format!("{}/missing.html", server.uri()), &no_wait())
        .await;
    assert!(!missing.success);
    assert_eq!(missing.status_code, Some(404));
    assert!(missing.error.unwrap().contains("404"));

    let json = fetcher
        .fetch(&format!("{}/feed.json", server.uri()), &no_wait())
        .await;
    assert!(!json.success);
    assert!(json.error.unwrap().contains("Not an HTML page"));

    let busy = fetcher
        .fetch(&format!("{}/busy.html", server.uri()), &no_wait())
        .await;
    assert_eq!(busy.status_code, Some(429));
    assert!(busy.into_result().is_err());

    let unreachable = fetcher.fetch("http://127.0.0.1:9/", &no_wait()).await;
    assert!(!unreachable.success);
    assert_eq!(unreachable.status_code, None);
}

#[tokio::test]
async fn test_script_shell_is_fetched_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/grocery.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><div id=\"app\"></div><script>boot()</script></body></html>",
            "text/html",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/grocery.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(listing_page(12, true), "text/html"))
        .mount(&server)
        .await;

    let options = FetchOptions {
        wait_for_dynamic: true,
        settle_delay: Duration::from_millis(10),
        max_attempts: 3,
    };
    let outcome = fetcher()
        .fetch(&format!("{}/grocery.html", server.uri()), &options)
        .await;

    assert!(outcome.success);
    assert!(outcome.content.unwrap().contains("ProductTile_12"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_generative_backend_returns_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/test-model:generateContent"))
        .and(query_param("key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "NAVI"}, {"text": "GATION"}]}}]
        })))
        .mount(&server)
        .await;

    let backend =
        HttpGenerativeBackend::new(server.uri(), "test-model", "secret", Duration::from_secs(5))
            .unwrap();
    assert_eq!(backend.generate("Is this a listing?").await.unwrap(), "NAVIGATION");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Is this a listing?");
}

#[tokio::test]
async fn test_generative_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/down:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/silent:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let down = HttpGenerativeBackend::new(server.uri(), "down", "k", Duration::from_secs(5)).unwrap();
    match down.generate("prompt").await {
        Err(BackendError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected status error, got {:?}", other),
    }

    let silent =
        HttpGenerativeBackend::new(server.uri(), "silent", "k", Duration::from_secs(5)).unwrap();
    assert!(matches!(
        silent.generate("prompt").await,
        Err(BackendError::EmptyResponse)
    ));

    let config = GeneratorConfig {
        endpoint: server.uri(),
        model: "down".to_string(),
        api_key_env: "CATALOG_HARVEST_TEST_KEY_ABSENT".to_string(),
        request_timeout_secs: 5,
    };
    assert!(matches!(
        HttpGenerativeBackend::from_config(&config),
        Err(BackendError::MissingApiKey(_))
    ));
}
