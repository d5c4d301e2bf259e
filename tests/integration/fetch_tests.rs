//! Fetcher behavior against a real HTTP server

use catalog_harvest::config::{PipelineConfig, SiteConfig};
use catalog_harvest::crawler::{Fetcher, HttpSource, RetryPolicy};
use catalog_harvest::FetchError;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(max_attempts: u32) -> Fetcher {
    let pipeline = PipelineConfig {
        max_attempts,
        backoff_base_ms: 1,
        backoff_max_ms: 10,
        ..PipelineConfig::default()
    };
    let source = HttpSource::from_config(&SiteConfig::default(), &pipeline).unwrap();
    Fetcher::new(Arc::new(source), RetryPolicy::from_config(&pipeline))
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_always_503_attempted_exactly_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = fetcher(3).fetch(&url(&server, "/flaky")).await;

    assert_eq!(result.unwrap_err(), FetchError::ServerError(503));
}

#[tokio::test]
async fn test_404_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher(3).fetch(&url(&server, "/missing")).await;

    assert_eq!(result.unwrap_err(), FetchError::ClientRejected(404));
}

#[tokio::test]
async fn test_retry_after_honored_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let document = fetcher(3).fetch(&url(&server, "/busy")).await.unwrap();

    assert_eq!(document.body, "<html>ok</html>");
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let pipeline = PipelineConfig::default();
    let source = HttpSource::from_config(&SiteConfig::default(), &pipeline).unwrap();
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        timeout: Duration::from_millis(100),
    };
    let fetcher = Fetcher::new(Arc::new(source), policy);

    let result = fetcher.fetch(&url(&server, "/slow")).await;

    assert_eq!(result.unwrap_err(), FetchError::Timeout);
}
