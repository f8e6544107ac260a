//! Fetcher behavior against a live HTTP server

use crate::support::test_config;
use atlas_walker::config::Config;
use atlas_walker::crawler::FetchClient;
use atlas_walker::FailureKind;
use std::net::TcpListener;
use std::path::Path;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    test_config(&server.uri(), Path::new("unused.json"))
}

fn page_url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_retry_then_success_issues_three_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .mount(&server)
        .await;

    let client = FetchClient::from_config(&config_for(&server)).unwrap();
    let body = client.fetch(&page_url(&server, "/flaky"), None).await;

    assert_eq!(body, Ok("finally".to_string()));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(client.requests_sent(), 3);
}

#[tokio::test]
async fn test_not_found_fails_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = FetchClient::from_config(&config_for(&server)).unwrap();
    let result = client.fetch(&page_url(&server, "/missing"), None).await;

    assert_eq!(result, Err(FailureKind::NotFound { status: 404 }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_retryable_status_exhausts_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = FetchClient::from_config(&config_for(&server)).unwrap();
    let result = client.fetch(&page_url(&server, "/busy"), None).await;

    assert_eq!(
        result,
        Err(FailureKind::ExhaustedRetries {
            attempts: 3,
            last: "HTTP 429".to_string()
        })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_short_body_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(200).set_body_string("checking your browser"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(200)))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.fetch.min_body_bytes = 100;
    let client = FetchClient::from_config(&config).unwrap();
    let body = client.fetch(&page_url(&server, "/guarded"), None).await.unwrap();

    assert_eq!(body.len(), 200);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_persistent_short_body_exhausts_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/interstitial"))
        .respond_with(ResponseTemplate::new(200).set_body_string("blocked"))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.fetch.min_body_bytes = 100;
    let client = FetchClient::from_config(&config).unwrap();
    let result = client.fetch(&page_url(&server, "/interstitial"), None).await;

    match result {
        Err(FailureKind::ExhaustedRetries { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.contains("short body"));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let base = format!("http://127.0.0.1:{}", port);
    let mut config = test_config(&base, Path::new("unused.json"));
    config.fetch.max_retries = 1;
    let client = FetchClient::from_config(&config).unwrap();

    let result = client
        .fetch(&Url::parse(&format!("{}/region.html", base)).unwrap(), None)
        .await;

    assert!(matches!(result, Err(FailureKind::Unreachable { .. })));
    assert_eq!(client.requests_sent(), 2);
}

#[tokio::test]
async fn test_retry_rotates_identity() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/profiled"))
        .and(header("user-agent", "agent-a"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/profiled"))
        .and(header("user-agent", "agent-b"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome b"))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.identity.user_agents = vec![
        "agent-a".to_string(),
        "agent-b".to_string(),
        "agent-c".to_string(),
    ];
    let client = FetchClient::from_config(&config).unwrap();
    let body = client.fetch(&page_url(&server, "/profiled"), None).await;

    assert_eq!(body, Ok("welcome b".to_string()));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_referer_and_browser_headers_sent() {
    let server = MockServer::start().await;
    let parent = page_url(&server, "/country/aa.html");

    Mock::given(method("GET"))
        .and(path("/list/aa-1.html"))
        .and(header("referer", parent.as_str()))
        .and(header("sec-fetch-mode", "navigate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("listing"))
        .mount(&server)
        .await;

    let client = FetchClient::from_config(&config_for(&server)).unwrap();
    let body = client
        .fetch(&page_url(&server, "/list/aa-1.html"), Some(&parent))
        .await;

    assert_eq!(body, Ok("listing".to_string()));
}

#[tokio::test]
async fn test_bootstrap_runs_once_and_keeps_cookies() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc; Path=/")
                .set_body_string("home"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("members only"))
        .mount(&server)
        .await;

    let client = FetchClient::from_config(&config_for(&server)).unwrap();
    let base = Url::parse(&server.uri()).unwrap();
    let paths = vec!["/".to_string()];

    client.bootstrap(&base, &paths).await;
    client.bootstrap(&base, &paths).await;

    let body = client.fetch(&page_url(&server, "/private"), None).await;
    assert_eq!(body, Ok("members only".to_string()));
    assert_eq!(crate::support::hits(&server, "/").await, 1);
}
