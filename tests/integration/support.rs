//! Shared fixtures for the integration tests

use atlas_walker::config::Config;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration pointed at a mock server, with no pacing and tiny backoff
pub fn test_config(base_url: &str, output: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.concurrency = 4;
    config.fetch.max_retries = 2;
    config.fetch.delay_min_ms = 0;
    config.fetch.delay_max_ms = 0;
    config.fetch.backoff_base_ms = 1;
    config.fetch.backoff_max_ms = 5;
    config.fetch.min_body_bytes = 0;
    config.fetch.timeout_secs = 5;
    config.fetch.connect_timeout_secs = 2;
    config.site.base_url = base_url.to_string();
    config.output.path = output.display().to_string();
    config
}

pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

/// Serves `body` for GET `route`
pub async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

pub fn link(href: &str, text: &str) -> String {
    format!(r#"<a href="{}">{}</a>"#, href, text)
}

pub fn hotels_in(href: &str, country: &str) -> String {
    format!(r#"<a href="{}"><span>Hotels in {}</span></a>"#, href, country)
}

pub fn next_link(href: &str) -> String {
    format!(r#"<a rel="next" href="{}">Next</a>"#, href)
}

pub fn property_card(href: &str, name: &str) -> String {
    format!(
        r#"<div data-testid="property-card"><a data-testid="title-link" href="{}"><div data-testid="title">{}</div></a></div>"#,
        href, name
    )
}

/// Number of requests the server received for `route`
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

pub fn read_output(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).expect("output file should exist");
    serde_json::from_str(&content).expect("output should be valid JSON")
}
