// HTTP-level tests of the hosting-site client against a mock server

use pressdeck::config::SourceConfig;
use pressdeck::error::{DetectionError, ListError};
use pressdeck::source::{ContentEntry, ContentSource, GitHubClient, OrganizationSource};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::with_config(SourceConfig {
        web_base_url: server.uri(),
        raw_base_url: server.uri(),
        api_base_url: server.uri(),
        ..Default::default()
    })
}

// ── Raw files ───────────────────────────────────────────────────

#[tokio::test]
async fn fetches_raw_file_by_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/seo/main/seo.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<?php\n/* Plugin Name: SEO */"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client(&server).fetch_raw("acme", "seo", "main", "seo.php").await.unwrap();
    assert_eq!(body.as_deref(), Some("<?php\n/* Plugin Name: SEO */"));
}

#[tokio::test]
async fn missing_raw_file_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let body = client(&server).fetch_raw("acme", "seo", "main", "seo.php").await.unwrap();
    assert_eq!(body, None);
}

#[tokio::test]
async fn raw_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let result = client(&server).fetch_raw("acme", "seo", "main", "seo.php").await;
    assert_eq!(result, Err(DetectionError::RateLimited));
}

#[tokio::test]
async fn nested_paths_keep_separators() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/seo/master/plugin/my%20seo.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<?php"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client(&server)
        .fetch_raw("acme", "seo", "master", "plugin/my seo.php")
        .await
        .unwrap();
    assert!(body.is_some());
}

// ── Directory listings ──────────────────────────────────────────

#[tokio::test]
async fn lists_directory_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/seo/contents"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "name": "seo.php", "type": "file", "size": 120 },
            { "name": "includes", "type": "dir" },
            { "name": "vendor", "type": "symlink" }
        ])))
        .mount(&server)
        .await;

    let entries = client(&server).list_directory("acme", "seo", "").await.unwrap().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], ContentEntry::file("seo.php"));
    assert_eq!(entries[1], ContentEntry::dir("includes"));
}

#[tokio::test]
async fn exhausted_api_quota_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/seo/contents/src"))
        .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
        .mount(&server)
        .await;

    let result = client(&server).list_directory("acme", "seo", "src").await;
    assert_eq!(result, Err(DetectionError::RateLimited));
}

#[tokio::test]
async fn forbidden_listing_without_quota_header_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = client(&server).list_directory("acme", "seo", "").await;
    assert_eq!(result, Ok(None));
}

// ── Organization pages ──────────────────────────────────────────

#[tokio::test]
async fn fetches_organization_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme"))
        .and(query_param("tab", "repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>repos</html>"))
        .mount(&server)
        .await;

    let html = client(&server).fetch_organization_page("acme").await.unwrap();
    assert_eq!(html, "<html>repos</html>");
}

#[tokio::test]
async fn unknown_organization_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client(&server).fetch_organization_page("ghost").await;
    assert_eq!(result, Err(ListError::Status(404)));
}

#[test]
fn archive_url_points_at_branch_zip() {
    let client = GitHubClient::new();
    assert_eq!(
        client.archive_url("acme", "seo", "master"),
        "https://github.com/acme/seo/archive/refs/heads/master.zip"
    );
}
