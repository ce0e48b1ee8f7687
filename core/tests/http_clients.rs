//! HTTP collaborators against a local mock server.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use resurrect_core::{HttpUrlValidator, NpmLookup, NpmRegistryClient, RemedyError, UrlValidator};
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn npm_lookup_returns_latest_dist_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .and(header_exists("accept"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "left-pad",
            "dist-tags": { "latest": "1.3.0", "next": "2.0.0-rc.1" },
            "versions": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = NpmRegistryClient::new(server.uri(), TIMEOUT).expect("client");
    let latest = client.find_npm_alternative("left-pad").await.expect("lookup");
    assert_eq!(latest.as_deref(), Some("1.3.0"));
}

#[tokio::test]
async fn npm_lookup_of_unpublished_package_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/never-published"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Not found"})))
        .mount(&server)
        .await;

    let client = NpmRegistryClient::new(server.uri(), TIMEOUT).expect("client");
    assert_eq!(
        client
            .find_npm_alternative("never-published")
            .await
            .expect("lookup"),
        None
    );
}

#[tokio::test]
async fn npm_server_errors_are_network_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = NpmRegistryClient::new(server.uri(), TIMEOUT).expect("client");
    let err = client.find_npm_alternative("anything").await.unwrap_err();
    assert!(matches!(err, RemedyError::Network { .. }));
}

#[tokio::test]
async fn validator_reports_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/dist/alive-1.0.0.tgz"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/dist/gone-1.0.0.tgz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let validator = HttpUrlValidator::new(TIMEOUT).expect("validator");

    let alive = validator
        .validate(&format!("{}/dist/alive-1.0.0.tgz", server.uri()))
        .await
        .expect("validate");
    assert!(alive.is_valid);
    assert_eq!(alive.status_code, Some(200));

    let gone = validator
        .validate(&format!("{}/dist/gone-1.0.0.tgz", server.uri()))
        .await
        .expect("validate");
    assert!(!gone.is_valid);
    assert_eq!(gone.status_code, Some(404));
}

#[tokio::test]
async fn validator_falls_back_to_get_when_head_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/archive/v1.tar.gz"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/v1.tar.gz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let validator = HttpUrlValidator::new(TIMEOUT).expect("validator");
    let result = validator
        .validate(&format!("{}/archive/v1.tar.gz", server.uri()))
        .await
        .expect("validate");
    assert!(result.is_valid);
}

#[tokio::test]
async fn slow_servers_time_out_as_errors() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let validator = HttpUrlValidator::new(Duration::from_millis(200)).expect("validator");
    let err = validator
        .validate(&format!("{}/slow.tgz", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, RemedyError::Network { .. }));
}

#[tokio::test]
async fn non_url_specifiers_are_invalid_without_a_request() {
    let validator = HttpUrlValidator::new(TIMEOUT).expect("validator");
    let result = validator.validate("^1.2.3").await.expect("validate");
    assert!(!result.is_valid);
    assert_eq!(result.status_code, None);
}
