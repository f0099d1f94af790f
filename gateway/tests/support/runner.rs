//! Docker Model Runner モック（wiremock）

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `/api/tags` と空の `/api/ps` を返すランナーを起動する
#[allow(dead_code)]
pub async fn spawn_runner(models: Value) -> MockServer {
    let server = MockServer::start().await;
    mount_tags(&server, models).await;
    mount_ps(&server, json!([])).await;
    server
}

/// `/api/tags` を登録する
#[allow(dead_code)]
pub async fn mount_tags(server: &MockServer, models: Value) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

/// `/api/ps` を登録する
#[allow(dead_code)]
pub async fn mount_ps(server: &MockServer, models: Value) {
    Mock::given(method("GET"))
        .and(path("/api/ps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

/// `/api/version` を登録する
#[allow(dead_code)]
pub async fn mount_version(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": version })))
        .mount(server)
        .await;
}

/// 指定パスへのリクエスト数
#[allow(dead_code)]
pub async fn request_count(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}
