//! 管理API（設定・接続確認）と認証の統合テスト

mod support;

use dmr_gateway::config::AuthConfig;
use reqwest::StatusCode;
use serde_json::{json, Value};
use support::gateway::{open_state, runner_config, spawn_gateway, state_with_auth};
use support::runner::{mount_version, request_count, spawn_runner};

fn auth(admin: Option<&str>, user: Option<&str>) -> AuthConfig {
    AuthConfig {
        admin_api_key: admin.map(str::to_string),
        api_key: user.map(str::to_string),
        disabled: false,
    }
}

#[tokio::test]
async fn config_update_prunes_out_of_range_entries() {
    let gateway = spawn_gateway(open_state(runner_config(json!({
        "DOCKER_MODEL_RUNNER_BASE_URLS": ["http://a:12434"]
    }))))
    .await;
    let client = reqwest::Client::new();

    let updated: Value = client
        .post(gateway.url("/config/update"))
        .json(&json!({
            "DOCKER_MODEL_RUNNER_BASE_URLS": ["http://b:12434/", "http://c:12434"],
            "DOCKER_MODEL_RUNNER_API_CONFIGS": {
                "0": {"prefix_id": "b"},
                "7": {"prefix_id": "gone"}
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(updated["ENABLE_DOCKER_MODEL_RUNNER_API"], json!(true));
    assert_eq!(
        updated["DOCKER_MODEL_RUNNER_BASE_URLS"],
        json!(["http://b:12434", "http://c:12434"])
    );
    assert_eq!(
        updated["DOCKER_MODEL_RUNNER_API_CONFIGS"]
            .as_object()
            .unwrap()
            .keys()
            .collect::<Vec<_>>(),
        vec!["0"]
    );

    let current: Value = client
        .get(gateway.url("/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current, updated);

    gateway.stop().await;
}

#[tokio::test]
async fn config_update_invalidates_catalogue() {
    let a = spawn_runner(json!([{"model": "a:latest"}])).await;
    let b = spawn_runner(json!([{"model": "b:latest"}])).await;
    let gateway = spawn_gateway(open_state(runner_config(json!({
        "DOCKER_MODEL_RUNNER_BASE_URLS": [a.uri()]
    }))))
    .await;
    let client = reqwest::Client::new();

    let before: Value = client
        .get(gateway.url("/api/tags"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["models"][0]["model"], "a:latest");

    client
        .post(gateway.url("/config/update"))
        .json(&json!({
            "DOCKER_MODEL_RUNNER_BASE_URLS": [b.uri()],
            "DOCKER_MODEL_RUNNER_API_CONFIGS": {}
        }))
        .send()
        .await
        .unwrap();

    let after: Value = client
        .get(gateway.url("/api/tags"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["models"][0]["model"], "b:latest");

    gateway.stop().await;
}

#[tokio::test]
async fn verify_returns_backend_version() {
    let runner = spawn_runner(json!([])).await;
    mount_version(&runner, "0.7.0").await;
    let gateway = spawn_gateway(open_state(runner_config(json!({})))).await;

    let body: Value = reqwest::Client::new()
        .post(gateway.url("/verify"))
        .json(&json!({"url": runner.uri(), "key": ""}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"version": "0.7.0"}));

    gateway.stop().await;
}

#[tokio::test]
async fn verify_unreachable_backend_is_500() {
    let gateway = spawn_gateway(open_state(runner_config(json!({})))).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/verify"))
        .json(&json!({"url": "http://127.0.0.1:1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Server Connection Error"}));

    gateway.stop().await;
}

#[tokio::test]
async fn admin_routes_are_forbidden_without_configured_key() {
    let gateway = spawn_gateway(state_with_auth(runner_config(json!({})), auth(None, None))).await;

    let response = reqwest::get(gateway.url("/config")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    gateway.stop().await;
}

#[tokio::test]
async fn admin_routes_require_matching_key() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    let state = state_with_auth(
        runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]})),
        auth(Some("admin-secret"), None),
    );
    let gateway = spawn_gateway(state).await;
    let client = reqwest::Client::new();

    let missing = client.get(gateway.url("/config")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .get(gateway.url("/config"))
        .header("x-api-key", "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = client
        .get(gateway.url("/config"))
        .bearer_auth("admin-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    // 推論系はユーザーキー未設定なら公開
    let tags = client.get(gateway.url("/api/tags")).send().await.unwrap();
    assert_eq!(tags.status(), StatusCode::OK);

    gateway.stop().await;
}

#[tokio::test]
async fn user_key_guards_inference_routes() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    let state = state_with_auth(
        runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]})),
        auth(Some("admin-secret"), Some("user-secret")),
    );
    let gateway = spawn_gateway(state).await;
    let client = reqwest::Client::new();

    let denied = client.get(gateway.url("/api/tags")).send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(request_count(&runner, "/api/tags").await, 0);

    let allowed = client
        .get(gateway.url("/api/tags"))
        .header("x-api-key", "user-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let health = client.get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    gateway.stop().await;
}
