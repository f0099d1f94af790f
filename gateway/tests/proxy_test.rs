//! chat / generate / embed / pull / show / delete の転送テスト

mod support;

use reqwest::StatusCode;
use serde_json::{json, Value};
use support::gateway::{open_state, runner_config, spawn_gateway};
use support::runner::{request_count, spawn_runner};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn chat_stream_strips_prefix_and_returns_ndjson() {
    let runner = spawn_runner(json!([{"model": "llama3:latest"}])).await;
    let ndjson = "{\"message\":{\"content\":\"he\"},\"done\":false}\n{\"done\":true}\n";
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("authorization", "Bearer sk-runner"))
        .and(body_partial_json(json!({"model": "llama3:latest", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
        .expect(1)
        .mount(&runner)
        .await;

    let config = runner_config(json!({
        "DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()],
        "DOCKER_MODEL_RUNNER_API_CONFIGS": {"0": {"prefix_id": "local", "key": "sk-runner"}}
    }));
    let gateway = spawn_gateway(open_state(config)).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/chat"))
        .json(&json!({
            "model": "local.llama3",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/x-ndjson"
    );
    assert_eq!(response.text().await.unwrap(), ndjson);

    gateway.stop().await;
}

#[tokio::test]
async fn chat_without_stream_returns_json() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "ok"},
            "done": true
        })))
        .mount(&runner)
        .await;

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let body: Value = reqwest::Client::new()
        .post(gateway.url("/api/chat"))
        .json(&json!({
            "model": "m",
            "stream": false,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"]["content"], "ok");

    gateway.stop().await;
}

#[tokio::test]
async fn chat_message_without_content_is_rejected() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/chat"))
        .json(&json!({"model": "m:latest", "messages": [{"role": "user"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("At least one of 'content' or 'tool_calls' must be provided"));
    assert_eq!(request_count(&runner, "/api/chat").await, 0);

    gateway.stop().await;
}

#[tokio::test]
async fn unknown_model_is_bad_request() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/generate"))
        .json(&json!({"model": "missing", "prompt": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Model 'missing:latest' was not found"}));

    gateway.stop().await;
}

#[tokio::test]
async fn generate_round_robins_between_backends() {
    let a = spawn_runner(json!([{"model": "m:latest"}])).await;
    let b = spawn_runner(json!([{"model": "m:latest"}])).await;
    for runner in [&a, &b] {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(runner)
            .await;
    }

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [a.uri(), b.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;
    let client = reqwest::Client::new();

    for _ in 0..4 {
        let response = client
            .post(gateway.url("/api/generate"))
            .json(&json!({"model": "m:latest", "prompt": "hi", "stream": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(request_count(&a, "/api/generate").await, 2);
    assert_eq!(request_count(&b, "/api/generate").await, 2);

    gateway.stop().await;
}

#[tokio::test]
async fn backend_error_status_and_message_pass_through() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'm' not loaded"})),
        )
        .mount(&runner)
        .await;

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/embed"))
        .json(&json!({"model": "m:latest", "input": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "model 'm' not loaded"}));

    gateway.stop().await;
}

#[tokio::test]
async fn embeddings_with_index_bypasses_catalogue() {
    let runner = spawn_runner(json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_partial_json(json!({"model": "nomic", "prompt": "x"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2]})))
        .mount(&runner)
        .await;

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let body: Value = reqwest::Client::new()
        .post(gateway.url("/api/embeddings/0"))
        .json(&json!({"model": "nomic", "prompt": "x"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["embedding"], json!([0.1, 0.2]));

    gateway.stop().await;
}

#[tokio::test]
async fn pull_sets_insecure_and_copies_name_to_model() {
    let runner = spawn_runner(json!([])).await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .and(body_partial_json(json!({"model": "ai/smollm2", "insecure": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("{\"status\":\"success\"}\n", "application/x-ndjson"),
        )
        .expect(1)
        .mount(&runner)
        .await;

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/pull"))
        .json(&json!({"name": "ai/smollm2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("success"));

    gateway.stop().await;
}

#[tokio::test]
async fn show_forwards_unprefixed_model() {
    let runner = spawn_runner(json!([{"model": "m:latest"}])).await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .and(body_partial_json(json!({"model": "m:latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"details": {"family": "llama"}})))
        .mount(&runner)
        .await;

    let config = runner_config(json!({
        "DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()],
        "DOCKER_MODEL_RUNNER_API_CONFIGS": {"0": {"prefix_id": "p"}}
    }));
    let gateway = spawn_gateway(open_state(config)).await;

    let body: Value = reqwest::Client::new()
        .post(gateway.url("/api/show"))
        .json(&json!({"name": "p.m:latest"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["details"]["family"], "llama");

    gateway.stop().await;
}

#[tokio::test]
async fn delete_targets_first_backend_and_returns_true() {
    let a = spawn_runner(json!([{"model": "m:latest"}])).await;
    let b = spawn_runner(json!([{"model": "m:latest"}])).await;
    Mock::given(method("DELETE"))
        .and(path("/api/delete"))
        .and(body_partial_json(json!({"model": "m:latest"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&a)
        .await;

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [a.uri(), b.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;

    let response = reqwest::Client::new()
        .delete(gateway.url("/api/delete"))
        .json(&json!({"name": "m:latest"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!(true));
    assert_eq!(request_count(&b, "/api/delete").await, 0);

    gateway.stop().await;
}

#[tokio::test]
async fn untagged_model_resolves_to_latest_on_embed_show_and_delete() {
    let runner = spawn_runner(json!([{"model": "nomic-embed-text:latest"}])).await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text:latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5]]})))
        .mount(&runner)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .and(body_partial_json(json!({"model": "nomic-embed-text:latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"details": {"family": "bert"}})))
        .mount(&runner)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/delete"))
        .and(body_partial_json(json!({"model": "nomic-embed-text:latest"})))
        .respond_with(ResponseTemplate::new(200))
        .mount(&runner)
        .await;

    let config = runner_config(json!({"DOCKER_MODEL_RUNNER_BASE_URLS": [runner.uri()]}));
    let gateway = spawn_gateway(open_state(config)).await;
    let client = reqwest::Client::new();

    let embed: Value = client
        .post(gateway.url("/api/embed"))
        .json(&json!({"model": "nomic-embed-text", "input": "hello"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(embed["embeddings"], json!([[0.5]]));

    let show: Value = client
        .post(gateway.url("/api/show"))
        .json(&json!({"model": "nomic-embed-text"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(show["details"]["family"], "bert");

    let deleted = client
        .delete(gateway.url("/api/delete"))
        .json(&json!({"name": "nomic-embed-text"}))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(deleted.json::<Value>().await.unwrap(), json!(true));

    gateway.stop().await;
}
