//! Ollama互換プロキシ APIハンドラー
//!
//! chat / generate / embed / embeddings をモデルに対応するバックエンドへ転送する。
//! `{idx}` 付きのパスはカタログを介さずそのバックエンドへ直接送る。

use super::error::{backend_index, json_body, AppError};
use crate::client::NDJSON_CONTENT_TYPE;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use dmr_gateway_common::error::CommonError;
use dmr_gateway_common::protocol::{
    with_default_tag, ChatCompletionForm, EmbedForm, GenerateCompletionForm,
};
use dmr_gateway_common::types::Backend;
use serde_json::Value;

/// POST /api/chat
pub async fn chat(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    chat_inner(state, None, headers, payload).await
}

/// POST /api/chat/{idx}
pub async fn chat_for_backend(
    state: State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let idx = backend_index(idx)?;
    chat_inner(state, Some(idx), headers, payload).await
}

async fn chat_inner(
    State(state): State<AppState>,
    idx: Option<usize>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let mut form = ChatCompletionForm::parse(json_body(payload)?)?;
    form.model = with_default_tag(&form.model);

    let backend = state.load_manager.resolve(&form.model, idx).await?;
    let requested = std::mem::take(&mut form.model);
    form.model = backend.strip_prefix(&requested).to_string();
    log_route(&backend, &requested, "/api/chat");

    let forwarded = state.client.forwarded_headers(&headers, form.chat_id());
    let body = serde_json::to_value(&form).map_err(CommonError::from)?;
    forward(
        &state,
        &backend,
        "/api/chat",
        &body,
        &forwarded,
        form.is_stream(),
        Some(NDJSON_CONTENT_TYPE),
    )
    .await
}

/// POST /api/generate
pub async fn generate(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    generate_inner(state, None, headers, payload).await
}

/// POST /api/generate/{idx}
pub async fn generate_for_backend(
    state: State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let idx = backend_index(idx)?;
    generate_inner(state, Some(idx), headers, payload).await
}

async fn generate_inner(
    State(state): State<AppState>,
    idx: Option<usize>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let mut form = GenerateCompletionForm::parse(json_body(payload)?)?;
    form.model = with_default_tag(&form.model);

    let backend = state.load_manager.resolve(&form.model, idx).await?;
    let requested = std::mem::take(&mut form.model);
    form.model = backend.strip_prefix(&requested).to_string();
    log_route(&backend, &requested, "/api/generate");

    let forwarded = state.client.forwarded_headers(&headers, form.chat_id());
    let body = serde_json::to_value(&form).map_err(CommonError::from)?;
    forward(
        &state,
        &backend,
        "/api/generate",
        &body,
        &forwarded,
        form.is_stream(),
        None,
    )
    .await
}

/// POST /api/embed
pub async fn embed(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    embed_inner(state, None, "/api/embed", headers, payload).await
}

/// POST /api/embed/{idx}
pub async fn embed_for_backend(
    state: State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let idx = backend_index(idx)?;
    embed_inner(state, Some(idx), "/api/embed", headers, payload).await
}

/// POST /api/embeddings
pub async fn embeddings(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    embed_inner(state, None, "/api/embeddings", headers, payload).await
}

/// POST /api/embeddings/{idx}
pub async fn embeddings_for_backend(
    state: State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let idx = backend_index(idx)?;
    embed_inner(state, Some(idx), "/api/embeddings", headers, payload).await
}

async fn embed_inner(
    State(state): State<AppState>,
    idx: Option<usize>,
    path: &'static str,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let mut form = EmbedForm::parse(json_body(payload)?)?;
    if idx.is_none() {
        form.model = with_default_tag(&form.model);
    }

    let backend = state.load_manager.resolve(&form.model, idx).await?;
    let requested = std::mem::take(&mut form.model);
    form.model = backend.strip_prefix(&requested).to_string();
    log_route(&backend, &requested, path);

    let forwarded = state.client.forwarded_headers(&headers, None);
    let body = serde_json::to_value(&form).map_err(CommonError::from)?;
    let result = state
        .client
        .post_json(&backend.endpoint(path), &body, backend.key(), &forwarded)
        .await?;
    Ok(Json(result))
}

fn log_route(backend: &Backend, model: &str, path: &str) {
    tracing::info!(
        backend_idx = backend.idx,
        url = %backend.url,
        model = %model,
        path = %path,
        "Routing request to backend"
    );
}

/// ストリーミング指定ならボディを転送、そうでなければJSONを返す
async fn forward(
    state: &AppState,
    backend: &Backend,
    path: &str,
    body: &Value,
    headers: &HeaderMap,
    stream: bool,
    content_type: Option<&'static str>,
) -> Result<Response, AppError> {
    let url = backend.endpoint(path);
    if stream {
        let response = state
            .client
            .post_stream(&url, body, backend.key(), headers, content_type)
            .await?;
        Ok(response)
    } else {
        let result = state
            .client
            .post_json(&url, body, backend.key(), headers)
            .await?;
        Ok(Json(result).into_response())
    }
}
