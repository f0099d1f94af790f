//! モデル管理 APIハンドラー
//!
//! 一覧（tags / ps）、バージョン、pull / show / delete

use super::error::{backend_index, json_body, AppError};
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::HeaderMap,
    response::Response,
    Json,
};
use dmr_gateway_common::error::{CommonError, GatewayError};
use dmr_gateway_common::protocol::{with_default_tag, ModelNameForm};
use dmr_gateway_common::types::{lowest_version, ModelList};
use futures::future::join_all;
use serde_json::{json, Value};

/// GET /api/tags - 全バックエンドの結合済みモデル一覧
pub async fn get_tags(State(state): State<AppState>) -> Json<ModelList> {
    let models = state.catalogue.get_all_models().await;
    Json(ModelList { models })
}

/// GET /api/tags/{idx} - 指定バックエンドのモデル一覧（加工なし）
pub async fn get_tags_for_backend(
    State(state): State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let idx = backend_index(idx)?;
    let backend = state.load_manager.backend_at(idx).await?;
    let forwarded = state.client.forwarded_headers(&headers, None);
    let tags = state
        .client
        .get_json_strict(&backend.endpoint("/api/tags"), backend.key(), &forwarded)
        .await?;
    Ok(Json(tags))
}

/// GET /api/ps - ロード済みモデル一覧
pub async fn get_loaded_models(State(state): State<AppState>) -> Json<ModelList> {
    let models = state.catalogue.get_loaded_models().await;
    Json(ModelList { models })
}

/// GET /api/version - 有効なバックエンドの中で最も古いバージョン
pub async fn get_version(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let config = state.registry.snapshot().await;
    if !config.enabled {
        return Ok(Json(json!({"version": false})));
    }

    let headers = HeaderMap::new();
    let backends: Vec<_> = config
        .backends()
        .into_iter()
        .filter(|backend| backend.is_enabled())
        .collect();
    let requests = backends.iter().map(|backend| {
        let url = backend.endpoint("/api/version");
        let client = &state.client;
        let headers = &headers;
        async move { client.get_json(&url, backend.key(), headers).await }
    });
    let responses = join_all(requests).await;

    let versions: Vec<String> = responses
        .into_iter()
        .flatten()
        .filter_map(|response| {
            response
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();

    let lowest = lowest_version(versions.iter().map(String::as_str))
        .ok_or(GatewayError::RunnerNotFound)?;
    Ok(Json(json!({"version": lowest})))
}

/// GET /api/version/{idx} - 指定バックエンドのバージョン
pub async fn get_version_for_backend(
    State(state): State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let idx = backend_index(idx)?;
    if !state.registry.is_enabled().await {
        return Ok(Json(json!({"version": false})));
    }
    let backend = state.load_manager.backend_at(idx).await?;
    let version = state
        .client
        .get_json_strict(
            &backend.endpoint("/api/version"),
            backend.key(),
            &HeaderMap::new(),
        )
        .await?;
    Ok(Json(version))
}

/// POST /api/pull - 先頭のバックエンドへモデルを取得させる
pub async fn pull_model(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    pull_model_inner(state, 0, headers, payload).await
}

/// POST /api/pull/{idx} - 指定バックエンドへモデルを取得させる
pub async fn pull_model_for_backend(
    state: State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let idx = backend_index(idx)?;
    pull_model_inner(state, idx, headers, payload).await
}

async fn pull_model_inner(
    State(state): State<AppState>,
    idx: usize,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let form = ModelNameForm::parse(json_body(payload)?)?;
    let backend = state.load_manager.backend_at(idx).await?;

    let mut body = serde_json::to_value(&form).map_err(CommonError::from)?;
    body["insecure"] = Value::Bool(true);

    tracing::info!(
        backend_idx = backend.idx,
        url = %backend.url,
        model = ?form.model,
        "Pulling model"
    );

    let forwarded = state.client.forwarded_headers(&headers, None);
    let response = state
        .client
        .post_stream(
            &backend.endpoint("/api/pull"),
            &body,
            backend.key(),
            &forwarded,
            None,
        )
        .await?;
    Ok(response)
}

/// POST /api/show - モデル情報
pub async fn show_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let mut form = ModelNameForm::parse(json_body(payload)?)?;
    let model = with_default_tag(form.require_model()?);
    let backend = state
        .load_manager
        .select_backend_round_robin_for_model(&model)
        .await?;

    form.model = Some(backend.strip_prefix(&model).to_string());
    form.extra.remove("name");
    let body = serde_json::to_value(&form).map_err(CommonError::from)?;

    let forwarded = state.client.forwarded_headers(&headers, None);
    let info = state
        .client
        .post_json(
            &backend.endpoint("/api/show"),
            &body,
            backend.key(),
            &forwarded,
        )
        .await?;
    Ok(Json(info))
}

/// DELETE /api/delete - モデルを提供する最初のバックエンドから削除
pub async fn delete_model(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<bool>, AppError> {
    delete_model_inner(state, None, headers, payload).await
}

/// DELETE /api/delete/{idx} - 指定バックエンドから削除
pub async fn delete_model_for_backend(
    state: State<AppState>,
    idx: Result<Path<usize>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<bool>, AppError> {
    let idx = backend_index(idx)?;
    delete_model_inner(state, Some(idx), headers, payload).await
}

async fn delete_model_inner(
    State(state): State<AppState>,
    idx: Option<usize>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<bool>, AppError> {
    let mut form = ModelNameForm::parse(json_body(payload)?)?;
    let requested = form.require_model()?;
    let (model, backend) = match idx {
        Some(idx) => (requested.to_string(), state.load_manager.backend_at(idx).await?),
        None => {
            let model = with_default_tag(requested);
            let backend = state.load_manager.first_backend_for_model(&model).await?;
            (model, backend)
        }
    };

    form.model = Some(backend.strip_prefix(&model).to_string());
    form.extra.remove("name");
    let body = serde_json::to_value(&form).map_err(CommonError::from)?;

    tracing::info!(
        backend_idx = backend.idx,
        url = %backend.url,
        model = %model,
        "Deleting model"
    );

    let forwarded = state.client.forwarded_headers(&headers, None);
    state
        .client
        .delete(
            &backend.endpoint("/api/delete"),
            &body,
            backend.key(),
            &forwarded,
        )
        .await?;
    state.catalogue.invalidate().await;
    Ok(Json(true))
}
