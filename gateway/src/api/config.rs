//! ステータス・接続確認・設定管理 APIハンドラー

use super::error::{json_body, AppError};
use crate::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use dmr_gateway_common::config::RunnerConfig;
use dmr_gateway_common::error::CommonError;
use dmr_gateway_common::protocol::{ConfigUpdateForm, VerifyConnectionForm};
use serde_json::{json, Value};

/// GET|HEAD / , GET /health - 稼働確認
pub async fn get_status() -> Json<Value> {
    Json(json!({"status": true}))
}

/// POST /verify - バックエンドへの接続確認
pub async fn verify_connection(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let form: VerifyConnectionForm = serde_json::from_value(json_body(payload)?)
        .map_err(|e| CommonError::Validation(e.to_string()))?;
    let key = form.key.as_deref().filter(|k| !k.is_empty());

    tracing::info!(url = %form.url, "Verifying backend connection");
    let version = state.client.verify(&form.url, key).await?;
    Ok(Json(version))
}

/// GET /config - 現在のランナー設定
pub async fn get_config(State(state): State<AppState>) -> Json<RunnerConfig> {
    Json(state.registry.snapshot().await)
}

/// POST /config/update - ランナー設定の更新
///
/// 範囲外の個別設定を削除して保存し、モデルカタログを破棄する。
pub async fn update_config(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RunnerConfig>, AppError> {
    let form: ConfigUpdateForm = serde_json::from_value(json_body(payload)?)
        .map_err(|e| CommonError::Validation(e.to_string()))?;
    let updated = state.registry.update(form).await?;
    state.catalogue.invalidate().await;
    Ok(Json(updated))
}
