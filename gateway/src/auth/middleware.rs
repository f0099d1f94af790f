//! 認証ミドルウェア
//!
//! `Authorization: Bearer {key}` または `X-API-Key` からキーを取り出して照合する。

use super::ApiKeys;
use crate::api::error::AppError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dmr_gateway_common::error::GatewayError;

/// リクエストヘッダーからAPIキーを取り出す
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn reject(err: GatewayError) -> Response {
    AppError(err).into_response()
}

/// 管理者キーを要求するミドルウェア
///
/// 管理者キーが未設定の場合は常に403。
pub async fn require_admin_middleware(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if keys.is_disabled() {
        return Ok(next.run(request).await);
    }
    if !keys.has_admin_key() {
        tracing::warn!(
            path = %request.uri().path(),
            "Admin endpoint called but DMR_GATEWAY_ADMIN_API_KEY is not configured"
        );
        return Err(reject(GatewayError::Authorization(
            "admin API key is not configured".to_string(),
        )));
    }

    let api_key = extract_api_key(request.headers()).ok_or_else(|| {
        reject(GatewayError::Authentication(
            "missing API key".to_string(),
        ))
    })?;
    if !keys.is_admin_key(&api_key) {
        tracing::warn!(path = %request.uri().path(), "Invalid admin API key");
        return Err(reject(GatewayError::Authentication(
            "invalid admin API key".to_string(),
        )));
    }

    Ok(next.run(request).await)
}

/// 推論系エンドポイント用ミドルウェア
///
/// `DMR_GATEWAY_API_KEY` が設定されている場合のみキー（APIキーまたは管理者キー）を要求する。
pub async fn require_user_middleware(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if keys.is_disabled() || !keys.requires_user_key() {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(request.headers()).ok_or_else(|| {
        reject(GatewayError::Authentication(
            "missing API key".to_string(),
        ))
    })?;
    if !keys.is_user_key(&api_key) {
        tracing::warn!(path = %request.uri().path(), "Invalid API key");
        return Err(reject(GatewayError::Authentication(
            "invalid API key".to_string(),
        )));
    }

    Ok(next.run(request).await)
}
