//! バックエンドHTTPクライアント
//!
//! 全ての外向きリクエストは `Authorization: Bearer {key}`（キーがある場合）と、
//! 有効時にはユーザー情報ヘッダーを付けて送信する。

use crate::config::TimeoutConfig;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use dmr_gateway_common::error::{GatewayError, GatewayResult};
use futures::TryStreamExt;
use reqwest::Method;
use serde_json::Value;
use std::io;
use std::time::Duration;

/// 転送対象のユーザー情報ヘッダーのプレフィックス
pub const USER_INFO_HEADER_PREFIX: &str = "x-openwebui-user-";

/// チャットIDヘッダー
pub const CHAT_ID_HEADER: &str = "x-openwebui-chat-id";

/// NDJSONのContent-Type
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// バックエンド接続失敗時のメッセージ
pub const SERVER_CONNECTION_ERROR: &str = "Server Connection Error";

/// ストリーム転送時にコピーしないヘッダー
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "content-length",
];

/// バックエンドHTTPクライアント
#[derive(Clone)]
pub struct RunnerClient {
    http: reqwest::Client,
    timeouts: TimeoutConfig,
    forward_user_info_headers: bool,
}

impl RunnerClient {
    /// 共有HTTPクライアント（接続プーリング有効）を作成
    pub fn new(timeouts: TimeoutConfig, forward_user_info_headers: bool) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            timeouts,
            forward_user_info_headers,
        })
    }

    /// タイムアウト設定
    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    /// 受信ヘッダーから転送するユーザー情報ヘッダーを抽出する
    ///
    /// 転送が無効なら空。`chat_id` があれば `X-OpenWebUI-Chat-Id` を追加する。
    pub fn forwarded_headers(&self, incoming: &HeaderMap, chat_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.forward_user_info_headers {
            return headers;
        }
        for (name, value) in incoming.iter() {
            if name.as_str().starts_with(USER_INFO_HEADER_PREFIX) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(chat_id) = chat_id {
            if let Ok(value) = HeaderValue::from_str(chat_id) {
                headers.insert(HeaderName::from_static(CHAT_ID_HEADER), value);
            }
        }
        headers
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        key: Option<&str>,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .timeout(timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .headers(headers.clone());
        if let Some(key) = key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// GETしてJSONを返す（失敗はログに残して `None`）
    ///
    /// モデル一覧のファンアウトで使う。
    pub async fn get_json(&self, url: &str, key: Option<&str>, headers: &HeaderMap) -> Option<Value> {
        let result = self
            .request(Method::GET, url, key, headers, self.timeouts.model_list)
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Connection error");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "Backend returned an error status");
            return None;
        }
        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to parse backend response");
                None
            }
        }
    }

    /// GETしてJSONを返す（インスタンス指定エンドポイント用）
    ///
    /// 非2xxはバックエンドのステータスで `Docker Model Runner: {error}`、
    /// 接続失敗は500 `Server Connection Error`。
    pub async fn get_json_strict(
        &self,
        url: &str,
        key: Option<&str>,
        headers: &HeaderMap,
    ) -> GatewayResult<Value> {
        let response = self
            .request(Method::GET, url, key, headers, self.timeouts.model_list)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Connection error");
                GatewayError::Upstream {
                    status: 500,
                    message: SERVER_CONNECTION_ERROR.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|value| error_field(&value))
                .map(|error| format!("Docker Model Runner: {}", error))
                .unwrap_or_else(|| SERVER_CONNECTION_ERROR.to_string());
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))
    }

    /// 接続確認（`GET {url}/api/version`）
    pub async fn verify(&self, url: &str, key: Option<&str>) -> GatewayResult<Value> {
        let endpoint = format!("{}/api/version", url.trim_end_matches('/'));
        let response = self
            .request(
                Method::GET,
                &endpoint,
                key,
                &HeaderMap::new(),
                self.timeouts.model_list,
            )
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %endpoint, error = %e, "Connection verification failed");
                GatewayError::Upstream {
                    status: 500,
                    message: SERVER_CONNECTION_ERROR.to_string(),
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|value| error_field(&value))
                .map(|error| format!("External Error: {}", error))
                .unwrap_or_else(|| format!("HTTP Error: {}", status.as_u16()));
            return Err(GatewayError::Upstream {
                status: 500,
                message,
            });
        }

        response.json::<Value>().await.map_err(|e| GatewayError::Upstream {
            status: 500,
            message: format!("Unexpected error: {}", e),
        })
    }

    /// リクエストを送信し、非2xxをエラーに変換する
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
        key: Option<&str>,
        headers: &HeaderMap,
    ) -> GatewayResult<reqwest::Response> {
        let mut builder = self.request(method, url, key, headers, self.timeouts.request);
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Backend request failed");
            if e.is_timeout() {
                GatewayError::Timeout(e.to_string())
            } else {
                GatewayError::Http(e.to_string())
            }
        })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(upstream_error(response).await)
        }
    }

    /// POSTしてJSONを返す
    pub async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        key: Option<&str>,
        headers: &HeaderMap,
    ) -> GatewayResult<Value> {
        let response = self
            .send(Method::POST, url, Some(payload), key, headers)
            .await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))
    }

    /// POSTしてレスポンスボディをそのままストリーム転送する
    pub async fn post_stream(
        &self,
        url: &str,
        payload: &Value,
        key: Option<&str>,
        headers: &HeaderMap,
        content_type: Option<&'static str>,
    ) -> GatewayResult<Response> {
        let response = self
            .send(Method::POST, url, Some(payload), key, headers)
            .await?;
        Ok(forward_streaming_response(response, content_type))
    }

    /// DELETEを送信する
    pub async fn delete(
        &self,
        url: &str,
        payload: &Value,
        key: Option<&str>,
        headers: &HeaderMap,
    ) -> GatewayResult<()> {
        self.send(Method::DELETE, url, Some(payload), key, headers)
            .await?;
        Ok(())
    }
}

/// `{"error": ...}` の値を文字列で取り出す
fn error_field(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// 非2xxレスポンスをエラーに変換する
///
/// `{"error": e}` はバックエンドのステータスと `e` をそのまま返す。
async fn upstream_error(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(status, error = %e, "Failed to read error response");
            return GatewayError::Upstream {
                status,
                message: SERVER_CONNECTION_ERROR.to_string(),
            };
        }
    };

    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => {
            let message = error_field(&value)
                .unwrap_or_else(|| format!("Docker Model Runner: HTTP {}", status));
            GatewayError::Upstream { status, message }
        }
        Err(e) => {
            tracing::error!(status, error = %e, "Failed to parse error response");
            GatewayError::Upstream {
                status,
                message: SERVER_CONNECTION_ERROR.to_string(),
            }
        }
    }
}

/// バックエンドのレスポンスをステータス・ヘッダーごとストリーム転送する
///
/// `content_type` 指定時はContent-Typeを上書きする。
pub fn forward_streaming_response(
    response: reqwest::Response,
    content_type: Option<&'static str>,
) -> Response {
    let status = response.status();
    let headers = response.headers().clone();
    let stream = response.bytes_stream().map_err(io::Error::other);
    let body = Body::from_stream(stream);
    let mut axum_response = Response::new(body);
    *axum_response.status_mut() = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);
    {
        let response_headers = axum_response.headers_mut();
        for (name, value) in headers.iter() {
            if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                response_headers.append(header_name, header_value);
            }
        }
        if let Some(content_type) = content_type {
            response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
    axum_response
}
