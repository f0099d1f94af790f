//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs, and builds the initial
//! runner configuration and gateway settings from them.

use dmr_gateway_common::config::{normalize_base_url, RunnerConfig};
use std::time::Duration;

/// `USE_DOCKER_MODEL_RUNNER_DOCKER=true` のときの既定ベースURL
pub const LOCAL_RUNNER_URL: &str = "http://localhost:12434";

/// コンテナ内から見た既定ベースURL
pub const DOCKER_INTERNAL_RUNNER_URL: &str = "http://model-runner.docker.internal";

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use dmr_gateway::config::get_env_with_fallback;
///
/// let port = get_env_with_fallback("DMR_GATEWAY_PORT", "DMR_GATEWAY_PORT");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// `true/1/yes/on` を真として解釈する
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn get_env_bool(new_name: &str, old_name: &str, default: bool) -> bool {
    get_env_with_fallback(new_name, old_name)
        .map(|value| parse_bool(&value))
        .unwrap_or(default)
}

/// 認証無効化モードの有効/無効を取得
///
/// 環境変数 `DMR_GATEWAY_AUTH_DISABLED`（旧: `AUTH_DISABLED`）が `true/1/yes/on` のときに有効化する。
pub fn is_auth_disabled() -> bool {
    get_env_bool("DMR_GATEWAY_AUTH_DISABLED", "AUTH_DISABLED", false)
}

/// ユーザー情報ヘッダー転送の有効/無効を取得
pub fn is_forward_user_info_headers_enabled() -> bool {
    get_env_bool(
        "DMR_GATEWAY_FORWARD_USER_INFO_HEADERS",
        "ENABLE_FORWARD_USER_INFO_HEADERS",
        false,
    )
}

/// 環境変数からバックエンドURL一覧を決定する
///
/// 優先順位: `DOCKER_MODEL_RUNNER_BASE_URLS`（`;`区切り） →
/// `DOCKER_MODEL_RUNNER_BASE_URL` → `DOCKER_MODEL_RUNNER_API_BASE_URL`（末尾 `/api` を除去） →
/// `USE_DOCKER_MODEL_RUNNER_DOCKER` に応じた既定値。
pub fn base_urls_from_env() -> Vec<String> {
    let list = std::env::var("DOCKER_MODEL_RUNNER_BASE_URLS")
        .ok()
        .filter(|value| !value.trim().is_empty());
    if let Some(list) = list {
        return split_base_urls(&list);
    }

    let single = get_env_with_fallback(
        "DOCKER_MODEL_RUNNER_BASE_URL",
        "DOCKER_MODEL_RUNNER_API_BASE_URL",
    )
    .map(|url| normalize_base_url(&url))
    .filter(|url| !url.is_empty());
    if let Some(url) = single {
        let url = url.strip_suffix("/api").unwrap_or(&url).to_string();
        return vec![url];
    }

    let use_local = std::env::var("USE_DOCKER_MODEL_RUNNER_DOCKER")
        .map(|value| parse_bool(&value))
        .unwrap_or(false);
    if use_local {
        vec![LOCAL_RUNNER_URL.to_string()]
    } else {
        vec![DOCKER_INTERNAL_RUNNER_URL.to_string()]
    }
}

/// `;` 区切りのURL一覧を分解する
pub fn split_base_urls(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(normalize_base_url)
        .filter(|url| !url.is_empty())
        .collect()
}

/// 環境変数から初期ランナー設定を作成する
pub fn runner_config_from_env() -> RunnerConfig {
    let enabled = std::env::var("ENABLE_DOCKER_MODEL_RUNNER_API")
        .map(|value| parse_bool(&value))
        .unwrap_or(true);
    RunnerConfig::new(enabled, base_urls_from_env())
}

/// バックエンドへのHTTPタイムアウト設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// プロキシ呼び出し（chat/generate/pull等）
    pub request: Duration,
    /// モデル一覧の取得と接続確認
    pub model_list: Duration,
    /// モデルカタログのキャッシュ有効期間
    pub models_cache_ttl: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(300),
            model_list: Duration::from_secs(10),
            models_cache_ttl: Duration::from_secs(1),
        }
    }
}

impl TimeoutConfig {
    /// Load timeout configuration from environment variables.
    pub fn from_env() -> Self {
        let request = get_env_with_fallback_parse(
            "DMR_GATEWAY_CLIENT_TIMEOUT_SECS",
            "AIOHTTP_CLIENT_TIMEOUT",
            300u64,
        );
        let model_list = get_env_with_fallback_parse(
            "DMR_GATEWAY_MODEL_LIST_TIMEOUT_SECS",
            "AIOHTTP_CLIENT_TIMEOUT_MODEL_LIST",
            10u64,
        );
        let ttl = get_env_with_fallback_parse(
            "DMR_GATEWAY_MODELS_CACHE_TTL_SECS",
            "MODELS_CACHE_TTL",
            1u64,
        );
        Self {
            request: Duration::from_secs(request),
            model_list: Duration::from_secs(model_list),
            models_cache_ttl: Duration::from_secs(ttl),
        }
    }
}

/// SQLiteのデータベースURLを取得
///
/// 未設定時は `~/.dmr-gateway/gateway.db`
pub fn database_url() -> String {
    if let Some(url) = get_env_with_fallback("DMR_GATEWAY_DATABASE_URL", "DATABASE_URL") {
        return url;
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    format!("sqlite:{}/.dmr-gateway/gateway.db", home)
}

/// APIキー設定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// 管理系エンドポイント用キー
    pub admin_api_key: Option<String>,
    /// 推論エンドポイント用キー（未設定なら推論系は公開）
    pub api_key: Option<String>,
    /// 認証を無効化する（開発・テスト用）
    pub disabled: bool,
}

impl AuthConfig {
    /// Load API key configuration from environment variables.
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            admin_api_key: non_empty("DMR_GATEWAY_ADMIN_API_KEY"),
            api_key: non_empty("DMR_GATEWAY_API_KEY"),
            disabled: is_auth_disabled(),
        }
    }
}

/// ゲートウェイ全体の設定
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// タイムアウト
    pub timeouts: TimeoutConfig,
    /// 認証
    pub auth: AuthConfig,
    /// ユーザー情報ヘッダーを転送するか
    pub forward_user_info_headers: bool,
}

impl GatewayConfig {
    /// Load gateway configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            timeouts: TimeoutConfig::from_env(),
            auth: AuthConfig::from_env(),
            forward_user_info_headers: is_forward_user_info_headers_enabled(),
        }
    }
}
