//! ランナー設定
//!
//! バックエンドURL一覧とバックエンド個別設定（APIキー、プレフィックス、
//! モデル許可リスト等）を保持する。JSONのキー名はホストアプリケーションの
//! 管理画面と互換。

use crate::protocol::ConfigUpdateForm;
use crate::types::{Backend, Tag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// `connection_type` 未指定時にモデルへ付与する値
pub const DEFAULT_CONNECTION_TYPE: &str = "docker";

fn default_true() -> bool {
    true
}

/// バックエンド個別設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// 有効フラグ（デフォルト: true）
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Bearer認証に使うAPIキー
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// モデルIDに付与する名前空間（`{prefix_id}.{model}`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_id: Option<String>,
    /// モデルに付与するタグ
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// モデルID許可リスト（空なら全モデル）
    #[serde(default)]
    pub model_ids: Vec<String>,
    /// 接続種別
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// 未知のフィールド（管理画面が保存した値をそのまま保持する）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enable: true,
            key: None,
            prefix_id: None,
            tags: Vec::new(),
            model_ids: Vec::new(),
            connection_type: None,
            extra: Map::new(),
        }
    }
}

impl BackendConfig {
    /// 空文字列を除いたAPIキー
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    /// 空文字列を除いたプレフィックス
    pub fn prefix_id(&self) -> Option<&str> {
        self.prefix_id.as_deref().filter(|p| !p.is_empty())
    }

    /// モデルへ付与する接続種別
    pub fn connection_type(&self) -> &str {
        self.connection_type
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONNECTION_TYPE)
    }

    /// 許可リストに照らしてモデルを公開してよいか
    pub fn allows_model(&self, model: &str) -> bool {
        self.model_ids.is_empty() || self.model_ids.iter().any(|id| id == model)
    }
}

/// ランナー設定全体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// API全体の有効フラグ
    #[serde(rename = "ENABLE_DOCKER_MODEL_RUNNER_API", default = "default_true")]
    pub enabled: bool,
    /// バックエンドのベースURL（添字がバックエンドIDになる）
    #[serde(rename = "DOCKER_MODEL_RUNNER_BASE_URLS", default)]
    pub base_urls: Vec<String>,
    /// バックエンド個別設定（キーは添字文字列またはURL）
    #[serde(rename = "DOCKER_MODEL_RUNNER_API_CONFIGS", default)]
    pub api_configs: BTreeMap<String, BackendConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_urls: Vec::new(),
            api_configs: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// URL一覧から設定を作成する（個別設定なし）
    pub fn new(enabled: bool, base_urls: Vec<String>) -> Self {
        Self {
            enabled,
            base_urls: base_urls
                .iter()
                .map(|url| normalize_base_url(url))
                .filter(|url| !url.is_empty())
                .collect(),
            api_configs: BTreeMap::new(),
        }
    }

    /// 添字 → URL → オリジンの順で個別設定を探す
    pub fn backend_config(&self, idx: usize) -> Option<&BackendConfig> {
        let url = self.base_urls.get(idx)?;
        self.api_configs
            .get(&idx.to_string())
            .or_else(|| self.api_configs.get(url))
            .or_else(|| url_origin(url).and_then(|origin| self.api_configs.get(&origin)))
    }

    /// 添字のバックエンドを解決する
    pub fn backend(&self, idx: usize) -> Option<Backend> {
        let url = self.base_urls.get(idx)?;
        Some(Backend {
            idx,
            url: url.clone(),
            config: self.backend_config(idx).cloned().unwrap_or_default(),
        })
    }

    /// 全バックエンドを添字順で返す
    pub fn backends(&self) -> Vec<Backend> {
        (0..self.base_urls.len())
            .filter_map(|idx| self.backend(idx))
            .collect()
    }

    /// 管理APIからの更新を反映する
    ///
    /// 有効フラグが省略された場合は現在値を維持する。
    pub fn apply_update(&mut self, form: ConfigUpdateForm) {
        if let Some(enabled) = form.enabled {
            self.enabled = enabled;
        }
        self.base_urls = form
            .base_urls
            .iter()
            .map(|url| normalize_base_url(url))
            .collect();
        self.api_configs = form.api_configs;
        self.prune_api_configs();
    }

    /// 範囲内の添字キー以外の個別設定を削除する
    pub fn prune_api_configs(&mut self) {
        let len = self.base_urls.len();
        self.api_configs.retain(|key, _| {
            key.parse::<usize>()
                .map(|idx| idx < len && idx.to_string() == *key)
                .unwrap_or(false)
        });
    }
}

/// 末尾の `/` と前後の空白を取り除く
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// `scheme://host[:port]` を取り出す
pub fn url_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}
