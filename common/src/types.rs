//! 共通型定義
//!
//! バックエンド、モデルカタログのエントリ、バージョン比較等

use crate::config::BackendConfig;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// モデルに付与するタグ
///
/// 文字列と `{"name": "..."}` 形式の両方を受け付け、受け取った形のまま返す。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Tag {
    /// 文字列タグ
    Name(String),
    /// オブジェクト形式のタグ
    Object {
        /// タグ名
        name: String,
    },
}

impl Tag {
    /// タグ名
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Object { name } => name,
        }
    }
}

/// 解決済みバックエンド
///
/// `idx` は `DOCKER_MODEL_RUNNER_BASE_URLS` 内の位置で、インスタンス指定
/// エンドポイント（`/api/tags/{idx}` 等）の識別子として使われる。
#[derive(Debug, Clone, PartialEq)]
pub struct Backend {
    /// バックエンドの添字
    pub idx: usize,
    /// ベースURL（末尾 `/` なし）
    pub url: String,
    /// 個別設定（未設定ならデフォルト）
    pub config: BackendConfig,
}

impl Backend {
    /// 有効なバックエンドか
    pub fn is_enabled(&self) -> bool {
        self.config.enable
    }

    /// Bearer認証に使うAPIキー
    pub fn key(&self) -> Option<&str> {
        self.config.key()
    }

    /// ベースURLにパスを連結する
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// プレフィックス付きのモデルIDを返す
    pub fn apply_prefix(&self, model: &str) -> String {
        match self.config.prefix_id() {
            Some(prefix) => format!("{}.{}", prefix, model),
            None => model.to_string(),
        }
    }

    /// 先頭の `{prefix_id}.` を取り除いたモデルIDを返す
    pub fn strip_prefix<'a>(&self, model: &'a str) -> &'a str {
        self.config
            .prefix_id()
            .and_then(|prefix| {
                model
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('.'))
            })
            .unwrap_or(model)
    }

    /// `/api/tags` の結果に許可リスト・プレフィックス・タグ・接続種別を適用する
    pub fn decorate_models(&self, models: Vec<ModelEntry>) -> Vec<ModelEntry> {
        models
            .into_iter()
            .filter(|entry| self.config.allows_model(&entry.model))
            .map(|mut entry| {
                entry.model = self.apply_prefix(&entry.model);
                if !self.config.tags.is_empty() {
                    entry.set_field(
                        "tags",
                        serde_json::to_value(&self.config.tags).unwrap_or(Value::Null),
                    );
                }
                entry.set_field(
                    "connection_type",
                    Value::String(self.config.connection_type().to_string()),
                );
                entry
            })
            .collect()
    }

    /// `/api/ps` の結果にプレフィックスのみ適用する
    pub fn decorate_loaded_models(&self, models: Vec<ModelEntry>) -> Vec<ModelEntry> {
        models
            .into_iter()
            .map(|mut entry| {
                entry.model = self.apply_prefix(&entry.model);
                entry
            })
            .collect()
    }
}

/// モデルカタログのエントリ
///
/// バックエンドが返したオブジェクトの全フィールドを保持し、
/// そのモデルを提供するバックエンドの添字一覧 `urls` を付与する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// モデルID（プレフィックス適用後）
    pub model: String,
    /// その他のフィールド
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// このモデルを提供するバックエンドの添字
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<usize>,
}

impl ModelEntry {
    /// バックエンドのJSONオブジェクトから作成する
    ///
    /// `model` が無い場合は `name` を使い、どちらも無ければ `None`。
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let model = match fields.remove("model") {
            Some(Value::String(model)) => model,
            _ => fields.get("name")?.as_str()?.to_string(),
        };
        fields.remove("urls");
        Some(Self {
            model,
            fields,
            urls: Vec::new(),
        })
    }

    /// フィールドを取得する
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// フィールドを設定する
    pub fn set_field(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }
}

/// `{"models": [...]}` 形式のモデル一覧
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    /// モデル一覧
    pub models: Vec<ModelEntry>,
}

impl ModelList {
    /// バックエンドのレスポンスから `models` 配列を取り出す
    pub fn entries_from_response(response: &Value) -> Vec<ModelEntry> {
        response
            .get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .cloned()
                    .filter_map(ModelEntry::from_value)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// モデルIDで検索する
    pub fn find(&self, model: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|entry| entry.model == model)
    }
}

/// バックエンド毎の一覧を、同一モデルIDを1エントリにまとめて結合する
///
/// `lists` の位置がバックエンドの添字。`None` のバックエンドは何も寄与しない。
/// 出現順を維持する。
pub fn merge_model_lists(lists: Vec<Option<Vec<ModelEntry>>>) -> Vec<ModelEntry> {
    let mut merged: Vec<ModelEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (idx, list) in lists.into_iter().enumerate() {
        let Some(list) = list else {
            continue;
        };
        for mut entry in list {
            match positions.get(&entry.model) {
                Some(&pos) => {
                    let urls = &mut merged[pos].urls;
                    if urls.last() != Some(&idx) {
                        urls.push(idx);
                    }
                }
                None => {
                    entry.urls = vec![idx];
                    positions.insert(entry.model.clone(), merged.len());
                    merged.push(entry);
                }
            }
        }
    }

    merged
}

/// ロード済みモデルの `expires_at` をUNIX秒に変換してカタログへ反映する
pub fn annotate_expires_at(models: &mut [ModelEntry], loaded: &[ModelEntry]) {
    let expires: HashMap<&str, i64> = loaded
        .iter()
        .filter_map(|entry| {
            let raw = entry.field("expires_at")?.as_str()?;
            Some((entry.model.as_str(), parse_timestamp(raw)?))
        })
        .collect();

    for entry in models.iter_mut() {
        if let Some(ts) = expires.get(entry.model.as_str()) {
            entry.set_field("expires_at", Value::from(*ts));
        }
    }
}

/// ISO 8601 / RFC 3339 の日時をUNIX秒に変換する（タイムゾーン無しはUTC扱い）
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

/// バージョン比較キー
///
/// 先頭の `v` と最初の `-` 以降を無視し、`.` 区切りの数値列にする。
pub fn version_sort_key(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    let core = trimmed.split('-').next().unwrap_or(trimmed);
    core.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

/// 最も古いバージョンを選ぶ（解釈できない値は無視）
pub fn lowest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|version| version_sort_key(version).map(|key| (key, version)))
        .min_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .map(|(_, version)| version)
}
