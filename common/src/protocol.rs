//! Ollama互換APIのリクエストフォーム
//!
//! ゲートウェイが受け取るリクエストボディの型定義とバリデーション。
//! 未知のフィールドは `extra` に保持され、そのままバックエンドへ転送される。

use crate::config::BackendConfig;
use crate::error::CommonError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn default_stream() -> Option<bool> {
    Some(true)
}

/// JSON値をフォームに変換する（失敗はバリデーションエラー）
fn parse_form<T: DeserializeOwned>(value: Value) -> Result<T, CommonError> {
    serde_json::from_value(value).map_err(|e| CommonError::Validation(e.to_string()))
}

/// 値が `null` のフィールドを取り除く
fn drop_nulls(extra: &mut Map<String, Value>) {
    extra.retain(|_, value| !value.is_null());
}

/// 設定更新フォーム（`POST /config/update`）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigUpdateForm {
    /// API全体の有効フラグ（省略時は現在値を維持）
    #[serde(
        rename = "ENABLE_DOCKER_MODEL_RUNNER_API",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enabled: Option<bool>,
    /// バックエンドのベースURL
    #[serde(rename = "DOCKER_MODEL_RUNNER_BASE_URLS")]
    pub base_urls: Vec<String>,
    /// バックエンド個別設定
    #[serde(rename = "DOCKER_MODEL_RUNNER_API_CONFIGS")]
    pub api_configs: BTreeMap<String, BackendConfig>,
}

/// 接続確認フォーム（`POST /verify`）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifyConnectionForm {
    /// 確認先のベースURL
    pub url: String,
    /// APIキー
    #[serde(default)]
    pub key: Option<String>,
}

/// チャットメッセージ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// ロール
    pub role: String,
    /// 本文
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// ツール呼び出し
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Map<String, Value>>>,
    /// 画像（base64）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// その他のフィールド
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    fn validate(&self, position: usize) -> Result<(), CommonError> {
        if self.content.is_none() && self.tool_calls.is_none() {
            return Err(CommonError::Validation(format!(
                "messages[{}]: At least one of 'content' or 'tool_calls' must be provided",
                position
            )));
        }
        Ok(())
    }
}

/// チャット補完フォーム（`POST /api/chat`）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionForm {
    /// モデルID
    pub model: String,
    /// メッセージ
    pub messages: Vec<ChatMessage>,
    /// 出力フォーマット（`"json"` またはJSONスキーマ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    /// 推論オプション
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    /// プロンプトテンプレート
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// ストリーミング（デフォルト: true）
    #[serde(default = "default_stream", skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// モデル保持時間
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<Value>,
    /// ツール定義
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Map<String, Value>>>,
    /// ホストアプリケーションのメタデータ（転送しない）
    #[serde(default, skip_serializing)]
    pub metadata: Option<Value>,
    /// その他のフィールド
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionForm {
    /// JSON値を解析して検証する
    pub fn parse(value: Value) -> Result<Self, CommonError> {
        let mut form: Self = parse_form(value)?;
        for (position, message) in form.messages.iter().enumerate() {
            message.validate(position)?;
        }
        drop_nulls(&mut form.extra);
        for message in form.messages.iter_mut() {
            drop_nulls(&mut message.extra);
        }
        Ok(form)
    }

    /// ストリーミング応答を要求しているか
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// メタデータの `chat_id`
    pub fn chat_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("chat_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// テキスト生成フォーム（`POST /api/generate`）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateCompletionForm {
    /// モデルID
    pub model: String,
    /// プロンプト
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// サフィックス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// 画像（base64）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// 出力フォーマット
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    /// 推論オプション
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    /// システムプロンプト
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// プロンプトテンプレート
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// ストリーミング（デフォルト: true）
    #[serde(default = "default_stream", skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// テンプレートを使わない
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,
    /// モデル保持時間
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<Value>,
    /// ホストアプリケーションのメタデータ（転送しない）
    #[serde(default, skip_serializing)]
    pub metadata: Option<Value>,
    /// その他のフィールド
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerateCompletionForm {
    /// JSON値を解析して検証する
    pub fn parse(value: Value) -> Result<Self, CommonError> {
        let mut form: Self = parse_form(value)?;
        drop_nulls(&mut form.extra);
        Ok(form)
    }

    /// ストリーミング応答を要求しているか
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// メタデータの `chat_id`
    pub fn chat_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("chat_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// 埋め込みフォーム（`POST /api/embed`, `POST /api/embeddings`）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedForm {
    /// モデルID
    pub model: String,
    /// 入力（`/api/embed`: 文字列または配列）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// 入力（`/api/embeddings`: 文字列）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// 推論オプション
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    /// モデル保持時間
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<Value>,
    /// その他のフィールド
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmbedForm {
    /// JSON値を解析する
    pub fn parse(value: Value) -> Result<Self, CommonError> {
        let mut form: Self = parse_form(value)?;
        drop_nulls(&mut form.extra);
        Ok(form)
    }
}

/// モデル名を指定するフォーム（pull / show / delete）
///
/// Ollamaの旧クライアントは `name` を送るため、`model` が無ければ `name` を使う。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelNameForm {
    /// モデルID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// その他のフィールド（`name` を含む）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelNameForm {
    /// JSON値を解析し、`model` を `name` で補完する
    pub fn parse(value: Value) -> Result<Self, CommonError> {
        let mut form: Self = parse_form(value)?;
        drop_nulls(&mut form.extra);
        if form.model.is_none() {
            form.model = form
                .extra
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(form)
    }

    /// モデルIDを要求する
    pub fn require_model(&self) -> Result<&str, CommonError> {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CommonError::Validation("'model' or 'name' is required".to_string()))
    }
}

/// タグ省略時に `:latest` を付与する
pub fn with_default_tag(model: &str) -> String {
    if model.contains(':') {
        model.to_string()
    } else {
        format!("{}:latest", model)
    }
}
