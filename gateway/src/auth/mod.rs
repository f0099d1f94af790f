//! 認証モジュール
//!
//! ホストアプリケーションのユーザー管理は持たず、静的なAPIキーで
//! 管理系・推論系エンドポイントを保護する。

/// 認証ミドルウェア（管理者キー・APIキー）
pub mod middleware;

use crate::config::AuthConfig;
use sha2::{Digest, Sha256};

/// SHA-256ハッシュ化ヘルパー関数
///
/// 16進数表現のSHA-256ハッシュ（64文字）を返す。
pub(crate) fn hash_with_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// 照合用のAPIキー（ダイジェストのみ保持する）
#[derive(Clone, Debug, Default)]
pub struct ApiKeys {
    admin_key_hash: Option<String>,
    api_key_hash: Option<String>,
    disabled: bool,
}

impl ApiKeys {
    /// 設定から作成
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            admin_key_hash: config.admin_api_key.as_deref().map(hash_with_sha256),
            api_key_hash: config.api_key.as_deref().map(hash_with_sha256),
            disabled: config.disabled,
        }
    }

    /// 認証を無効化した状態（開発・テスト用）
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// 認証が無効化されているか
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// 管理者キーが設定されているか
    pub fn has_admin_key(&self) -> bool {
        self.admin_key_hash.is_some()
    }

    /// 推論系にキーが必要か
    pub fn requires_user_key(&self) -> bool {
        self.api_key_hash.is_some()
    }

    /// 管理者キーと一致するか
    pub fn is_admin_key(&self, key: &str) -> bool {
        self.admin_key_hash
            .as_deref()
            .is_some_and(|hash| hash == hash_with_sha256(key))
    }

    /// 推論系で受け付けるキー（APIキーまたは管理者キー）か
    pub fn is_user_key(&self, key: &str) -> bool {
        let digest = hash_with_sha256(key);
        self.api_key_hash.as_deref() == Some(digest.as_str())
            || self.admin_key_hash.as_deref() == Some(digest.as_str())
    }
}
