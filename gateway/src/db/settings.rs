//! 設定テーブルのストレージ層
//!
//! SQLiteベースのキーバリュー設定を永続化

use dmr_gateway_common::config::RunnerConfig;
use dmr_gateway_common::error::{CommonError, GatewayError, GatewayResult};
use sqlx::SqlitePool;

/// ランナー設定を保存するキー
pub const RUNNER_CONFIG_KEY: &str = "docker_model_runner";

/// 設定ストレージ
#[derive(Clone)]
pub struct SettingsStorage {
    pool: SqlitePool,
}

impl SettingsStorage {
    /// 新しいストレージインスタンスを作成
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 設定値を取得
    pub async fn get_setting(&self, key: &str) -> GatewayResult<Option<String>> {
        let result = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to get setting: {}", e)))?;

        Ok(result)
    }

    /// 設定値を保存（INSERT OR REPLACE）
    pub async fn set_setting(&self, key: &str, value: &str) -> GatewayResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| GatewayError::Database(format!("Failed to set setting: {}", e)))?;

        Ok(())
    }

    /// 保存済みのランナー設定を読み込む
    pub async fn load_runner_config(&self) -> GatewayResult<Option<RunnerConfig>> {
        let Some(raw) = self.get_setting(RUNNER_CONFIG_KEY).await? else {
            return Ok(None);
        };
        let config = serde_json::from_str(&raw).map_err(CommonError::from)?;
        Ok(Some(config))
    }

    /// ランナー設定を保存する
    pub async fn save_runner_config(&self, config: &RunnerConfig) -> GatewayResult<()> {
        let raw = serde_json::to_string(config).map_err(CommonError::from)?;
        self.set_setting(RUNNER_CONFIG_KEY, &raw).await
    }
}
