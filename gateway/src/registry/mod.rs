//! バックエンド登録管理
//!
//! ランナー設定をメモリ内で管理し、SQLiteと同期する。
//! 読み取りはスナップショット、更新は管理APIからのみ。

pub mod models;

pub use models::ModelCatalogue;

use crate::db::settings::SettingsStorage;
use dmr_gateway_common::config::RunnerConfig;
use dmr_gateway_common::error::GatewayResult;
use dmr_gateway_common::protocol::ConfigUpdateForm;
use dmr_gateway_common::types::Backend;
use std::sync::Arc;
use tokio::sync::RwLock;

/// ランナー設定レジストリ
#[derive(Clone)]
pub struct RunnerRegistry {
    config: Arc<RwLock<RunnerConfig>>,
    storage: Option<SettingsStorage>,
}

impl RunnerRegistry {
    /// 永続化なしのレジストリを作成
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            storage: None,
        }
    }

    /// 永続化付きで作成する
    ///
    /// 保存済みの設定があればそれを使い、無ければ `seed` を保存して使う。
    pub async fn load(seed: RunnerConfig, storage: SettingsStorage) -> GatewayResult<Self> {
        let config = match storage.load_runner_config().await? {
            Some(stored) => {
                tracing::info!(
                    backends = stored.base_urls.len(),
                    "Loaded runner configuration from database"
                );
                stored
            }
            None => {
                tracing::info!(
                    backends = seed.base_urls.len(),
                    "Seeding runner configuration from environment"
                );
                storage.save_runner_config(&seed).await?;
                seed
            }
        };
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            storage: Some(storage),
        })
    }

    /// 現在の設定のスナップショット
    pub async fn snapshot(&self) -> RunnerConfig {
        self.config.read().await.clone()
    }

    /// API全体が有効か
    pub async fn is_enabled(&self) -> bool {
        self.config.read().await.enabled
    }

    /// 添字のバックエンドを解決する
    pub async fn backend(&self, idx: usize) -> Option<Backend> {
        self.config.read().await.backend(idx)
    }

    /// 管理APIからの更新を反映し、永続化する
    pub async fn update(&self, form: ConfigUpdateForm) -> GatewayResult<RunnerConfig> {
        let updated = {
            let mut config = self.config.write().await;
            let mut next = config.clone();
            next.apply_update(form);
            if let Some(storage) = &self.storage {
                storage.save_runner_config(&next).await?;
            }
            *config = next.clone();
            next
        };
        tracing::info!(
            enabled = updated.enabled,
            backends = updated.base_urls.len(),
            "Runner configuration updated"
        );
        Ok(updated)
    }
}
