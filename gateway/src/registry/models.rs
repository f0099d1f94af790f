//! モデルカタログ
//!
//! 有効な全バックエンドの `/api/tags` を並行取得し、許可リスト・プレフィックス・
//! タグ・接続種別を適用したうえでモデルID単位に結合する。結果はTTLの間キャッシュし、
//! ルーティング用のモデルマップも更新する。
//!
//! 取得中に設定が更新された場合、その結果は保存せず新しい設定で取り直す。

use super::RunnerRegistry;
use crate::client::RunnerClient;
use axum::http::HeaderMap;
use dmr_gateway_common::config::RunnerConfig;
use dmr_gateway_common::types::{
    annotate_expires_at, merge_model_lists, Backend, ModelEntry, ModelList,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// 設定更新と競合したときに取り直す回数の上限
const MAX_REFRESH_ATTEMPTS: usize = 3;

struct CachedModels {
    fetched_at: Instant,
    models: Vec<ModelEntry>,
}

/// モデルカタログ
#[derive(Clone)]
pub struct ModelCatalogue {
    registry: RunnerRegistry,
    client: RunnerClient,
    ttl: Duration,
    cache: Arc<RwLock<Option<CachedModels>>>,
    models: Arc<RwLock<HashMap<String, ModelEntry>>>,
    generation: Arc<AtomicU64>,
}

impl ModelCatalogue {
    /// 新しいカタログを作成
    pub fn new(registry: RunnerRegistry, client: RunnerClient) -> Self {
        let ttl = client.timeouts().models_cache_ttl;
        Self {
            registry,
            client,
            ttl,
            cache: Arc::new(RwLock::new(None)),
            models: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 結合済みモデル一覧（TTL内はキャッシュを返す）
    pub async fn get_all_models(&self) -> Vec<ModelEntry> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return cached.models.clone();
                }
            }
        }
        self.refresh().await
    }

    /// キャッシュを無視して再取得する
    pub async fn refresh(&self) -> Vec<ModelEntry> {
        let mut attempt = 1;
        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            let models = self.fetch_all_models().await;

            let mut cache = self.cache.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                drop(cache);
                if attempt < MAX_REFRESH_ATTEMPTS {
                    tracing::debug!(attempt, "Runner configuration changed during refresh; refetching");
                    attempt += 1;
                    continue;
                }
                tracing::warn!("Runner configuration kept changing; model catalogue not stored");
                return models;
            }

            *self.models.write().await = models
                .iter()
                .map(|entry| (entry.model.clone(), entry.clone()))
                .collect();
            *cache = Some(CachedModels {
                fetched_at: Instant::now(),
                models: models.clone(),
            });

            tracing::debug!(models = models.len(), "Model catalogue refreshed");
            return models;
        }
    }

    /// キャッシュとモデルマップを破棄する（設定更新時）
    ///
    /// 実行中の再取得の結果も破棄される。
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *cache = None;
        self.models.write().await.clear();
    }

    /// モデルIDでエントリを探す
    ///
    /// マップに無ければカタログを更新してからもう一度探す。
    pub async fn lookup(&self, model: &str) -> Option<ModelEntry> {
        if let Some(entry) = self.models.read().await.get(model) {
            return Some(entry.clone());
        }
        self.get_all_models()
            .await
            .into_iter()
            .find(|entry| entry.model == model)
    }

    /// ロード済みモデル一覧（`/api/ps` の結合、プレフィックスのみ適用）
    pub async fn get_loaded_models(&self) -> Vec<ModelEntry> {
        let config = self.registry.snapshot().await;
        self.fetch_loaded_models(&config).await
    }

    async fn fetch_all_models(&self) -> Vec<ModelEntry> {
        let config = self.registry.snapshot().await;
        if !config.enabled {
            return Vec::new();
        }

        let backends = config.backends();
        let lists = self.fan_out(&backends, "/api/tags").await;
        let decorated = backends
            .iter()
            .zip(lists)
            .map(|(backend, list)| list.map(|models| backend.decorate_models(models)))
            .collect();
        let mut merged = merge_model_lists(decorated);

        let loaded = self.fetch_loaded_models(&config).await;
        if loaded.is_empty() {
            tracing::debug!("No loaded models reported; expires_at left unset");
        }
        annotate_expires_at(&mut merged, &loaded);

        merged
    }

    async fn fetch_loaded_models(&self, config: &RunnerConfig) -> Vec<ModelEntry> {
        if !config.enabled {
            return Vec::new();
        }
        let backends = config.backends();
        let lists = self.fan_out(&backends, "/api/ps").await;
        let decorated = backends
            .iter()
            .zip(lists)
            .map(|(backend, list)| list.map(|models| backend.decorate_loaded_models(models)))
            .collect();
        merge_model_lists(decorated)
    }

    /// 有効なバックエンドへ並行してGETする（無効・失敗は `None`）
    async fn fan_out(&self, backends: &[Backend], path: &str) -> Vec<Option<Vec<ModelEntry>>> {
        let headers = HeaderMap::new();
        let requests = backends.iter().map(|backend| {
            let headers = &headers;
            async move {
                if !backend.is_enabled() {
                    return None;
                }
                let url = backend.endpoint(path);
                let response = self.client.get_json(&url, backend.key(), headers).await?;
                Some(ModelList::entries_from_response(&response))
            }
        });
        join_all(requests).await
    }
}
