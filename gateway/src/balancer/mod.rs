//! ロードバランサー
//!
//! モデルIDから、そのモデルを提供する有効なバックエンドをラウンドロビンで選ぶ。
//! カーソルはモデルIDごとに持つ。
//! バックエンドはブラックボックスとして扱い、負荷やレイテンシは考慮しない。
//! 失敗時の再試行も行わない。

use crate::registry::{ModelCatalogue, RunnerRegistry};
use dmr_gateway_common::error::{GatewayError, GatewayResult};
use dmr_gateway_common::types::Backend;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// ロードマネージャー
#[derive(Clone)]
pub struct LoadManager {
    registry: RunnerRegistry,
    catalogue: ModelCatalogue,
    round_robin: Arc<Mutex<HashMap<String, usize>>>,
}

impl LoadManager {
    /// 新しいロードマネージャーを作成
    pub fn new(registry: RunnerRegistry, catalogue: ModelCatalogue) -> Self {
        Self {
            registry,
            catalogue,
            round_robin: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// モデルを提供する有効なバックエンド一覧（添字順）
    async fn candidates_for_model(&self, model: &str) -> GatewayResult<Vec<Backend>> {
        let entry = self
            .catalogue
            .lookup(model)
            .await
            .ok_or_else(|| GatewayError::ModelNotFound(model.to_string()))?;
        let config = self.registry.snapshot().await;
        Ok(entry
            .urls
            .iter()
            .filter_map(|&idx| config.backend(idx))
            .filter(|backend| backend.is_enabled())
            .collect())
    }

    /// モデルに対応するバックエンドをラウンドロビンで選択
    pub async fn select_backend_round_robin_for_model(&self, model: &str) -> GatewayResult<Backend> {
        let backends = self.candidates_for_model(model).await?;
        let backend = self.select_backend_round_robin_from_backends(backends, model)?;
        tracing::debug!(
            model = %model,
            backend_idx = backend.idx,
            url = %backend.url,
            "Selected backend by round-robin"
        );
        Ok(backend)
    }

    /// モデルを提供する最初の有効なバックエンドを返す
    pub async fn first_backend_for_model(&self, model: &str) -> GatewayResult<Backend> {
        self.candidates_for_model(model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NoBackendsAvailable(model.to_string()))
    }

    /// 添字指定ならそのバックエンド、無ければラウンドロビンで選択
    pub async fn resolve(&self, model: &str, idx: Option<usize>) -> GatewayResult<Backend> {
        match idx {
            Some(idx) => self.backend_at(idx).await,
            None => self.select_backend_round_robin_for_model(model).await,
        }
    }

    /// 添字のバックエンドを返す（範囲外は404）
    pub async fn backend_at(&self, idx: usize) -> GatewayResult<Backend> {
        self.registry
            .backend(idx)
            .await
            .ok_or(GatewayError::BackendNotFound(idx))
    }

    fn select_backend_round_robin_from_backends(
        &self,
        backends: Vec<Backend>,
        model: &str,
    ) -> GatewayResult<Backend> {
        if backends.is_empty() {
            return Err(GatewayError::NoBackendsAvailable(model.to_string()));
        }

        let cursor = {
            let mut cursors = self
                .round_robin
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let cursor = cursors.entry(model.to_string()).or_insert(0);
            let current = *cursor;
            *cursor = cursor.wrapping_add(1);
            current
        };
        let index = cursor % backends.len();

        Ok(backends[index].clone())
    }
}
