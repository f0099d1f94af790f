//! DMR Gateway Server
//!
//! 複数のDocker Model Runner（Ollama互換API）を1つのエンドポイントとして公開する
//! ルーティング・ロードバランシング層

#![warn(missing_docs)]

/// REST APIハンドラー
pub mod api;

/// 認証（APIキー）
pub mod auth;

/// ロードバランサー（ラウンドロビン）
pub mod balancer;

/// CLIインターフェース
pub mod cli;

/// バックエンドHTTPクライアント
pub mod client;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// データベースアクセス
pub mod db;

/// ロギング初期化ユーティリティ
pub mod logging;

/// ランナー設定レジストリ・モデルカタログ
pub mod registry;

/// axumサーバー起動・シャットダウンハンドリング
pub mod server;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// ランナー設定
    pub registry: registry::RunnerRegistry,
    /// 結合済みモデルカタログ
    pub catalogue: registry::ModelCatalogue,
    /// ロードマネージャー
    pub load_manager: balancer::LoadManager,
    /// 共有HTTPクライアント（接続プーリング有効）
    pub client: client::RunnerClient,
    /// APIキー
    pub api_keys: auth::ApiKeys,
}

impl AppState {
    /// レジストリとクライアントから状態を組み立てる
    pub fn new(
        registry: registry::RunnerRegistry,
        client: client::RunnerClient,
        api_keys: auth::ApiKeys,
    ) -> Self {
        let catalogue = registry::ModelCatalogue::new(registry.clone(), client.clone());
        let load_manager = balancer::LoadManager::new(registry.clone(), catalogue.clone());
        Self {
            registry,
            catalogue,
            load_manager,
            client,
            api_keys,
        }
    }
}
