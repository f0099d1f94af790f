//! テスト用ゲートウェイの組み立て

use super::http::{spawn_router, TestServer};
use dmr_gateway::api::create_app;
use dmr_gateway::auth::ApiKeys;
use dmr_gateway::client::RunnerClient;
use dmr_gateway::config::{AuthConfig, TimeoutConfig};
use dmr_gateway::registry::RunnerRegistry;
use dmr_gateway::AppState;
use dmr_gateway_common::config::RunnerConfig;
use serde_json::Value;
use std::time::Duration;

/// JSONからランナー設定を作る
#[allow(dead_code)]
pub fn runner_config(value: Value) -> RunnerConfig {
    serde_json::from_value(value).unwrap()
}

/// 認証なしの状態を作る
#[allow(dead_code)]
pub fn open_state(config: RunnerConfig) -> AppState {
    state_with_keys(config, ApiKeys::disabled())
}

/// 指定のキー設定で状態を作る
#[allow(dead_code)]
pub fn state_with_auth(config: RunnerConfig, auth: AuthConfig) -> AppState {
    state_with_keys(config, ApiKeys::from_config(&auth))
}

fn state_with_keys(config: RunnerConfig, api_keys: ApiKeys) -> AppState {
    let timeouts = TimeoutConfig {
        request: Duration::from_secs(10),
        model_list: Duration::from_secs(5),
        models_cache_ttl: Duration::from_secs(60),
    };
    let client = RunnerClient::new(timeouts, false).unwrap();
    AppState::new(RunnerRegistry::new(config), client, api_keys)
}

/// ゲートウェイを実ポートで起動する
#[allow(dead_code)]
pub async fn spawn_gateway(state: AppState) -> TestServer {
    spawn_router(create_app(state)).await
}
