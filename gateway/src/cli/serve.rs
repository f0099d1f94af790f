//! serve サブコマンド
//!
//! ゲートウェイサーバーを起動します。

use crate::auth::ApiKeys;
use crate::client::RunnerClient;
use crate::config::{database_url, runner_config_from_env, GatewayConfig};
use crate::db::{migrations::initialize_database, settings::SettingsStorage};
use crate::registry::RunnerRegistry;
use crate::AppState;
use clap::{Args, Parser};
use dmr_gateway_common::error::GatewayResult;
use tracing::{info, warn};

/// serve サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long, default_value = "8080", env = "DMR_GATEWAY_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "DMR_GATEWAY_HOST")]
    pub host: String,
}

/// サブコマンド省略時に `ServeArgs` だけを解釈するためのパーサー
#[derive(Parser, Debug)]
#[command(name = "dmr-gateway")]
struct DefaultServe {
    #[command(flatten)]
    args: ServeArgs,
}

impl ServeArgs {
    /// 引数なしで解釈した値（環境変数とデフォルト値のみ）
    pub fn from_env() -> Result<Self, clap::Error> {
        DefaultServe::try_parse_from(["dmr-gateway"]).map(|parsed| parsed.args)
    }

    /// バインドアドレス
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 設定・DB・状態を組み立ててサーバーを起動する
pub async fn execute(args: &ServeArgs) -> GatewayResult<()> {
    let gateway_config = GatewayConfig::from_env();

    let db_url = database_url();
    let pool = initialize_database(&db_url).await?;
    let registry = RunnerRegistry::load(runner_config_from_env(), SettingsStorage::new(pool)).await?;

    if gateway_config.auth.disabled {
        warn!("Authentication is disabled (DMR_GATEWAY_AUTH_DISABLED)");
    } else if gateway_config.auth.admin_api_key.is_none() {
        warn!("DMR_GATEWAY_ADMIN_API_KEY is not set; admin endpoints will answer 403");
    }

    let client = RunnerClient::new(
        gateway_config.timeouts,
        gateway_config.forward_user_info_headers,
    )?;
    let state = AppState::new(
        registry.clone(),
        client,
        ApiKeys::from_config(&gateway_config.auth),
    );

    let config = registry.snapshot().await;
    info!(
        enabled = config.enabled,
        backends = ?config.base_urls,
        "Docker Model Runner backends configured"
    );

    crate::server::run(state, &args.bind_addr()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_reads_same_variables_as_serve() {
        std::env::set_var("DMR_GATEWAY_PORT", "9123");
        std::env::set_var("DMR_GATEWAY_HOST", "127.0.0.1");
        std::env::set_var("PORT", "1");
        let args = ServeArgs::from_env().unwrap();
        std::env::remove_var("DMR_GATEWAY_PORT");
        std::env::remove_var("DMR_GATEWAY_HOST");
        std::env::remove_var("PORT");

        assert_eq!(args.port, 9123);
        assert_eq!(args.bind_addr(), "127.0.0.1:9123");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("DMR_GATEWAY_PORT");
        std::env::remove_var("DMR_GATEWAY_HOST");
        let args = ServeArgs::from_env().unwrap();
        assert_eq!(args.bind_addr(), "0.0.0.0:8080");
    }
}
