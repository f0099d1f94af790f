//! CLI module for dmr-gateway
//!
//! Provides command-line interface for the gateway server.

pub mod serve;

use clap::{Parser, Subcommand};

/// DMR Gateway - Round-robin gateway for Docker Model Runner backends
#[derive(Parser, Debug)]
#[command(name = "dmr-gateway")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    DMR_GATEWAY_HOST                      Bind address (default: 0.0.0.0)
    DMR_GATEWAY_PORT                      Listen port (default: 8080)
    DMR_GATEWAY_LOG_LEVEL                 Log level (default: info)
    DMR_GATEWAY_LOG_DIR                   Directory for daily log files
    DMR_GATEWAY_DATABASE_URL              Database URL (default: sqlite:~/.dmr-gateway/gateway.db)
    DMR_GATEWAY_ADMIN_API_KEY             Key required by admin endpoints
    DMR_GATEWAY_API_KEY                   Key required by inference endpoints (optional)
    DMR_GATEWAY_AUTH_DISABLED             Disable auth checks (dev/test only)
    DMR_GATEWAY_CLIENT_TIMEOUT_SECS       Backend request timeout (default: 300)
    DMR_GATEWAY_MODEL_LIST_TIMEOUT_SECS   Model list timeout (default: 10)
    DMR_GATEWAY_MODELS_CACHE_TTL_SECS     Model catalogue cache TTL (default: 1)
    DMR_GATEWAY_FORWARD_USER_INFO_HEADERS Forward X-OpenWebUI-User-* headers
    ENABLE_DOCKER_MODEL_RUNNER_API        Enable the runner API (default: true)
    DOCKER_MODEL_RUNNER_BASE_URLS         Backend base URLs separated by ';'
    DOCKER_MODEL_RUNNER_BASE_URL          Single backend base URL
    USE_DOCKER_MODEL_RUNNER_DOCKER        Default to http://localhost:12434
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// 起動引数（サブコマンド省略時は `serve` と同じ環境変数・デフォルト値）
    pub fn into_serve_args(self) -> Result<serve::ServeArgs, clap::Error> {
        match self.command {
            Some(Commands::Serve(args)) => Ok(args),
            None => serve::ServeArgs::from_env(),
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway server
    Serve(serve::ServeArgs),
}
