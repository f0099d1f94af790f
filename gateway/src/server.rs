//! axumサーバー起動・シャットダウンハンドリング

use crate::AppState;
use dmr_gateway_common::error::{GatewayError, GatewayResult};
use std::future::Future;
use tracing::info;

/// axumサーバーを起動し、Ctrl+C / SIGTERM まで待機する
pub async fn run(state: AppState, bind_addr: &str) -> GatewayResult<()> {
    run_until(state, bind_addr, shutdown_signal()).await
}

/// 任意のシャットダウン条件でサーバーを起動する
pub async fn run_until<F>(state: AppState, bind_addr: &str, shutdown: F) -> GatewayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = crate::api::create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| GatewayError::Internal(format!("Failed to bind to {}: {}", bind_addr, e)))?;

    info!("DMR Gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::Internal(format!("Server error: {}", e)))?;

    info!("Server shutdown complete");
    Ok(())
}

/// シャットダウンシグナルを待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
