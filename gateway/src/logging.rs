//! ロギング初期化
//!
//! 標準エラー出力に加え、`DMR_GATEWAY_LOG_DIR` が設定されていれば
//! 日次ローテーションのファイルへも出力する。

use crate::config::get_env_with_fallback;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログファイル名のプレフィックス
pub const LOG_FILE_PREFIX: &str = "dmr-gateway.log";

/// フィルタ文字列を決定する（`RUST_LOG` > `DMR_GATEWAY_LOG_LEVEL` > `info`）
pub fn filter_directive() -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| get_env_with_fallback("DMR_GATEWAY_LOG_LEVEL", "LOG_LEVEL"))
        .unwrap_or_else(|| "info".to_string())
}

/// ログ出力先ディレクトリ
pub fn log_dir() -> Option<PathBuf> {
    std::env::var("DMR_GATEWAY_LOG_DIR")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// グローバルサブスクライバーを初期化する
///
/// ファイル出力時は返された `WorkerGuard` をプロセス終了まで保持すること。
pub fn init() -> std::io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    // テスト等で既に設定済みの場合は無視する
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}
