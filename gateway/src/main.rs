//! DMR Gateway Server Entry Point

use clap::Parser;
use dmr_gateway::cli::Cli;
use dmr_gateway::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let args = match cli.into_serve_args() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    let _log_guard = match logging::init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = dmr_gateway::cli::serve::execute(&args).await {
        tracing::error!("Gateway failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
