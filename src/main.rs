//! FlashGate - The Network Front End of FlashKV
//!
//! This is the main entry point for the FlashGate server.
//! It loads the configuration, sets up logging, and serves connections
//! until a termination signal arrives.

use clap::Parser;
use flashgate::config::{Opts, ServerConfig};
use flashgate::{logging, server};
use tracing::info;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
FlashGate v{} - RESP front end for FlashKV
──────────────────────────────────────────────────────────────
Server starting on {}
Drain timeout: {:?}
Logs: {}

Send SIGINT/SIGTERM to shut down gracefully.
"#,
        flashgate::VERSION,
        config.bind_address(),
        config.drain_timeout,
        config.log_dir.display(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults, then config file, then command-line flags
    let config = Opts::parse().into_config()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init(&config.log_dir)?;

    print_banner(&config);

    server::listen_and_serve_with_signal(&config).await?;

    info!("Server shutdown complete");
    Ok(())
}
