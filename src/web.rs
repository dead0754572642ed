#![cfg(not(tarpaulin_include))]

use sheet_sync::app;
use sheet_sync::config::ServerConfig;

/// Main entry point for the session server
///
/// Reads `SHEET_SYNC_*` variables for the listen address, session max age,
/// sweep interval and upload settings, then serves the session API until the
/// process is stopped. Log level follows `RUST_LOG` (default `info`).
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    log::info!(
        "Sessions expire after {}s idle, swept every {}s",
        config.max_age.as_secs(),
        config.sweep_interval.as_secs()
    );

    app::run(config).await
}
