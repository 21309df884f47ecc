use anyhow::Context;
use ragline_server::{ServerConfig, run_server};
use ragline_telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    init_telemetry("ragline-server", config.log_format);

    run_server(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await
}
