use destek_hub::config::HubConfig;
use destek_hub::service::HubServiceApp;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = HubConfig::load(None)?;
    let app = HubServiceApp::new(config).await?;

    info!(
        address = %app.address(),
        "Starting destek-hub service"
    );

    app.run().await
}
