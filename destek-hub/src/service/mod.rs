pub mod wire;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::HubConfig;
use crate::interface::http::build_router;

pub use wire::{initialize, ApplicationContext};

/// 服务入口：装配依赖并承载 HTTP/WebSocket 监听
pub struct HubServiceApp {
    address: SocketAddr,
    router: axum::Router,
}

impl HubServiceApp {
    pub async fn new(config: HubConfig) -> Result<Self> {
        let address: SocketAddr = format!("{}:{}", config.server.address, config.server.port)
            .parse()
            .context("invalid hub server address")?;

        let context = wire::initialize(config).await?;
        let router = build_router(context.state);

        Ok(Self { address, router })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.address)
            .await
            .with_context(|| format!("Failed to bind {}", self.address))?;

        info!(address = %self.address, "destek-hub listening");

        // 连接地址要进 handler（限流按客户端 IP），用 connect_info 版本
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
