//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建仓储、领域服务、应用服务与接口层状态。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::handlers::{ChatCommandHandler, ChatQueryHandler};
use crate::application::services::{PresenceTracker, RelayService, SyncService};
use crate::config::HubConfig;
use crate::domain::repository::{MediaStorage, ThreadRepository};
use crate::domain::service::{ChatDomainService, DomainLimits};
use crate::infrastructure::media::LocalMediaStorage;
use crate::infrastructure::persistence::{MemoryThreadRepository, PostgresThreadRepository};
use crate::infrastructure::rate_limit::SlidingWindowLimiter;
use crate::interface::state::AppState;

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub state: AppState,
    pub sync: Arc<SyncService>,
}

/// 构建应用上下文
///
/// 类似 Go Wire 的 Initialize 函数：仓储 -> 领域 -> 应用 -> 接口。
/// 在线窗口到期消费循环在这里挂到运行时上。
pub async fn initialize(config: HubConfig) -> Result<ApplicationContext> {
    let config = Arc::new(config);

    // 1. 线程仓储：配置了 PostgreSQL 就用它，否则进程内存
    let repo: Arc<dyn ThreadRepository> = if let Some(ref postgres_url) = config.storage.postgres_url
    {
        info!("Using PostgreSQL thread repository");
        let pool = Arc::new(
            sqlx::PgPool::connect(postgres_url)
                .await
                .context("Failed to connect to PostgreSQL")?,
        );
        let repo = PostgresThreadRepository::new(pool);
        repo.init_schema()
            .await
            .context("Failed to initialize PostgreSQL schema")?;
        Arc::new(repo)
    } else {
        info!("PostgreSQL URL not configured, using in-memory thread repository");
        Arc::new(MemoryThreadRepository::new())
    };

    // 2. 领域服务
    let domain = Arc::new(ChatDomainService::new(
        repo,
        DomainLimits {
            max_display_name_chars: config.limits.max_display_name_chars,
            max_text_chars: config.limits.max_text_chars,
        },
    ));

    // 3. 应用服务：转发注册表 + 在线状态 + 同步编排
    let relay = Arc::new(RelayService::new());
    let (presence, expiry_rx) = PresenceTracker::new(config.online_window());
    let sync = Arc::new(SyncService::new(domain, Arc::clone(&relay), presence));
    tokio::spawn(Arc::clone(&sync).run_expiry_loop(expiry_rx));

    // 4. 媒体存储与限流
    let media: Arc<dyn MediaStorage> = Arc::new(LocalMediaStorage::new(&config.media.upload_dir));
    let message_limiter = Arc::new(SlidingWindowLimiter::new(
        config.limits.message_rate_max,
        config.message_rate_window(),
    ));
    let image_limiter = Arc::new(SlidingWindowLimiter::new(
        config.limits.image_upload_max,
        config.upload_rate_window(),
    ));
    let audio_limiter = Arc::new(SlidingWindowLimiter::new(
        config.limits.audio_upload_max,
        config.upload_rate_window(),
    ));

    // 5. 接口层状态
    let state = AppState {
        commands: Arc::new(ChatCommandHandler::new(Arc::clone(&sync))),
        queries: Arc::new(ChatQueryHandler::new(Arc::clone(&sync))),
        relay,
        media,
        message_limiter,
        image_limiter,
        audio_limiter,
        config,
    };

    Ok(ApplicationContext { state, sync })
}
