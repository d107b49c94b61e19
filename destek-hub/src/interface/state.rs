//! 接口层共享状态
//!
//! 所有 handler 通过 axum State 拿到同一组应用服务的句柄。

use std::sync::Arc;

use crate::application::handlers::{ChatCommandHandler, ChatQueryHandler};
use crate::application::services::RelayService;
use crate::config::HubConfig;
use crate::domain::repository::MediaStorage;
use crate::infrastructure::rate_limit::SlidingWindowLimiter;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<ChatCommandHandler>,
    pub queries: Arc<ChatQueryHandler>,
    pub relay: Arc<RelayService>,
    pub media: Arc<dyn MediaStorage>,
    /// 通道消息限流（按客户端地址）
    pub message_limiter: Arc<SlidingWindowLimiter>,
    pub image_limiter: Arc<SlidingWindowLimiter>,
    pub audio_limiter: Arc<SlidingWindowLimiter>,
    pub config: Arc<HubConfig>,
}
