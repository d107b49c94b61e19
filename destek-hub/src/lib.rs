//! destek-hub：在线客服中继服务
//!
//! 访客与管理端通过 WebSocket 通道交换文本/图片/语音消息，
//! 服务端持有会话注册表。核心是消息-会话同步内核：
//! 线程存储、在线状态跟踪、通道会话状态机与同步服务。

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interface;
pub mod service;
