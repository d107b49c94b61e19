//! 服务错误类型定义

use thiserror::Error;

/// 中继服务错误类型
///
/// Validation / InvalidState 在会话边界就地处理，不触碰存储；
/// StoreUnavailable 必须透传给调用方，消息不允许被静默丢弃。
#[derive(Debug, Error)]
pub enum ChatError {
    /// 输入不合法（空昵称、超长内容等），不重试
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 会话或消息不存在，客户端回退到 join 流程
    #[error("Not found: {0}")]
    NotFound(String),

    /// 协议违规（未 join 先发消息等），连接保持打开
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 存储故障，调用方必须感知发送是否成功
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 中继服务结果类型
pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    /// 线上 message_error 事件的 reason 标签
    pub fn reason(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation_failed",
            ChatError::NotFound(_) => "not_found",
            ChatError::InvalidState(_) => "invalid_state",
            ChatError::StoreUnavailable(_) => "store_failed",
            ChatError::Other(_) => "internal_error",
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::StoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        assert_eq!(ChatError::Validation("x".into()).reason(), "validation_failed");
        assert_eq!(ChatError::NotFound("x".into()).reason(), "not_found");
        assert_eq!(ChatError::InvalidState("x".into()).reason(), "invalid_state");
        assert_eq!(
            ChatError::StoreUnavailable("x".into()).reason(),
            "store_failed"
        );
    }
}
