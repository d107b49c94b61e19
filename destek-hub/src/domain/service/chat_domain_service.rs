//! 聊天领域服务 - 校验与存储编排
//!
//! 所有进入线程存储的写路径在这里过校验；
//! 校验失败同步拒绝，绝不触碰仓储。

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::model::{Message, MessageKind, Sender, Thread, ThreadSummary};
use crate::domain::repository::ThreadRepository;
use crate::error::{ChatError, ChatResult};

/// 领域校验上限
#[derive(Clone, Copy, Debug)]
pub struct DomainLimits {
    pub max_display_name_chars: usize,
    pub max_text_chars: usize,
}

impl Default for DomainLimits {
    fn default() -> Self {
        Self {
            max_display_name_chars: 64,
            max_text_chars: 4096,
        }
    }
}

/// 聊天领域服务
pub struct ChatDomainService {
    repo: Arc<dyn ThreadRepository>,
    limits: DomainLimits,
}

impl ChatDomainService {
    pub fn new(repo: Arc<dyn ThreadRepository>, limits: DomainLimits) -> Self {
        Self { repo, limits }
    }

    /// 创建线程：昵称去空白后必须非空且在上限内
    pub async fn create_thread(&self, display_name: &str) -> ChatResult<Thread> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ChatError::Validation(
                "display name must not be empty".to_string(),
            ));
        }
        if display_name.chars().count() > self.limits.max_display_name_chars {
            return Err(ChatError::Validation(format!(
                "display name exceeds {} characters",
                self.limits.max_display_name_chars
            )));
        }

        let thread = Thread::new(display_name.to_string());
        self.repo.create_thread(&thread).await?;

        info!(thread_id = %thread.id, display_name = %thread.display_name, "Thread created");
        Ok(thread)
    }

    /// 取线程，不存在时给出 NotFound
    pub async fn get_thread(&self, thread_id: &str) -> ChatResult<Thread> {
        self.repo
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("thread {}", thread_id)))
    }

    pub async fn thread_exists(&self, thread_id: &str) -> ChatResult<bool> {
        Ok(self.repo.get_thread(thread_id).await?.is_some())
    }

    pub async fn list_threads(&self) -> ChatResult<Vec<ThreadSummary>> {
        self.repo.list_threads().await
    }

    /// 追加消息：按内容类型校验 payload，再交给仓储分配身份与时间
    pub async fn append_message(
        &self,
        thread_id: &str,
        sender: Sender,
        kind: MessageKind,
        payload: String,
    ) -> ChatResult<Message> {
        match kind {
            MessageKind::Text => {
                if payload.trim().is_empty() {
                    return Err(ChatError::Validation(
                        "text payload must not be empty".to_string(),
                    ));
                }
                if payload.chars().count() > self.limits.max_text_chars {
                    return Err(ChatError::Validation(format!(
                        "text payload exceeds {} characters",
                        self.limits.max_text_chars
                    )));
                }
            }
            MessageKind::Image | MessageKind::Audio => {
                if payload.trim().is_empty() {
                    return Err(ChatError::Validation(
                        "media payload must carry a reference url".to_string(),
                    ));
                }
            }
        }

        self.repo
            .append_message(thread_id, sender, kind, payload)
            .await
    }

    pub async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
        before_id: Option<&str>,
    ) -> ChatResult<Vec<Message>> {
        self.repo.list_messages(thread_id, limit, before_id).await
    }

    /// 清空单个线程，幂等
    pub async fn clear_thread(&self, thread_id: &str) -> ChatResult<()> {
        self.repo.clear_thread(thread_id).await?;
        info!(thread_id = %thread_id, "Thread messages cleared");
        Ok(())
    }

    /// 全量清空，不可逆
    pub async fn clear_all(&self) -> ChatResult<()> {
        self.repo.clear_all().await?;
        warn!("All threads and messages cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemoryThreadRepository;

    fn service() -> ChatDomainService {
        ChatDomainService::new(
            Arc::new(MemoryThreadRepository::new()),
            DomainLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_display_name_is_rejected() {
        let service = service();
        let err = service.create_thread("   ").await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_display_name_is_trimmed() {
        let service = service();
        let thread = service.create_thread("  Ayşe  ").await.unwrap();
        assert_eq!(thread.display_name, "Ayşe");
    }

    #[tokio::test]
    async fn test_oversized_text_is_rejected() {
        let service = service();
        let thread = service.create_thread("Ayşe").await.unwrap();

        let err = service
            .append_message(&thread.id, Sender::Visitor, MessageKind::Text, "x".repeat(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_media_requires_reference_url() {
        let service = service();
        let thread = service.create_thread("Ayşe").await.unwrap();

        let err = service
            .append_message(&thread.id, Sender::Visitor, MessageKind::Image, "  ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_to_missing_thread_is_not_found() {
        let service = service();
        let err = service
            .append_message("ghost", Sender::Admin, MessageKind::Text, "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }
}
