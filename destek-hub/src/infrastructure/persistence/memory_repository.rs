//! 进程内存仓储
//!
//! 默认后端，也是并发纪律的参照实现：
//! 每个线程一把槽位锁，同一线程的 append 串行化
//! （created_at 分配与 last_activity_at 推进原子完成），
//! 不同线程各自持锁、互不阻塞；clear_all 以整表置换保证原子性。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::domain::model::{Message, MessageKind, Sender, Thread, ThreadSummary};
use crate::domain::repository::ThreadRepository;
use crate::error::{ChatError, ChatResult};

struct ThreadSlot {
    meta: Thread,
    messages: Vec<Message>,
    next_seq: i64,
}

/// 内存线程仓储
pub struct MemoryThreadRepository {
    threads: RwLock<HashMap<String, Arc<Mutex<ThreadSlot>>>>,
}

impl MemoryThreadRepository {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, thread_id: &str) -> ChatResult<Arc<Mutex<ThreadSlot>>> {
        let threads = self.threads.read().await;
        threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("thread {}", thread_id)))
    }
}

impl Default for MemoryThreadRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadRepository for MemoryThreadRepository {
    async fn create_thread(&self, thread: &Thread) -> ChatResult<()> {
        let mut threads = self.threads.write().await;
        threads.insert(
            thread.id.clone(),
            Arc::new(Mutex::new(ThreadSlot {
                meta: thread.clone(),
                messages: Vec::new(),
                next_seq: 1,
            })),
        );
        Ok(())
    }

    async fn get_thread(&self, thread_id: &str) -> ChatResult<Option<Thread>> {
        let slot = {
            let threads = self.threads.read().await;
            threads.get(thread_id).cloned()
        };
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.meta.clone())),
            None => Ok(None),
        }
    }

    async fn list_threads(&self) -> ChatResult<Vec<ThreadSummary>> {
        let slots: Vec<Arc<Mutex<ThreadSlot>>> = {
            let threads = self.threads.read().await;
            threads.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            let slot = slot.lock().await;
            summaries.push(ThreadSummary {
                id: slot.meta.id.clone(),
                display_name: slot.meta.display_name.clone(),
                last_activity_at: slot.meta.last_activity_at,
                online: false,
                preview: slot.messages.last().map(|m| m.preview()),
            });
        }

        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(summaries)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        sender: Sender,
        kind: MessageKind,
        payload: String,
    ) -> ChatResult<Message> {
        let slot = self.slot(thread_id).await?;
        let mut slot = slot.lock().await;

        // 服务端时钟，且严格大于前一条：粗粒度时钟下并发 append
        // 也能得到严格递增的 created_at
        let mut created_at = Utc::now();
        if let Some(last) = slot.messages.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + ChronoDuration::milliseconds(1);
            }
        }

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            sender,
            kind,
            payload,
            created_at,
            seq: slot.next_seq,
        };
        slot.next_seq += 1;
        slot.messages.push(message.clone());
        if created_at > slot.meta.last_activity_at {
            slot.meta.last_activity_at = created_at;
        }

        Ok(message)
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
        before_id: Option<&str>,
    ) -> ChatResult<Vec<Message>> {
        let slot = self.slot(thread_id).await?;
        let slot = slot.lock().await;

        let upper = match before_id {
            Some(anchor) => slot
                .messages
                .iter()
                .position(|m| m.id == anchor)
                .ok_or_else(|| {
                    ChatError::Validation(format!("unknown before_id {}", anchor))
                })?,
            None => slot.messages.len(),
        };

        let lower = match limit {
            Some(limit) => upper.saturating_sub(limit),
            None => 0,
        };

        Ok(slot.messages[lower..upper].to_vec())
    }

    async fn clear_thread(&self, thread_id: &str) -> ChatResult<()> {
        // 幂等：对已空线程清空同样成功
        let slot = self.slot(thread_id).await?;
        let mut slot = slot.lock().await;
        slot.messages.clear();
        Ok(())
    }

    async fn clear_all(&self) -> ChatResult<()> {
        // 整表置换：并发读者要么看到旧表、要么看到空表，没有中间态
        let mut threads = self.threads.write().await;
        *threads = HashMap::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo_with_thread() -> (MemoryThreadRepository, Thread) {
        let repo = MemoryThreadRepository::new();
        let thread = Thread::new("Ayşe".to_string());
        repo.create_thread(&thread).await.unwrap();
        (repo, thread)
    }

    #[tokio::test]
    async fn test_message_ids_are_unique_and_ordered() {
        let (repo, thread) = repo_with_thread().await;

        for i in 0..10 {
            repo.append_message(
                &thread.id,
                Sender::Visitor,
                MessageKind::Text,
                format!("m{}", i),
            )
            .await
            .unwrap();
        }

        let messages = repo.list_messages(&thread.id, None, None).await.unwrap();
        assert_eq!(messages.len(), 10);

        for pair in messages.windows(2) {
            assert_ne!(pair[0].id, pair[1].id);
            assert!(pair[0].created_at < pair[1].created_at);
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_lose_updates() {
        let (repo, thread) = repo_with_thread().await;
        let repo = Arc::new(repo);

        let a = {
            let repo = repo.clone();
            let id = thread.id.clone();
            tokio::spawn(async move {
                repo.append_message(&id, Sender::Visitor, MessageKind::Text, "a".into())
                    .await
            })
        };
        let b = {
            let repo = repo.clone();
            let id = thread.id.clone();
            tokio::spawn(async move {
                repo.append_message(&id, Sender::Admin, MessageKind::Text, "b".into())
                    .await
            })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_ne!(a.id, b.id);
        assert_ne!(a.created_at, b.created_at);

        let messages = repo.list_messages(&thread.id, None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn test_last_activity_is_monotone() {
        let (repo, thread) = repo_with_thread().await;
        let before = repo.get_thread(&thread.id).await.unwrap().unwrap();

        repo.append_message(&thread.id, Sender::Visitor, MessageKind::Text, "hi".into())
            .await
            .unwrap();

        let after = repo.get_thread(&thread.id).await.unwrap().unwrap();
        assert!(after.last_activity_at >= before.last_activity_at);
    }

    #[tokio::test]
    async fn test_reverse_pagination_by_before_id() {
        let (repo, thread) = repo_with_thread().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let msg = repo
                .append_message(&thread.id, Sender::Visitor, MessageKind::Text, format!("m{}", i))
                .await
                .unwrap();
            ids.push(msg.id);
        }

        // 锚点 m3：往前取 2 条应为 m1, m2（旧到新）
        let page = repo
            .list_messages(&thread.id, Some(2), Some(&ids[3]))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[1]);
        assert_eq!(page[1].id, ids[2]);

        let err = repo
            .list_messages(&thread.id, Some(2), Some("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_limit_returns_most_recent_tail() {
        let (repo, thread) = repo_with_thread().await;
        for i in 0..5 {
            repo.append_message(&thread.id, Sender::Visitor, MessageKind::Text, format!("m{}", i))
                .await
                .unwrap();
        }

        let tail = repo.list_messages(&thread.id, Some(2), None).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].payload, "m3");
        assert_eq!(tail[1].payload, "m4");
    }

    #[tokio::test]
    async fn test_clear_thread_keeps_record() {
        let (repo, thread) = repo_with_thread().await;
        repo.append_message(&thread.id, Sender::Visitor, MessageKind::Text, "hi".into())
            .await
            .unwrap();

        repo.clear_thread(&thread.id).await.unwrap();
        assert!(repo.list_messages(&thread.id, None, None).await.unwrap().is_empty());
        assert!(repo.get_thread(&thread.id).await.unwrap().is_some());

        // 幂等：再清一次照样成功
        repo.clear_thread(&thread.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_invalidates_ids() {
        let (repo, thread) = repo_with_thread().await;
        repo.clear_all().await.unwrap();

        assert!(repo.list_threads().await.unwrap().is_empty());
        assert!(repo.get_thread(&thread.id).await.unwrap().is_none());

        let err = repo
            .append_message(&thread.id, Sender::Visitor, MessageKind::Text, "hi".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_summaries_carry_preview_not_bodies() {
        let (repo, thread) = repo_with_thread().await;
        repo.append_message(
            &thread.id,
            Sender::Visitor,
            MessageKind::Text,
            "x".repeat(200),
        )
        .await
        .unwrap();

        let summaries = repo.list_threads().await.unwrap();
        assert_eq!(summaries.len(), 1);
        let preview = summaries[0].preview.as_ref().unwrap();
        assert!(preview.chars().count() <= 53);
    }
}
