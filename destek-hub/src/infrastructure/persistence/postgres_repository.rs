//! # PostgreSQL 线程仓储
//!
//! 持久化后端。同一线程的 append 用行锁串行化
//! （SELECT ... FOR UPDATE），不同线程的事务并行推进；
//! clear_all 在单个事务内完成，读者看不到半清空状态。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::domain::model::{preview_of, Message, MessageKind, Sender, Thread, ThreadSummary};
use crate::domain::repository::ThreadRepository;
use crate::error::{ChatError, ChatResult};

/// PostgreSQL 线程仓储实现
pub struct PostgresThreadRepository {
    pool: Arc<PgPool>,
}

impl PostgresThreadRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 初始化表结构（幂等）
    pub async fn init_schema(&self) -> ChatResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                last_activity_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                sender TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                seq BIGINT NOT NULL,
                UNIQUE (thread_id, seq)
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_order \
             ON messages(thread_id, created_at, seq)",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_threads_activity \
             ON threads(last_activity_at DESC)",
        )
        .execute(&*self.pool)
        .await?;

        info!("PostgreSQL thread schema initialized");
        Ok(())
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> ChatResult<Message> {
        let sender_raw: String = row.try_get("sender")?;
        let kind_raw: String = row.try_get("kind")?;

        let sender = Sender::from_str(&sender_raw).ok_or_else(|| {
            ChatError::StoreUnavailable(format!("corrupt sender column: {}", sender_raw))
        })?;
        let kind = MessageKind::from_str(&kind_raw).ok_or_else(|| {
            ChatError::StoreUnavailable(format!("corrupt kind column: {}", kind_raw))
        })?;

        Ok(Message {
            id: row.try_get("id")?,
            thread_id: row.try_get("thread_id")?,
            sender,
            kind,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            seq: row.try_get("seq")?,
        })
    }
}

#[async_trait]
impl ThreadRepository for PostgresThreadRepository {
    async fn create_thread(&self, thread: &Thread) -> ChatResult<()> {
        sqlx::query(
            "INSERT INTO threads (id, display_name, created_at, last_activity_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&thread.id)
        .bind(&thread.display_name)
        .bind(thread.created_at)
        .bind(thread.last_activity_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn get_thread(&self, thread_id: &str) -> ChatResult<Option<Thread>> {
        let row = sqlx::query(
            "SELECT id, display_name, created_at, last_activity_at FROM threads WHERE id = $1",
        )
        .bind(thread_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| {
            Ok(Thread {
                id: row.try_get("id")?,
                display_name: row.try_get("display_name")?,
                created_at: row.try_get("created_at")?,
                last_activity_at: row.try_get("last_activity_at")?,
            })
        })
        .transpose()
    }

    async fn list_threads(&self) -> ChatResult<Vec<ThreadSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.display_name, t.last_activity_at, m.kind, m.payload
            FROM threads t
            LEFT JOIN LATERAL (
                SELECT kind, payload
                FROM messages
                WHERE thread_id = t.id
                ORDER BY created_at DESC, seq DESC
                LIMIT 1
            ) m ON TRUE
            ORDER BY t.last_activity_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_raw: Option<String> = row.try_get("kind")?;
            let payload: Option<String> = row.try_get("payload")?;
            let preview = match (kind_raw.as_deref().and_then(MessageKind::from_str), payload) {
                (Some(kind), Some(payload)) => Some(preview_of(kind, &payload)),
                _ => None,
            };

            summaries.push(ThreadSummary {
                id: row.try_get("id")?,
                display_name: row.try_get("display_name")?,
                last_activity_at: row.try_get("last_activity_at")?,
                online: false,
                preview,
            });
        }
        Ok(summaries)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        sender: Sender,
        kind: MessageKind,
        payload: String,
    ) -> ChatResult<Message> {
        let mut tx = self.pool.begin().await?;

        // 行锁把同一线程的并发 append 串起来
        let locked = sqlx::query("SELECT last_activity_at FROM threads WHERE id = $1 FOR UPDATE")
            .bind(thread_id)
            .fetch_optional(&mut *tx)
            .await?;
        let last_activity: DateTime<Utc> = match locked {
            Some(row) => row.try_get("last_activity_at")?,
            None => return Err(ChatError::NotFound(format!("thread {}", thread_id))),
        };

        let tail = sqlx::query(
            "SELECT created_at, seq FROM messages WHERE thread_id = $1 \
             ORDER BY seq DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut created_at = Utc::now();
        let seq = match tail {
            Some(row) => {
                let tail_created: DateTime<Utc> = row.try_get("created_at")?;
                let tail_seq: i64 = row.try_get("seq")?;
                if created_at <= tail_created {
                    created_at = tail_created + ChronoDuration::milliseconds(1);
                }
                tail_seq + 1
            }
            None => 1,
        };

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            sender,
            kind,
            payload,
            created_at,
            seq,
        };

        sqlx::query(
            "INSERT INTO messages (id, thread_id, sender, kind, payload, created_at, seq) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&message.id)
        .bind(&message.thread_id)
        .bind(message.sender.as_str())
        .bind(message.kind.as_str())
        .bind(&message.payload)
        .bind(message.created_at)
        .bind(message.seq)
        .execute(&mut *tx)
        .await?;

        if created_at > last_activity {
            sqlx::query("UPDATE threads SET last_activity_at = $2 WHERE id = $1")
                .bind(thread_id)
                .bind(created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(message)
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
        before_id: Option<&str>,
    ) -> ChatResult<Vec<Message>> {
        if self.get_thread(thread_id).await?.is_none() {
            return Err(ChatError::NotFound(format!("thread {}", thread_id)));
        }

        let anchor = match before_id {
            Some(anchor_id) => {
                let row = sqlx::query(
                    "SELECT created_at, seq FROM messages WHERE id = $1 AND thread_id = $2",
                )
                .bind(anchor_id)
                .bind(thread_id)
                .fetch_optional(&*self.pool)
                .await?
                .ok_or_else(|| {
                    ChatError::Validation(format!("unknown before_id {}", anchor_id))
                })?;
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                let seq: i64 = row.try_get("seq")?;
                Some((created_at, seq))
            }
            None => None,
        };

        let limit = limit.map(|l| l as i64);

        // 新到旧取一页再反转，翻页锚点用 (created_at, seq) 复合键
        let rows = match anchor {
            Some((anchor_ts, anchor_seq)) => {
                sqlx::query(
                    "SELECT id, thread_id, sender, kind, payload, created_at, seq \
                     FROM messages \
                     WHERE thread_id = $1 AND (created_at, seq) < ($2, $3) \
                     ORDER BY created_at DESC, seq DESC \
                     LIMIT $4",
                )
                .bind(thread_id)
                .bind(anchor_ts)
                .bind(anchor_seq)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, thread_id, sender, kind, payload, created_at, seq \
                     FROM messages \
                     WHERE thread_id = $1 \
                     ORDER BY created_at DESC, seq DESC \
                     LIMIT $2",
                )
                .bind(thread_id)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
        };

        let mut messages = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<ChatResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn clear_thread(&self, thread_id: &str) -> ChatResult<()> {
        if self.get_thread(thread_id).await?.is_none() {
            return Err(ChatError::NotFound(format!("thread {}", thread_id)));
        }
        sqlx::query("DELETE FROM messages WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> ChatResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM threads").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
