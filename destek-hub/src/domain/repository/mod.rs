//! 仓储接口
//!
//! 线程存储是唯一的共享可变资源，所有读写路径都经过
//! ThreadRepository。实现方保证：同一线程的 append 串行化
//! （created_at 与 last_activity_at 的推进是原子的），
//! 不同线程的 append 互不阻塞。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::model::{Message, MessageKind, Sender, Thread, ThreadSummary};
use crate::error::ChatResult;

/// 线程与消息的权威存储
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// 写入新线程记录
    async fn create_thread(&self, thread: &Thread) -> ChatResult<()>;

    /// 按 id 取线程，不存在返回 None
    async fn get_thread(&self, thread_id: &str) -> ChatResult<Option<Thread>>;

    /// 列出摘要行，按 last_activity_at 降序；不返回消息正文
    ///
    /// 返回行的 online 一律为 false，由查询侧用在线状态跟踪器补齐。
    async fn list_threads(&self) -> ChatResult<Vec<ThreadSummary>>;

    /// 追加消息：分配 id / created_at（服务端时钟）/ seq，
    /// 推进 last_activity_at。线程不存在返回 NotFound。
    async fn append_message(
        &self,
        thread_id: &str,
        sender: Sender,
        kind: MessageKind,
        payload: String,
    ) -> ChatResult<Message>;

    /// 取消息，旧到新；带 before_id 时做向前翻页
    async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
        before_id: Option<&str>,
    ) -> ChatResult<Vec<Message>>;

    /// 清空单个线程的消息，线程记录保留（可 rejoin）。幂等。
    async fn clear_thread(&self, thread_id: &str) -> ChatResult<()>;

    /// 全量清空，原子执行，清掉的线程 id 之后一律 NotFound
    async fn clear_all(&self) -> ChatResult<()>;
}

/// 媒体目录（路径白名单，防目录穿越）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaFolder {
    Images,
    Audio,
}

impl MediaFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFolder::Images => "images",
            MediaFolder::Audio => "audio",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "images" => Some(MediaFolder::Images),
            "audio" => Some(MediaFolder::Audio),
            _ => None,
        }
    }
}

/// 媒体文件存储：落盘/对象存储由实现决定，核心只关心引用 URL
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// 保存一个上传文件，返回可回放的引用 URL
    async fn store(
        &self,
        folder: MediaFolder,
        original_name: Option<&str>,
        bytes: Bytes,
    ) -> ChatResult<String>;

    /// 读回一个已存储的文件
    async fn open(&self, folder: MediaFolder, file_name: &str) -> ChatResult<Vec<u8>>;
}
