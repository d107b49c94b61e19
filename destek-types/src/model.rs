//! 领域模型
//!
//! Thread 是一次访客对话的隔离与排序单元；Message 在所属 Thread 内
//! 由服务端时间戳全序排列，创建后不可变。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话列表预览长度（字符数）
pub const PREVIEW_LEN: usize = 50;

/// 消息发送方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Visitor,
    Admin,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Visitor => "visitor",
            Sender::Admin => "admin",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "visitor" => Some(Sender::Visitor),
            "admin" => Some(Sender::Admin),
            _ => None,
        }
    }
}

/// 消息内容类型
///
/// text 的 payload 是正文；image/audio 的 payload 是外部存储的引用 URL。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "audio" => Some(MessageKind::Audio),
            _ => None,
        }
    }
}

/// 一次访客对话
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    /// 单调不减，由消息追加与心跳推进
    pub last_activity_at: DateTime<Utc>,
}

impl Thread {
    /// 新建会话，id 使用 UUID v4，重连期间保持稳定
    pub fn new(display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// 一条聊天消息
///
/// `created_at` 是服务端收取时间，不采用客户端时钟；
/// `seq` 是线程内单调序号，用于打破同毫秒时间戳的并列。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub sender: Sender,
    pub kind: MessageKind,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

impl Message {
    /// 线程内全序排序键
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.seq)
    }

    /// 列表视图用的内容预览
    pub fn preview(&self) -> String {
        preview_of(self.kind, &self.payload)
    }
}

/// 会话列表行：只带预览，不带消息正文
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub display_name: String,
    pub last_activity_at: DateTime<Utc>,
    pub online: bool,
    pub preview: Option<String>,
}

/// 生成消息预览：文本取前 PREVIEW_LEN 个字符，媒体消息用占位文案
pub fn preview_of(kind: MessageKind, payload: &str) -> String {
    match kind {
        MessageKind::Text => {
            let mut chars = payload.chars();
            let head: String = chars.by_ref().take(PREVIEW_LEN).collect();
            if chars.next().is_some() {
                format!("{}...", head)
            } else {
                head
            }
        }
        MessageKind::Image => "[image]".to_string(),
        MessageKind::Audio => "[audio]".to_string(),
    }
}
