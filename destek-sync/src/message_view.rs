//! 单个会话的消息视图：幂等合并 + 服务端时间序

use std::collections::HashSet;

use destek_types::Message;
use tracing::debug;

/// 一个客户端视图里已物化的消息集合
///
/// 合并规则：按消息 id 去重，重复投递（推送一次、历史拉取一次）
/// 只落一条；排序键是服务端分配的 `(created_at, seq)`，
/// 与客户端本地时钟无关。
#[derive(Debug, Default)]
pub struct MessageView {
    seen: HashSet<String>,
    messages: Vec<Message>,
}

impl MessageView {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一条消息，返回是否真正插入
    pub fn merge(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            debug!(message_id = %message.id, "duplicate delivery ignored");
            return false;
        }

        let key = message.order_key();
        let pos = self
            .messages
            .partition_point(|existing| existing.order_key() <= key);
        self.messages.insert(pos, message);
        true
    }

    /// 合并一批历史消息，返回新插入的条数
    pub fn merge_history<I>(&mut self, history: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        history
            .into_iter()
            .filter(|message| self.merge(message.clone()))
            .count()
    }

    /// 渲染顺序的消息切片
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 清空本地视图（对应服务端 clear）
    pub fn clear(&mut self) {
        self.seen.clear();
        self.messages.clear();
    }
}
