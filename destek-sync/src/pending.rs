//! 乐观发送的 pending/confirmed 状态
//!
//! 本地回显不再被当作事实：发送时只挂一个带临时 id 的 pending 条目，
//! 服务端 message_accepted 带回权威消息后，pending 被替换并走幂等合并。
//! 发送失败（message_error / 断线）时 pending 可以整体丢弃重试。

use destek_types::{Message, MessageKind, Sender};
use tracing::debug;

use crate::message_view::MessageView;

/// 尚未被服务端确认的本地条目
#[derive(Clone, Debug)]
pub struct PendingMessage {
    pub local_id: String,
    pub sender: Sender,
    pub kind: MessageKind,
    pub payload: String,
}

/// 渲染条目：已确认的消息在前，pending 挂在尾部
#[derive(Debug)]
pub enum RenderEntry<'a> {
    Confirmed(&'a Message),
    Pending(&'a PendingMessage),
}

/// 一个会话的完整客户端视图：已确认消息 + 待确认队列
#[derive(Debug, Default)]
pub struct ClientView {
    view: MessageView,
    pending: Vec<PendingMessage>,
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发送前挂起一个 pending 条目，返回临时 id
    pub fn push_pending(&mut self, sender: Sender, kind: MessageKind, payload: String) -> String {
        let local_id = uuid::Uuid::new_v4().to_string();
        self.pending.push(PendingMessage {
            local_id: local_id.clone(),
            sender,
            kind,
            payload,
        });
        local_id
    }

    /// 服务端回执：解除对应 pending 并合并权威消息
    pub fn confirm(&mut self, local_id: Option<&str>, message: Message) -> bool {
        if let Some(local_id) = local_id {
            let before = self.pending.len();
            self.pending.retain(|entry| entry.local_id != local_id);
            if self.pending.len() == before {
                debug!(%local_id, "no pending entry for ack, merging anyway");
            }
        }
        self.view.merge(message)
    }

    /// 发送失败，撤掉对应 pending（调用方负责重试）
    pub fn reject(&mut self, local_id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|entry| entry.local_id != local_id);
        self.pending.len() != before
    }

    /// 断线后丢弃所有 pending；历史会在 rejoin 后整体重拉
    pub fn drop_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// 来自推送或历史拉取的权威消息
    pub fn apply(&mut self, message: Message) -> bool {
        self.view.merge(message)
    }

    pub fn apply_history<I>(&mut self, history: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        self.view.merge_history(history)
    }

    /// 渲染顺序：已确认消息按服务端时间序，pending 按发送顺序垫底
    pub fn render(&self) -> Vec<RenderEntry<'_>> {
        self.view
            .messages()
            .iter()
            .map(RenderEntry::Confirmed)
            .chain(self.pending.iter().map(RenderEntry::Pending))
            .collect()
    }

    pub fn confirmed(&self) -> &[Message] {
        self.view.messages()
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.view.clear();
        self.pending.clear();
    }
}
