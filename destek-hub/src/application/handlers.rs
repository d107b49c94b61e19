use std::sync::Arc;

use destek_types::{Message, Thread, ThreadSummary};
use tracing::{debug, info};

use crate::application::commands::{
    AdminMessageCommand, ClearAllCommand, ClearThreadCommand, HeartbeatCommand,
    JoinVisitorCommand, RejoinVisitorCommand, VisitorMessageCommand,
};
use crate::application::queries::{ListMessagesQuery, ListThreadsQuery};
use crate::application::services::SyncService;
use crate::error::ChatResult;

/// 聊天命令处理器
pub struct ChatCommandHandler {
    sync: Arc<SyncService>,
}

impl ChatCommandHandler {
    pub fn new(sync: Arc<SyncService>) -> Self {
        Self { sync }
    }

    /// 处理访客 join 命令
    pub async fn handle_join_visitor(&self, command: JoinVisitorCommand) -> ChatResult<Thread> {
        debug!(display_name = %command.display_name, "Handling join command");

        let thread = self.sync.join_visitor(&command.display_name).await?;

        info!(thread_id = %thread.id, "Visitor joined");
        Ok(thread)
    }

    /// 处理访客 rejoin 命令
    pub async fn handle_rejoin_visitor(&self, command: RejoinVisitorCommand) -> ChatResult<Thread> {
        debug!(thread_id = %command.thread_id, "Handling rejoin command");
        self.sync.rejoin_visitor(&command.thread_id).await
    }

    /// 处理访客消息命令
    pub async fn handle_visitor_message(
        &self,
        command: VisitorMessageCommand,
    ) -> ChatResult<Message> {
        debug!(
            thread_id = %command.thread_id,
            kind = %command.kind.as_str(),
            "Handling visitor message command"
        );

        self.sync
            .visitor_message(
                &command.sender_session,
                &command.thread_id,
                command.kind,
                command.payload,
            )
            .await
    }

    /// 处理管理端回复命令
    pub async fn handle_admin_message(&self, command: AdminMessageCommand) -> ChatResult<Message> {
        debug!(
            thread_id = %command.thread_id,
            kind = %command.kind.as_str(),
            "Handling admin message command"
        );

        self.sync
            .admin_message(
                &command.sender_session,
                &command.thread_id,
                command.kind,
                command.payload,
            )
            .await
    }

    /// 处理心跳命令
    pub fn handle_heartbeat(&self, command: HeartbeatCommand) {
        self.sync.heartbeat(&command.thread_id);
    }

    /// 处理清空单个会话命令
    pub async fn handle_clear_thread(&self, command: ClearThreadCommand) -> ChatResult<()> {
        debug!(thread_id = %command.thread_id, "Handling clear thread command");
        self.sync.clear_thread(&command.thread_id).await
    }

    /// 处理全量清空命令
    pub async fn handle_clear_all(&self, _command: ClearAllCommand) -> ChatResult<()> {
        debug!("Handling clear all command");
        self.sync.clear_all().await
    }
}

/// 聊天查询处理器
pub struct ChatQueryHandler {
    sync: Arc<SyncService>,
}

impl ChatQueryHandler {
    pub fn new(sync: Arc<SyncService>) -> Self {
        Self { sync }
    }

    /// 处理会话列表查询
    pub async fn handle_list_threads(
        &self,
        _query: ListThreadsQuery,
    ) -> ChatResult<Vec<ThreadSummary>> {
        self.sync.list_threads().await
    }

    /// 处理消息历史查询
    pub async fn handle_list_messages(&self, query: ListMessagesQuery) -> ChatResult<Vec<Message>> {
        debug!(
            thread_id = %query.thread_id,
            limit = ?query.limit,
            "Handling list messages query"
        );

        self.sync
            .list_messages(&query.thread_id, query.limit, query.before_id.as_deref())
            .await
    }
}
