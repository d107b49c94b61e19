use destek_types::MessageKind;

/// 访客发起新会话命令
#[derive(Debug, Clone)]
pub struct JoinVisitorCommand {
    pub display_name: String,
}

/// 访客重连命令
#[derive(Debug, Clone)]
pub struct RejoinVisitorCommand {
    pub thread_id: String,
}

/// 访客发消息命令
#[derive(Debug, Clone)]
pub struct VisitorMessageCommand {
    pub sender_session: String,
    pub thread_id: String,
    pub kind: MessageKind,
    pub payload: String,
    pub local_id: Option<String>,
}

/// 管理端回复命令
#[derive(Debug, Clone)]
pub struct AdminMessageCommand {
    pub sender_session: String,
    pub thread_id: String,
    pub kind: MessageKind,
    pub payload: String,
    pub local_id: Option<String>,
}

/// 访客心跳命令
#[derive(Debug, Clone)]
pub struct HeartbeatCommand {
    pub thread_id: String,
}

/// 清空单个会话命令
#[derive(Debug, Clone)]
pub struct ClearThreadCommand {
    pub thread_id: String,
}

/// 全量清空命令
#[derive(Debug, Clone)]
pub struct ClearAllCommand;
