//! 通道会话状态机
//!
//! 管理一条连接的生命周期，在消息流量之前强制执行 join 协议。
//! 所有状态修改都通过方法完成，转移是同步纯函数：
//! 非法调用返回 InvalidState，不产生任何副作用。

use crate::error::{ChatError, ChatResult};

/// 会话参与方角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    Visitor,
    Admin,
}

/// 连接生命周期状态
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// 连接已建立，尚无参与者身份
    Unjoined,
    /// join 进行中（等待线程创建落库）
    Joining,
    /// 已入会，可收发消息
    Joined,
    /// rejoin 进行中（等待线程存在性校验）
    Rejoining,
    /// 传输断开，线程与消息状态不受影响
    Disconnected,
}

/// 一条连接的临时绑定：角色 + 至多一个线程 id
///
/// 只持有线程 id 引用，绝不缓存消息状态，避免与存储分叉。
#[derive(Debug)]
pub struct ChannelSession {
    session_id: String,
    state: SessionState,
    role: Option<SessionRole>,
    /// 访客绑定的线程
    thread_id: Option<String>,
    /// rejoin 校验中的候选线程
    rejoin_candidate: Option<String>,
    /// 管理端当前观察的线程
    selected_thread: Option<String>,
}

impl ChannelSession {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Unjoined,
            role: None,
            thread_id: None,
            rejoin_candidate: None,
            selected_thread: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn role(&self) -> Option<SessionRole> {
        self.role
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn selected_thread(&self) -> Option<&str> {
        self.selected_thread.as_deref()
    }

    /// 访客发起 join，进入 Joining
    pub fn begin_join(&mut self) -> ChatResult<()> {
        match self.state {
            SessionState::Unjoined | SessionState::Disconnected => {
                self.state = SessionState::Joining;
                self.role = Some(SessionRole::Visitor);
                Ok(())
            }
            _ => Err(self.invalid("join")),
        }
    }

    /// 线程创建成功，绑定并进入 Joined
    pub fn complete_join(&mut self, thread_id: String) -> ChatResult<()> {
        match self.state {
            SessionState::Joining => {
                self.thread_id = Some(thread_id);
                self.state = SessionState::Joined;
                Ok(())
            }
            _ => Err(self.invalid("complete_join")),
        }
    }

    /// 线程创建失败，回到 Unjoined
    pub fn fail_join(&mut self) {
        if self.state == SessionState::Joining {
            self.state = SessionState::Unjoined;
            self.role = None;
        }
    }

    /// 访客携带记住的线程 id 重连
    pub fn begin_rejoin(&mut self, thread_id: String) -> ChatResult<()> {
        match self.state {
            SessionState::Unjoined | SessionState::Disconnected => {
                self.state = SessionState::Rejoining;
                self.role = Some(SessionRole::Visitor);
                self.rejoin_candidate = Some(thread_id);
                Ok(())
            }
            _ => Err(self.invalid("rejoin")),
        }
    }

    /// 线程仍然存在，恢复绑定
    pub fn complete_rejoin(&mut self) -> ChatResult<String> {
        match (&self.state, self.rejoin_candidate.take()) {
            (SessionState::Rejoining, Some(thread_id)) => {
                self.thread_id = Some(thread_id.clone());
                self.state = SessionState::Joined;
                Ok(thread_id)
            }
            _ => Err(self.invalid("complete_rejoin")),
        }
    }

    /// 线程已不存在，回到 Unjoined，返回失效的线程 id
    pub fn fail_rejoin(&mut self) -> Option<String> {
        if self.state == SessionState::Rejoining {
            self.state = SessionState::Unjoined;
            self.role = None;
            self.rejoin_candidate.take()
        } else {
            None
        }
    }

    /// 管理端接入：直接 Joined，不绑定线程
    pub fn admin_join(&mut self) -> ChatResult<()> {
        match self.state {
            SessionState::Unjoined | SessionState::Disconnected => {
                self.state = SessionState::Joined;
                self.role = Some(SessionRole::Admin);
                Ok(())
            }
            _ => Err(self.invalid("admin_join")),
        }
    }

    /// 管理端切换观察线程，不改变连接状态
    pub fn select_thread(&mut self, thread_id: String) -> ChatResult<()> {
        if self.state != SessionState::Joined || self.role != Some(SessionRole::Admin) {
            return Err(self.invalid("select_thread"));
        }
        self.selected_thread = Some(thread_id);
        Ok(())
    }

    /// 心跳只在 Joined 的访客会话上合法，且必须指向绑定的线程
    pub fn heartbeat_thread(&self, claimed_thread: &str) -> ChatResult<&str> {
        if self.state != SessionState::Joined || self.role != Some(SessionRole::Visitor) {
            return Err(self.invalid("heartbeat"));
        }
        match self.thread_id.as_deref() {
            Some(bound) if bound == claimed_thread => Ok(bound),
            Some(_) => Err(ChatError::InvalidState(
                "heartbeat thread does not match bound thread".to_string(),
            )),
            None => Err(self.invalid("heartbeat")),
        }
    }

    /// 解析一次发送的目标线程
    ///
    /// 访客：必须 Joined 且事件里的 thread_id 与绑定一致；
    /// 管理端：必须 Joined，目标线程由事件显式给出。
    pub fn send_target(&self, claimed_thread: &str) -> ChatResult<String> {
        if self.state != SessionState::Joined {
            return Err(self.invalid("send_message"));
        }
        match self.role {
            Some(SessionRole::Visitor) => match self.thread_id.as_deref() {
                Some(bound) if bound == claimed_thread => Ok(bound.to_string()),
                Some(_) => Err(ChatError::InvalidState(
                    "message thread does not match bound thread".to_string(),
                )),
                None => Err(self.invalid("send_message")),
            },
            Some(SessionRole::Admin) => Ok(claimed_thread.to_string()),
            None => Err(self.invalid("send_message")),
        }
    }

    /// 传输断开：只销毁连接态，历史由存储在 rejoin 后恢复
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }

    fn invalid(&self, action: &str) -> ChatError {
        ChatError::InvalidState(format!(
            "{} not allowed in state {:?}",
            action, self.state
        ))
    }
}

impl Default for ChannelSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_join_is_rejected() {
        let session = ChannelSession::new();
        let err = session.send_target("t1").unwrap_err();
        assert!(matches!(err, ChatError::InvalidState(_)));
    }

    #[test]
    fn test_join_flow_binds_thread() {
        let mut session = ChannelSession::new();
        session.begin_join().unwrap();
        assert_eq!(*session.state(), SessionState::Joining);

        session.complete_join("t1".to_string()).unwrap();
        assert_eq!(*session.state(), SessionState::Joined);
        assert_eq!(session.thread_id(), Some("t1"));
        assert_eq!(session.send_target("t1").unwrap(), "t1");
    }

    #[test]
    fn test_double_join_is_rejected() {
        let mut session = ChannelSession::new();
        session.begin_join().unwrap();
        session.complete_join("t1".to_string()).unwrap();
        assert!(session.begin_join().is_err());
    }

    #[test]
    fn test_visitor_cannot_spoof_other_thread() {
        let mut session = ChannelSession::new();
        session.begin_join().unwrap();
        session.complete_join("t1".to_string()).unwrap();

        assert!(session.send_target("t2").is_err());
        assert!(session.heartbeat_thread("t2").is_err());
    }

    #[test]
    fn test_rejoin_recovers_binding() {
        let mut session = ChannelSession::new();
        session.begin_join().unwrap();
        session.complete_join("t1".to_string()).unwrap();

        session.disconnect();
        assert_eq!(*session.state(), SessionState::Disconnected);

        session.begin_rejoin("t1".to_string()).unwrap();
        let thread_id = session.complete_rejoin().unwrap();
        assert_eq!(thread_id, "t1");
        assert_eq!(session.send_target("t1").unwrap(), "t1");
    }

    #[test]
    fn test_failed_rejoin_falls_back_to_unjoined() {
        let mut session = ChannelSession::new();
        session.begin_rejoin("gone".to_string()).unwrap();

        assert_eq!(session.fail_rejoin(), Some("gone".to_string()));
        assert_eq!(*session.state(), SessionState::Unjoined);
        assert!(session.role().is_none());

        // 回退后可以走全新 join
        session.begin_join().unwrap();
        session.complete_join("t2".to_string()).unwrap();
        assert_eq!(session.thread_id(), Some("t2"));
    }

    #[test]
    fn test_admin_sends_with_explicit_target() {
        let mut session = ChannelSession::new();
        session.admin_join().unwrap();
        assert!(session.thread_id().is_none());

        session.select_thread("t1".to_string()).unwrap();
        assert_eq!(session.selected_thread(), Some("t1"));
        assert_eq!(session.send_target("t9").unwrap(), "t9");
    }

    #[test]
    fn test_visitor_cannot_select_thread() {
        let mut session = ChannelSession::new();
        session.begin_join().unwrap();
        session.complete_join("t1".to_string()).unwrap();
        assert!(session.select_thread("t2".to_string()).is_err());
    }

    #[test]
    fn test_admin_heartbeat_is_invalid() {
        let mut session = ChannelSession::new();
        session.admin_join().unwrap();
        assert!(session.heartbeat_thread("t1").is_err());
    }

    #[test]
    fn test_invalid_calls_leave_state_untouched() {
        let mut session = ChannelSession::new();
        assert!(session.complete_join("t1".to_string()).is_err());
        assert!(session.select_thread("t1".to_string()).is_err());
        assert_eq!(*session.state(), SessionState::Unjoined);
        assert!(session.thread_id().is_none());
    }
}
