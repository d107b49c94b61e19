//! 实时转发服务
//!
//! 持有所有活跃连接的发送端注册表：访客会话按绑定线程索引，
//! 管理端会话带一个可切换的观察线程。转发是尽力而为的推送，
//! 投递不保证恰好一次，去重由客户端视图的幂等合并兜底。

use std::collections::HashMap;
use std::sync::RwLock;

use destek_types::ServerEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::model::SessionRole;

struct Peer {
    role: SessionRole,
    /// 访客：绑定线程；管理端：当前观察线程
    thread_id: Option<String>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// 活跃会话注册表 + 事件扇出
pub struct RelayService {
    peers: RwLock<HashMap<String, Peer>>,
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// 访客会话绑定线程后注册
    pub fn register_visitor(
        &self,
        session_id: &str,
        thread_id: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut peers = self.peers.write().expect("relay lock poisoned");
        peers.insert(
            session_id.to_string(),
            Peer {
                role: SessionRole::Visitor,
                thread_id: Some(thread_id.to_string()),
                tx,
            },
        );
        debug!(session_id = %session_id, thread_id = %thread_id, "visitor session registered");
    }

    /// 管理端会话注册（暂不观察任何线程）
    pub fn register_admin(&self, session_id: &str, tx: mpsc::UnboundedSender<ServerEvent>) {
        let mut peers = self.peers.write().expect("relay lock poisoned");
        peers.insert(
            session_id.to_string(),
            Peer {
                role: SessionRole::Admin,
                thread_id: None,
                tx,
            },
        );
        debug!(session_id = %session_id, "admin session registered");
    }

    /// 管理端切换观察线程
    pub fn select_thread(&self, session_id: &str, thread_id: &str) {
        let mut peers = self.peers.write().expect("relay lock poisoned");
        if let Some(peer) = peers.get_mut(session_id) {
            if peer.role == SessionRole::Admin {
                peer.thread_id = Some(thread_id.to_string());
            }
        }
    }

    /// 连接断开，撤掉注册
    pub fn unregister(&self, session_id: &str) {
        let mut peers = self.peers.write().expect("relay lock poisoned");
        if peers.remove(session_id).is_some() {
            debug!(session_id = %session_id, "session unregistered");
        }
    }

    /// 单发给指定会话
    pub fn send_to(&self, session_id: &str, event: ServerEvent) -> bool {
        let peers = self.peers.read().expect("relay lock poisoned");
        match peers.get(session_id) {
            Some(peer) => peer.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// 发给所有管理端会话（可排除一个，通常是动作发起方）
    pub fn relay_to_admins(&self, event: &ServerEvent, exclude_session: Option<&str>) {
        let peers = self.peers.read().expect("relay lock poisoned");
        for (session_id, peer) in peers.iter() {
            if peer.role != SessionRole::Admin {
                continue;
            }
            if exclude_session == Some(session_id.as_str()) {
                continue;
            }
            if peer.tx.send(event.clone()).is_err() {
                // 接收端已经掉线，等 unregister 清理
                warn!(session_id = %session_id, "dropping event for dead admin session");
            }
        }
    }

    /// 发给正在观察某线程的会话：绑定它的访客 + 选中它的管理端
    pub fn relay_to_thread(
        &self,
        thread_id: &str,
        event: &ServerEvent,
        exclude_session: Option<&str>,
    ) {
        let peers = self.peers.read().expect("relay lock poisoned");
        for (session_id, peer) in peers.iter() {
            if peer.thread_id.as_deref() != Some(thread_id) {
                continue;
            }
            if exclude_session == Some(session_id.as_str()) {
                continue;
            }
            if peer.tx.send(event.clone()).is_err() {
                warn!(session_id = %session_id, "dropping event for dead session");
            }
        }
    }

    /// 当前注册的管理端数量（诊断用）
    pub fn admin_count(&self) -> usize {
        let peers = self.peers.read().expect("relay lock poisoned");
        peers
            .values()
            .filter(|p| p.role == SessionRole::Admin)
            .count()
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (mpsc::UnboundedSender<ServerEvent>, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    fn online(thread_id: &str) -> ServerEvent {
        ServerEvent::VisitorOnline {
            thread_id: thread_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_admin_fanout_excludes_sender() {
        let relay = RelayService::new();
        let (tx1, mut rx1) = peer();
        let (tx2, mut rx2) = peer();
        relay.register_admin("a1", tx1);
        relay.register_admin("a2", tx2);

        relay.relay_to_admins(&online("t1"), Some("a1"));

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), online("t1"));
    }

    #[tokio::test]
    async fn test_thread_relay_reaches_bound_visitor_and_selected_admin() {
        let relay = RelayService::new();
        let (vtx, mut vrx) = peer();
        let (atx, mut arx) = peer();
        let (otx, mut orx) = peer();

        relay.register_visitor("v1", "t1", vtx);
        relay.register_admin("a1", atx);
        relay.select_thread("a1", "t1");
        relay.register_admin("a2", otx);

        relay.relay_to_thread("t1", &online("t1"), None);

        assert!(vrx.try_recv().is_ok());
        assert!(arx.try_recv().is_ok());
        // 没选中 t1 的管理端收不到
        assert!(orx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_session_receives_nothing() {
        let relay = RelayService::new();
        let (tx, mut rx) = peer();
        relay.register_visitor("v1", "t1", tx);
        relay.unregister("v1");

        relay.relay_to_thread("t1", &online("t1"), None);
        assert!(rx.try_recv().is_err());
        assert!(!relay.send_to("v1", online("t1")));
    }

    #[tokio::test]
    async fn test_visitor_cannot_select_thread() {
        let relay = RelayService::new();
        let (tx, mut rx) = peer();
        relay.register_visitor("v1", "t1", tx);

        // select_thread 只对管理端生效
        relay.select_thread("v1", "t2");
        relay.relay_to_thread("t2", &online("t2"), None);
        assert!(rx.try_recv().is_err());
    }
}
