//! 会话同步服务
//!
//! 应用层编排：写路径先落库，落库成功后才扇出实时事件。
//! 推送丢失不影响正确性，客户端随时可以通过历史拉取补齐，
//! 幂等合并保证重复投递无害。

use std::sync::Arc;

use destek_types::{Message, MessageKind, Sender, ServerEvent, Thread, ThreadSummary, preview_of};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::service::ChatDomainService;
use crate::error::ChatResult;

use super::{PresenceTracker, RelayService};

/// 会话同步服务
pub struct SyncService {
    domain: Arc<ChatDomainService>,
    relay: Arc<RelayService>,
    presence: Arc<PresenceTracker>,
}

impl SyncService {
    pub fn new(
        domain: Arc<ChatDomainService>,
        relay: Arc<RelayService>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            domain,
            relay,
            presence,
        }
    }

    pub fn relay(&self) -> &Arc<RelayService> {
        &self.relay
    }

    /// 访客新会话：创建线程并立即算一次活跃
    pub async fn join_visitor(&self, display_name: &str) -> ChatResult<Thread> {
        let thread = self.domain.create_thread(display_name).await?;
        self.mark_visitor_active(&thread.id);
        Ok(thread)
    }

    /// 访客重连：线程必须仍然存在，否则 NotFound 由调用方折算成 rejoin_failed
    pub async fn rejoin_visitor(&self, thread_id: &str) -> ChatResult<Thread> {
        let thread = self.domain.get_thread(thread_id).await?;
        self.mark_visitor_active(&thread.id);
        info!(thread_id = %thread.id, "Visitor rejoined");
        Ok(thread)
    }

    /// 访客消息：落库、刷新在线、转发给观察者、提醒所有管理端
    pub async fn visitor_message(
        &self,
        sender_session: &str,
        thread_id: &str,
        kind: MessageKind,
        payload: String,
    ) -> ChatResult<Message> {
        let message = self
            .domain
            .append_message(thread_id, Sender::Visitor, kind, payload)
            .await?;
        self.mark_visitor_active(thread_id);

        self.relay.relay_to_thread(
            thread_id,
            &ServerEvent::MessageFromVisitor {
                message: message.clone(),
            },
            Some(sender_session),
        );

        // 列表提醒带预览，未选中该线程的管理端也能看到动静
        let display_name = match self.domain.get_thread(thread_id).await {
            Ok(thread) => thread.display_name,
            Err(_) => String::new(),
        };
        self.relay.relay_to_admins(
            &ServerEvent::NewMessageNotification {
                thread_id: thread_id.to_string(),
                display_name,
                preview: preview_of(message.kind, &message.payload),
            },
            None,
        );

        Ok(message)
    }

    /// 管理端消息：落库后转发给该线程的观察者（不回发给发起方）
    pub async fn admin_message(
        &self,
        sender_session: &str,
        thread_id: &str,
        kind: MessageKind,
        payload: String,
    ) -> ChatResult<Message> {
        let message = self
            .domain
            .append_message(thread_id, Sender::Admin, kind, payload)
            .await?;

        self.relay.relay_to_thread(
            thread_id,
            &ServerEvent::MessageFromAdmin {
                message: message.clone(),
            },
            Some(sender_session),
        );

        Ok(message)
    }

    /// 访客心跳：刷新在线窗口，无业务副作用
    pub fn heartbeat(&self, thread_id: &str) {
        self.mark_visitor_active(thread_id);
    }

    /// 线程列表：存储给静态快照，在线位由 presence 现算
    pub async fn list_threads(&self) -> ChatResult<Vec<ThreadSummary>> {
        let mut threads = self.domain.list_threads().await?;
        for summary in &mut threads {
            summary.online = self.presence.is_online(&summary.id);
        }
        Ok(threads)
    }

    pub async fn list_messages(
        &self,
        thread_id: &str,
        limit: Option<usize>,
        before_id: Option<&str>,
    ) -> ChatResult<Vec<Message>> {
        self.domain.list_messages(thread_id, limit, before_id).await
    }

    /// 清空单个线程的消息。在线状态不受影响：访客还连着。
    pub async fn clear_thread(&self, thread_id: &str) -> ChatResult<()> {
        self.domain.clear_thread(thread_id).await?;
        self.relay.relay_to_admins(
            &ServerEvent::ThreadCleared {
                thread_id: thread_id.to_string(),
            },
            None,
        );
        Ok(())
    }

    /// 全量清空：线程都没了，在线记录一并作废
    pub async fn clear_all(&self) -> ChatResult<()> {
        self.domain.clear_all().await?;
        self.presence.clear();
        self.relay
            .relay_to_admins(&ServerEvent::ThreadsCleared, None);
        Ok(())
    }

    /// 消费在线窗口到期事件，折算成 visitor_offline 推送
    pub async fn run_expiry_loop(self: Arc<Self>, mut expiry_rx: mpsc::UnboundedReceiver<String>) {
        while let Some(thread_id) = expiry_rx.recv().await {
            debug!(thread_id = %thread_id, "visitor went offline");
            self.relay.relay_to_admins(
                &ServerEvent::VisitorOffline {
                    thread_id: thread_id.clone(),
                },
                None,
            );
        }
    }

    /// 活跃信号统一入口：只在离线→在线的边沿推 visitor_online
    fn mark_visitor_active(&self, thread_id: &str) {
        if self.presence.mark_active(thread_id) {
            self.relay.relay_to_admins(
                &ServerEvent::VisitorOnline {
                    thread_id: thread_id.to_string(),
                },
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::chat_domain_service::DomainLimits;
    use crate::infrastructure::persistence::MemoryThreadRepository;
    use std::time::Duration;

    fn build() -> (Arc<SyncService>, mpsc::UnboundedReceiver<String>) {
        let domain = Arc::new(ChatDomainService::new(
            Arc::new(MemoryThreadRepository::new()),
            DomainLimits::default(),
        ));
        let relay = Arc::new(RelayService::new());
        let (presence, expiry_rx) = PresenceTracker::new(Duration::from_secs(120));
        (
            Arc::new(SyncService::new(domain, relay, presence)),
            expiry_rx,
        )
    }

    fn admin_channel(
        sync: &SyncService,
        session_id: &str,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        sync.relay().register_admin(session_id, tx);
        rx
    }

    #[tokio::test]
    async fn test_visitor_message_reaches_selected_admin_with_notification() {
        let (sync, _expiry) = build();
        let mut admin_rx = admin_channel(&sync, "a1");

        let thread = sync.join_visitor("Ayşe").await.unwrap();
        sync.relay().select_thread("a1", &thread.id);
        // join 触发一次 visitor_online
        assert!(matches!(
            admin_rx.try_recv().unwrap(),
            ServerEvent::VisitorOnline { .. }
        ));

        sync.visitor_message("v1", &thread.id, MessageKind::Text, "Merhaba".into())
            .await
            .unwrap();

        let relayed = admin_rx.try_recv().unwrap();
        match relayed {
            ServerEvent::MessageFromVisitor { message } => {
                assert_eq!(message.payload, "Merhaba");
                assert_eq!(message.sender, Sender::Visitor);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        match admin_rx.try_recv().unwrap() {
            ServerEvent::NewMessageNotification {
                display_name,
                preview,
                ..
            } => {
                assert_eq!(display_name, "Ayşe");
                assert_eq!(preview, "Merhaba");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admin_reply_is_not_echoed_to_sender() {
        let (sync, _expiry) = build();
        let thread = sync.join_visitor("Ayşe").await.unwrap();

        let (vtx, mut vrx) = mpsc::unbounded_channel();
        sync.relay().register_visitor("v1", &thread.id, vtx);
        let mut admin_rx = admin_channel(&sync, "a1");
        sync.relay().select_thread("a1", &thread.id);

        sync.admin_message("a1", &thread.id, MessageKind::Text, "Buyrun".into())
            .await
            .unwrap();

        assert!(matches!(
            vrx.try_recv().unwrap(),
            ServerEvent::MessageFromAdmin { .. }
        ));
        assert!(admin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_online_edge_fires_once_per_window() {
        let (sync, _expiry) = build();
        let thread = sync.join_visitor("Ayşe").await.unwrap();
        let mut admin_rx = admin_channel(&sync, "a1");

        sync.heartbeat(&thread.id);
        sync.heartbeat(&thread.id);

        // 已在线，心跳不再推 visitor_online
        assert!(admin_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_loop_emits_visitor_offline() {
        let (sync, expiry_rx) = build();
        let thread = sync.join_visitor("Ayşe").await.unwrap();
        let mut admin_rx = admin_channel(&sync, "a1");

        tokio::spawn(Arc::clone(&sync).run_expiry_loop(expiry_rx));
        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        let event = admin_rx.recv().await.unwrap();
        assert_eq!(
            event,
            ServerEvent::VisitorOffline {
                thread_id: thread.id.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_clear_all_resets_presence_and_notifies() {
        let (sync, _expiry) = build();
        let thread = sync.join_visitor("Ayşe").await.unwrap();
        let mut admin_rx = admin_channel(&sync, "a1");

        sync.clear_all().await.unwrap();
        assert_eq!(admin_rx.try_recv().unwrap(), ServerEvent::ThreadsCleared);

        let threads = sync.list_threads().await.unwrap();
        assert!(threads.is_empty());
        assert!(!sync.presence.is_online(&thread.id));
    }

    #[tokio::test]
    async fn test_list_threads_carries_live_online_bit() {
        let (sync, _expiry) = build();
        let thread = sync.join_visitor("Ayşe").await.unwrap();
        sync.visitor_message("v1", &thread.id, MessageKind::Text, "Merhaba".into())
            .await
            .unwrap();

        let threads = sync.list_threads().await.unwrap();
        assert_eq!(threads.len(), 1);
        assert!(threads[0].online);
        assert_eq!(threads[0].preview.as_deref(), Some("Merhaba"));
    }
}
