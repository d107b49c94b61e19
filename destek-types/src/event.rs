//! 实时通道事件协议
//!
//! 封闭的带标签变体集合：边界处一次性反序列化校验，
//! 不做字符串分发。标签名即线上协议，不能随意改动。

use serde::{Deserialize, Serialize};

use crate::model::{Message, MessageKind};

/// 客户端到服务端的事件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 访客发起新会话
    Join { display_name: String },
    /// 访客携带记住的 thread_id 重连
    Rejoin { thread_id: String },
    /// 管理端接入，不绑定具体会话
    AdminJoin,
    /// 管理端切换当前观察的会话
    SelectThread { thread_id: String },
    /// 访客心跳，30 秒节拍
    Heartbeat { thread_id: String },
    /// 访客发消息
    MessageToAdmin {
        thread_id: String,
        kind: MessageKind,
        payload: String,
        /// 发送方本地的临时 id，服务端在 message_accepted 中原样带回
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
    },
    /// 管理端回复指定会话
    MessageToVisitor {
        thread_id: String,
        kind: MessageKind,
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
    },
}

/// 服务端到客户端的事件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// join / rejoin 成功
    Joined { thread_id: String },
    /// 发送成功回执：带服务端落库后的权威消息，只回给发送方
    MessageAccepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_id: Option<String>,
        message: Message,
    },
    /// rejoin 的 thread 已不存在，客户端需回退到 join
    RejoinFailed { thread_id: String, message: String },
    /// 转发给管理端的访客消息
    MessageFromVisitor { message: Message },
    /// 转发给访客的管理端消息
    MessageFromAdmin { message: Message },
    /// 会话上线边沿
    VisitorOnline { thread_id: String },
    /// 会话在线窗口过期
    VisitorOffline { thread_id: String },
    /// 新消息提醒（发给所有管理端，带预览）
    NewMessageNotification {
        thread_id: String,
        display_name: String,
        preview: String,
    },
    /// 单个会话的消息被清空
    ThreadCleared { thread_id: String },
    /// 全量清空
    ThreadsCleared,
    /// 请求被拒绝，连接保持打开
    MessageError { reason: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_tags() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join","display_name":"Ayşe"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                display_name: "Ayşe".to_string()
            }
        );

        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"message_to_admin","thread_id":"t1","kind":"text","payload":"Merhaba"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageToAdmin {
                thread_id: "t1".to_string(),
                kind: MessageKind::Text,
                payload: "Merhaba".to_string(),
                local_id: None,
            }
        );
    }

    #[test]
    fn test_admin_join_has_no_fields() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"admin_join"}"#).unwrap();
        assert_eq!(event, ClientEvent::AdminJoin);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"shutdown_server"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_tag_names() {
        let json = serde_json::to_string(&ServerEvent::Joined {
            thread_id: "t1".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"joined""#));

        let json = serde_json::to_string(&ServerEvent::NewMessageNotification {
            thread_id: "t1".to_string(),
            display_name: "Ayşe".to_string(),
            preview: "Merhaba".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"new_message_notification""#));
    }
}
