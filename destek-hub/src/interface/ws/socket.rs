//! 实时通道的连接处理
//!
//! 每条连接持有一个会话状态机和一个发送队列：
//! 写出走独立任务，业务分发在读循环里串行执行。
//! 单个事件出错只回 message_error，连接保持打开。

use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use destek_types::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::commands::{
    AdminMessageCommand, HeartbeatCommand, JoinVisitorCommand, RejoinVisitorCommand,
    VisitorMessageCommand,
};
use crate::domain::model::{ChannelSession, SessionRole};
use crate::error::{ChatError, ChatResult};
use crate::interface::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut session = ChannelSession::new();
    let session_id = session.session_id().to_string();
    info!(session_id = %session_id, client = %addr, "Channel session opened");

    // 写出任务：序列化后推给对端，对端关闭即退出
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to serialize server event");
                }
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Channel read error");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if let Err(e) =
                        dispatch(&state, &mut session, &event_tx, &addr, event).await
                    {
                        let _ = event_tx.send(ServerEvent::MessageError {
                            reason: e.reason().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "Unparseable client event");
                    let _ = event_tx.send(ServerEvent::MessageError {
                        reason: "validation_failed".to_string(),
                        message: "invalid event format".to_string(),
                    });
                }
            },
            WsMessage::Close(_) => {
                debug!(session_id = %session_id, "Close frame received");
                break;
            }
            // ping/pong 由传输层处理，二进制帧不在协议内
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => {}
        }
    }

    // 断连只销毁连接态；线程与消息留在存储里等 rejoin。
    // 限流记录按客户端地址记账，不随连接清除：重连不能重置配额
    state.relay.unregister(&session_id);
    session.disconnect();
    info!(session_id = %session_id, "Channel session closed");

    writer.abort();
}

async fn dispatch(
    state: &AppState,
    session: &mut ChannelSession,
    event_tx: &mpsc::UnboundedSender<ServerEvent>,
    addr: &SocketAddr,
    event: ClientEvent,
) -> ChatResult<()> {
    match event {
        ClientEvent::Join { display_name } => {
            session.begin_join()?;
            match state
                .commands
                .handle_join_visitor(JoinVisitorCommand { display_name })
                .await
            {
                Ok(thread) => {
                    session.complete_join(thread.id.clone())?;
                    state
                        .relay
                        .register_visitor(session.session_id(), &thread.id, event_tx.clone());
                    let _ = event_tx.send(ServerEvent::Joined {
                        thread_id: thread.id,
                    });
                    Ok(())
                }
                Err(e) => {
                    session.fail_join();
                    Err(e)
                }
            }
        }

        ClientEvent::Rejoin { thread_id } => {
            session.begin_rejoin(thread_id.clone())?;
            match state
                .commands
                .handle_rejoin_visitor(RejoinVisitorCommand { thread_id })
                .await
            {
                Ok(thread) => {
                    session.complete_rejoin()?;
                    state
                        .relay
                        .register_visitor(session.session_id(), &thread.id, event_tx.clone());
                    let _ = event_tx.send(ServerEvent::Joined {
                        thread_id: thread.id,
                    });
                    Ok(())
                }
                Err(ChatError::NotFound(_)) => {
                    // 线程已被清空：告知客户端回退到全新 join
                    if let Some(stale) = session.fail_rejoin() {
                        let _ = event_tx.send(ServerEvent::RejoinFailed {
                            thread_id: stale,
                            message: "thread no longer exists".to_string(),
                        });
                    }
                    Ok(())
                }
                Err(e) => {
                    session.fail_rejoin();
                    Err(e)
                }
            }
        }

        ClientEvent::AdminJoin => {
            session.admin_join()?;
            state
                .relay
                .register_admin(session.session_id(), event_tx.clone());
            Ok(())
        }

        ClientEvent::SelectThread { thread_id } => {
            session.select_thread(thread_id.clone())?;
            state.relay.select_thread(session.session_id(), &thread_id);
            Ok(())
        }

        ClientEvent::Heartbeat { thread_id } => {
            let bound = session.heartbeat_thread(&thread_id)?.to_string();
            state.commands.handle_heartbeat(HeartbeatCommand {
                thread_id: bound,
            });
            Ok(())
        }

        ClientEvent::MessageToAdmin {
            thread_id,
            kind,
            payload,
            local_id,
        } => {
            require_role(session, SessionRole::Visitor)?;
            if message_rate_exceeded(state, addr) {
                let _ = event_tx.send(rate_limited_error());
                return Ok(());
            }
            let target = session.send_target(&thread_id)?;

            let message = state
                .commands
                .handle_visitor_message(VisitorMessageCommand {
                    sender_session: session.session_id().to_string(),
                    thread_id: target,
                    kind,
                    payload,
                    local_id: local_id.clone(),
                })
                .await?;

            let _ = event_tx.send(ServerEvent::MessageAccepted { local_id, message });
            Ok(())
        }

        ClientEvent::MessageToVisitor {
            thread_id,
            kind,
            payload,
            local_id,
        } => {
            require_role(session, SessionRole::Admin)?;
            if message_rate_exceeded(state, addr) {
                let _ = event_tx.send(rate_limited_error());
                return Ok(());
            }
            let target = session.send_target(&thread_id)?;

            let message = state
                .commands
                .handle_admin_message(AdminMessageCommand {
                    sender_session: session.session_id().to_string(),
                    thread_id: target,
                    kind,
                    payload,
                    local_id: local_id.clone(),
                })
                .await?;

            let _ = event_tx.send(ServerEvent::MessageAccepted { local_id, message });
            Ok(())
        }
    }
}

fn require_role(session: &ChannelSession, role: SessionRole) -> ChatResult<()> {
    if session.role() == Some(role) {
        Ok(())
    } else {
        Err(ChatError::InvalidState(
            "event not allowed for this session role".to_string(),
        ))
    }
}

fn message_rate_exceeded(state: &AppState, addr: &SocketAddr) -> bool {
    !state.message_limiter.check(&addr.ip().to_string())
}

fn rate_limited_error() -> ServerEvent {
    ServerEvent::MessageError {
        reason: "rate_limited".to_string(),
        message: "message rate limit exceeded".to_string(),
    }
}
