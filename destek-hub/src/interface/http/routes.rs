//! 路由表与 REST handler

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::commands::{ClearAllCommand, ClearThreadCommand};
use crate::application::queries::{ListMessagesQuery, ListThreadsQuery};
use crate::error::{ChatError, ChatResult};
use crate::interface::state::AppState;
use crate::interface::ws;

use super::uploads;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/threads", get(list_threads))
        .route("/api/messages", get(list_messages))
        .route("/api/messages/clear", post(clear_thread))
        .route("/api/messages/clear_all", post(clear_all))
        .route("/api/upload/image", post(uploads::upload_image))
        .route("/api/upload/audio", post(uploads::upload_audio))
        .route("/uploads/:folder/:file", get(uploads::serve_upload))
        .route("/ws", get(ws::ws_handler))
        // 访客 widget 嵌在第三方页面里，跨域放开
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_threads(State(state): State<AppState>) -> ChatResult<impl IntoResponse> {
    let threads = state.queries.handle_list_threads(ListThreadsQuery).await?;
    Ok(Json(threads))
}

#[derive(Debug, Deserialize)]
struct ListMessagesParams {
    thread_id: String,
    limit: Option<usize>,
    before_id: Option<String>,
}

async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListMessagesParams>,
) -> ChatResult<impl IntoResponse> {
    let messages = state
        .queries
        .handle_list_messages(ListMessagesQuery {
            thread_id: params.thread_id,
            limit: params.limit,
            before_id: params.before_id,
        })
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
struct ClearThreadBody {
    thread_id: String,
}

async fn clear_thread(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<ClearThreadBody>,
) -> ChatResult<impl IntoResponse> {
    info!(thread_id = %body.thread_id, client = %addr, "Clear thread requested");
    state
        .commands
        .handle_clear_thread(ClearThreadCommand {
            thread_id: body.thread_id,
        })
        .await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn clear_all(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ChatResult<impl IntoResponse> {
    info!(client = %addr, "Clear all requested");
    state.commands.handle_clear_all(ClearAllCommand).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// 路径参数里的目录名必须在白名单内
pub(super) fn parse_folder(folder: &str) -> ChatResult<crate::domain::repository::MediaFolder> {
    crate::domain::repository::MediaFolder::from_str(folder)
        .ok_or_else(|| ChatError::Validation(format!("unknown media folder: {}", folder)))
}
