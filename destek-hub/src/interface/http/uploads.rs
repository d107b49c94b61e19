//! 媒体上传与回放
//!
//! 上传按客户端地址限流，内容类型走白名单，超限返回 429。
//! payload 本身不进线程存储，消息里只带返回的引用 URL。

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::repository::MediaFolder;
use crate::error::{ChatError, ChatResult};
use crate::interface::state::AppState;

use super::routes::parse_folder;

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
const AUDIO_TYPES: &[&str] = &[
    "audio/webm",
    "audio/ogg",
    "audio/mpeg",
    "audio/wav",
    "audio/mp4",
];

pub async fn upload_image(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Response {
    if !state.image_limiter.check(&addr.ip().to_string()) {
        return too_many_requests("image upload quota exhausted");
    }
    let max_bytes = state.config.media.max_image_bytes;
    accept_upload(state, multipart, MediaFolder::Images, IMAGE_TYPES, max_bytes)
        .await
        .into_response()
}

pub async fn upload_audio(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Response {
    if !state.audio_limiter.check(&addr.ip().to_string()) {
        return too_many_requests("audio upload quota exhausted");
    }
    let max_bytes = state.config.media.max_audio_bytes;
    accept_upload(state, multipart, MediaFolder::Audio, AUDIO_TYPES, max_bytes)
        .await
        .into_response()
}

async fn accept_upload(
    state: AppState,
    mut multipart: Multipart,
    folder: MediaFolder,
    allowed_types: &[&str],
    max_bytes: usize,
) -> ChatResult<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ChatError::Validation(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(|t| t.to_string());
        match content_type.as_deref() {
            Some(ct) if allowed_types.contains(&ct) => {}
            other => {
                warn!(content_type = ?other, folder = folder.as_str(), "Upload rejected: content type");
                return Err(ChatError::Validation(format!(
                    "unsupported content type for {}: {}",
                    folder.as_str(),
                    other.unwrap_or("none")
                )));
            }
        }

        let original_name = field.file_name().map(|n| n.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ChatError::Validation(format!("failed to read upload body: {}", e)))?;

        if bytes.is_empty() {
            return Err(ChatError::Validation("uploaded file is empty".to_string()));
        }
        if bytes.len() > max_bytes {
            return Err(ChatError::Validation(format!(
                "file exceeds {} byte limit",
                max_bytes
            )));
        }

        let url = state
            .media
            .store(folder, original_name.as_deref(), bytes)
            .await?;

        info!(folder = folder.as_str(), url = %url, "Media stored");
        return Ok(Json(json!({ "url": url })));
    }

    Err(ChatError::Validation(
        "multipart body has no 'file' field".to_string(),
    ))
}

pub async fn serve_upload(
    State(state): State<AppState>,
    Path((folder, file)): Path<(String, String)>,
) -> ChatResult<Response> {
    let folder = parse_folder(&folder)?;
    let bytes = state.media.open(folder, &file).await?;

    let content_type = guess_content_type(&file);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn too_many_requests(message: &str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "rate_limited", "message": message })),
    )
        .into_response()
}

/// 按扩展名猜内容类型，猜不出来就按字节流下发
fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "webm" => "audio/webm",
        "ogg" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" | "mp4" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type("a.PNG"), "image/png");
        assert_eq!(guess_content_type("voice.webm"), "audio/webm");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
