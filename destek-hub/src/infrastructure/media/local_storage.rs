//! 本地磁盘媒体存储
//!
//! 上传文件落在 upload_dir/{images,audio} 下，文件名带 UUID 前缀，
//! 引用 URL 形如 /uploads/images/{uuid}_{name}。对象存储后端
//! 可以换掉这个实现，核心只依赖 MediaStorage 接口。

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::repository::{MediaFolder, MediaStorage};
use crate::error::{ChatError, ChatResult};

/// 本地磁盘实现
pub struct LocalMediaStorage {
    root: PathBuf,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 只保留安全字符，去掉路径成分
    fn sanitize_name(original: Option<&str>, fallback: &str) -> String {
        let name = original.unwrap_or(fallback);
        let name = name.rsplit(['/', '\\']).next().unwrap_or(fallback);
        let cleaned: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();
        if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
            fallback.to_string()
        } else {
            cleaned
        }
    }

    fn check_file_name(file_name: &str) -> ChatResult<()> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return Err(ChatError::Validation(format!(
                "invalid media file name: {}",
                file_name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(
        &self,
        folder: MediaFolder,
        original_name: Option<&str>,
        bytes: Bytes,
    ) -> ChatResult<String> {
        let fallback = match folder {
            MediaFolder::Images => "image.jpg",
            MediaFolder::Audio => "audio.webm",
        };
        let safe_name = Self::sanitize_name(original_name, fallback);
        let file_name = format!("{}_{}", uuid::Uuid::new_v4(), safe_name);

        let dir = self.root.join(folder.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ChatError::StoreUnavailable(format!("create upload dir: {}", e)))?;

        let path = dir.join(&file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ChatError::StoreUnavailable(format!("write upload: {}", e)))?;

        Ok(format!("/uploads/{}/{}", folder.as_str(), file_name))
    }

    async fn open(&self, folder: MediaFolder, file_name: &str) -> ChatResult<Vec<u8>> {
        Self::check_file_name(file_name)?;

        let path = self.root.join(folder.as_str()).join(file_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ChatError::NotFound(format!("media file {}", file_name)))
            }
            Err(e) => Err(ChatError::StoreUnavailable(format!("read upload: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> LocalMediaStorage {
        let dir = std::env::temp_dir().join(format!("destek-media-{}", uuid::Uuid::new_v4()));
        LocalMediaStorage::new(dir)
    }

    #[tokio::test]
    async fn test_store_and_open_round_trip() {
        let storage = temp_storage();
        let url = storage
            .store(MediaFolder::Images, Some("photo.png"), Bytes::from_static(b"png"))
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/images/"));
        assert!(url.ends_with("_photo.png"));

        let file_name = url.rsplit('/').next().unwrap();
        let bytes = storage.open(MediaFolder::Images, file_name).await.unwrap();
        assert_eq!(bytes, b"png");
    }

    #[tokio::test]
    async fn test_path_components_are_stripped() {
        let storage = temp_storage();
        let url = storage
            .store(
                MediaFolder::Audio,
                Some("../../etc/passwd"),
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        assert!(!url.contains(".."));
        assert!(url.starts_with("/uploads/audio/"));
    }

    #[tokio::test]
    async fn test_open_rejects_traversal() {
        let storage = temp_storage();
        let err = storage
            .open(MediaFolder::Images, "../secret")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn test_open_missing_file_is_not_found() {
        let storage = temp_storage();
        let err = storage
            .open(MediaFolder::Images, "missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }
}
