//! 服务配置
//!
//! 加载顺序：代码内默认值 <- config/destek.toml <- 环境变量。
//! 环境变量优先，便于容器部署时覆盖。

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub presence: PresenceConfig,
    pub limits: LimitsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// 配置后使用 PostgreSQL 仓储，否则使用进程内存仓储
    pub postgres_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// 上传文件落盘目录
    pub upload_dir: String,
    /// 图片上限（字节）
    pub max_image_bytes: usize,
    /// 音频上限（字节）
    pub max_audio_bytes: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// 在线窗口：最后一次活跃信号后多久判定离线
    pub online_window_secs: u64,
    /// 客户端心跳节拍（下发给前端，服务端按窗口容忍丢拍）
    pub heartbeat_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_display_name_chars: usize,
    pub max_text_chars: usize,
    /// 通道消息限流：窗口内最大条数
    pub message_rate_max: usize,
    pub message_rate_window_secs: u64,
    /// 上传限流：窗口内最大次数
    pub image_upload_max: usize,
    pub audio_upload_max: usize,
    pub upload_rate_window_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            media: MediaConfig::default(),
            presence: PresenceConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_string(),
            max_image_bytes: 5 * 1024 * 1024,
            max_audio_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_window_secs: 120,
            heartbeat_secs: 30,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_display_name_chars: 64,
            max_text_chars: 4096,
            message_rate_max: 20,
            message_rate_window_secs: 60,
            image_upload_max: 5,
            audio_upload_max: 3,
            upload_rate_window_secs: 300,
        }
    }
}

impl HubConfig {
    /// 从 TOML 文件加载（文件缺失时使用默认值），再套环境变量覆盖
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path.unwrap_or("config/destek.toml");
        let mut config = if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path))?
        } else {
            HubConfig::default()
        };

        if let Ok(address) = env::var("DESTEK_SERVER_ADDRESS") {
            config.server.address = address;
        }
        if let Ok(port) = env::var("DESTEK_SERVER_PORT") {
            config.server.port = port
                .parse()
                .context("DESTEK_SERVER_PORT must be a port number")?;
        }
        if let Ok(url) = env::var("DESTEK_POSTGRES_URL") {
            if !url.is_empty() {
                config.storage.postgres_url = Some(url);
            }
        }
        if let Ok(dir) = env::var("DESTEK_UPLOAD_DIR") {
            config.media.upload_dir = dir;
        }
        if let Ok(secs) = env::var("DESTEK_ONLINE_WINDOW_SECS") {
            config.presence.online_window_secs = secs
                .parse()
                .context("DESTEK_ONLINE_WINDOW_SECS must be seconds")?;
        }

        Ok(config)
    }

    pub fn online_window(&self) -> Duration {
        Duration::from_secs(self.presence.online_window_secs)
    }

    pub fn message_rate_window(&self) -> Duration {
        Duration::from_secs(self.limits.message_rate_window_secs)
    }

    pub fn upload_rate_window(&self) -> Duration {
        Duration::from_secs(self.limits.upload_rate_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = HubConfig::default();
        assert_eq!(config.presence.online_window_secs, 120);
        assert_eq!(config.presence.heartbeat_secs, 30);
        assert_eq!(config.limits.message_rate_max, 20);
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [storage]
            postgres_url = "postgres://localhost/destek"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(
            config.storage.postgres_url.as_deref(),
            Some("postgres://localhost/destek")
        );
        assert_eq!(config.presence.online_window_secs, 120);
    }
}
