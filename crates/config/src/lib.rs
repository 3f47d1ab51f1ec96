//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 数据库连接（未配置时使用内存存储）
//! - JWT认证与吊销表清理
//! - 房间广播队列
//! - 附件存储

use std::{env, path::Path, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 默认的 YAML 配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "config/app.yaml";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 广播器配置
    pub broadcast: BroadcastConfig,
    /// 吊销表配置
    pub revocation: RevocationConfig,
    /// 附件配置
    pub attachments: AttachmentConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 为空时使用进程内存储
    pub url: Option<String>,
    pub max_connections: u32,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

/// 广播器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// 每个订阅者的出站队列容量
    pub subscriber_queue_capacity: usize,
    /// 单个订阅者入队的最长等待时间
    pub enqueue_timeout_ms: u64,
}

impl BroadcastConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationConfig {
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub directory: String,
    pub public_prefix: String,
}

impl AppConfig {
    /// 按 默认值 → YAML 文件 → `CHAT_` 环境变量 的顺序合并配置
    ///
    /// 嵌套字段使用双下划线，例如 `CHAT_JWT__SECRET`。
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Self::from_env_with_defaults()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CHAT_").split("__"))
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))
    }

    /// 从环境变量加载配置，开发环境版本
    /// 提供不安全的默认值，仅用于测试和开发
    pub fn from_env_with_defaults() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    "dev-secret-key-not-for-production-use-minimum-32-chars".to_string()
                }),
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24),
            },
            broadcast: BroadcastConfig {
                subscriber_queue_capacity: env::var("BROADCAST_QUEUE_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(256),
                enqueue_timeout_ms: env::var("BROADCAST_ENQUEUE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200),
            },
            revocation: RevocationConfig {
                sweep_interval_secs: 60,
            },
            attachments: AttachmentConfig {
                directory: env::var("ATTACHMENT_DIR").unwrap_or_else(|_| "uploads".to_string()),
                public_prefix: "/attachments".to_string(),
            },
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.database.url {
            if url.is_empty() {
                return Err(ConfigError::InvalidDatabaseUrl(
                    "Database URL cannot be empty".to_string(),
                ));
            }
            if self.database.max_connections == 0 {
                return Err(ConfigError::InvalidDatabaseConfig(
                    "Max connections must be greater than 0".to_string(),
                ));
            }
        }

        // 至少256位密钥
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT expiration must be positive".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerPort(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.broadcast.subscriber_queue_capacity == 0 || self.broadcast.enqueue_timeout_ms == 0
        {
            return Err(ConfigError::InvalidBroadcastConfig(
                "queue capacity and enqueue timeout must be greater than 0".to_string(),
            ));
        }

        if self.revocation.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "revocation sweep interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid server port: {0}")]
    InvalidServerPort(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid broadcast configuration: {0}")]
    InvalidBroadcastConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    fn default() -> Self {
        Self::from_env_with_defaults()
    }
}
