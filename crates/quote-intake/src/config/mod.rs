use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Deployment stage, read from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Everything the portal reads from the environment at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub uploads: UploadLimits,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Reads `APP_*` variables, after loading a `.env` file when one is present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = text_var("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        Ok(Self {
            environment: AppEnvironment::parse(&text_var("APP_ENV", "development")),
            server: ServerConfig {
                host: text_var("APP_HOST", "127.0.0.1"),
                port,
            },
            telemetry: TelemetryConfig {
                log_level: text_var("APP_LOG_LEVEL", "info"),
            },
            storage: StorageConfig {
                root: PathBuf::from(text_var("APP_STORAGE_ROOT", "./storage")),
            },
            uploads: UploadLimits {
                max_image_bytes: numeric_var("APP_MAX_IMAGE_KB", 2048)?.saturating_mul(1024),
                max_document_bytes: numeric_var("APP_MAX_DOCUMENT_KB", 10240)?
                    .saturating_mul(1024),
            },
            notifications: NotificationConfig {
                timeout: Duration::from_millis(numeric_var("APP_NOTIFY_TIMEOUT_MS", 2000)?),
                recipients: list_var("APP_NOTIFY_RECIPIENTS"),
            },
        })
    }
}

fn text_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn numeric_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn list_var(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Listener address for the HTTP service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost { source })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Root directory backing the local file store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

/// Size caps applied to uploaded images and documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_image_bytes: u64,
    pub max_document_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 2048 * 1024,
            max_document_bytes: 10240 * 1024,
        }
    }
}

/// Outbound notification settings. Recipients are handed to the notifier adapter as-is.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub timeout: Duration,
    pub recipients: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            recipients: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must be an IP address or localhost")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{key} must be a non-negative integer")]
    InvalidNumber { key: &'static str },
}
