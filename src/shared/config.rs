use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub attachments: AttachmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Retry count at which an operation is reported as failed.
    pub max_retries: u32,
    pub retention_hours: u64,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub probe_url: Option<String>,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub debounce_millis: u64,
    pub offline_failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub freshness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub max_input_bytes: usize,
    pub max_dimension: u32,
    pub max_encoded_bytes: usize,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub accepted_content_types: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
            },
            sync: SyncConfig {
                max_retries: 5,
                retention_hours: 24,
                channel_capacity: 32,
            },
            network: NetworkConfig {
                probe_url: None,
                probe_interval_secs: 30,
                probe_timeout_secs: 5,
                debounce_millis: 1_500,
                offline_failure_threshold: 2,
            },
            cache: CacheConfig {
                freshness_secs: 300, // 5 minutes
            },
            attachments: AttachmentConfig::default(),
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 10 * 1024 * 1024, // 10MB
            max_dimension: 1600,
            max_encoded_bytes: 1024 * 1024, // 1MB
            initial_quality: 82,
            min_quality: 40,
            accepted_content_types: vec![
                "image/jpeg".to_string(),
                "image/jpg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
                "image/bmp".to_string(),
            ],
        }
    }
}

impl SyncConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }
}

impl NetworkConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs as i64)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FIELDSYNC_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_MAX_RETRIES") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.max_retries = value.min(u32::MAX as u64) as u32;
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_RETENTION_HOURS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.retention_hours = value;
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_PROBE_URL") {
            let v = v.trim();
            cfg.network.probe_url = if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            };
        }
        if let Ok(v) = std::env::var("FIELDSYNC_PROBE_INTERVAL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.network.probe_interval_secs = value;
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_DEBOUNCE_MILLIS") {
            if let Some(value) = parse_u64(&v) {
                cfg.network.debounce_millis = value;
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_CACHE_FRESHNESS_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.cache.freshness_secs = value;
            }
        }
        if let Ok(v) = std::env::var("FIELDSYNC_PHOTO_MAX_DIMENSION") {
            if let Some(value) = parse_u64(&v) {
                cfg.attachments.max_dimension = value.min(u32::MAX as u64) as u32;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.max_retries == 0 {
            return Err("Sync max_retries must be greater than 0".to_string());
        }
        if self.sync.channel_capacity == 0 {
            return Err("Sync channel_capacity must be greater than 0".to_string());
        }
        if self.network.probe_interval_secs == 0 {
            return Err("Network probe_interval_secs must be greater than 0".to_string());
        }
        if self.network.probe_timeout_secs == 0 {
            return Err("Network probe_timeout_secs must be greater than 0".to_string());
        }
        if self.network.offline_failure_threshold == 0 {
            return Err("Network offline_failure_threshold must be greater than 0".to_string());
        }
        if self.attachments.max_input_bytes == 0 {
            return Err("Attachment max_input_bytes must be greater than 0".to_string());
        }
        if self.attachments.max_encoded_bytes == 0 {
            return Err("Attachment max_encoded_bytes must be greater than 0".to_string());
        }
        if self.attachments.max_dimension == 0 {
            return Err("Attachment max_dimension must be greater than 0".to_string());
        }
        if self.attachments.min_quality == 0
            || self.attachments.min_quality > self.attachments.initial_quality
            || self.attachments.initial_quality > 100
        {
            return Err("Attachment quality bounds must satisfy 0 < min <= initial <= 100".to_string());
        }
        Ok(())
    }
}

fn default_database_url() -> String {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("./data"));
    let path = base.join("fieldsync").join("fieldsync.db");
    format!("sqlite://{}?mode=rwc", path.display())
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
