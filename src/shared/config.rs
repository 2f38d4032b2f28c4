use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub attachments: AttachmentConfig,
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    /// Bearer token of the signed-in user. Falls back to the API key.
    #[serde(default)]
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub reports_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// Hold mutations the server rejects instead of replaying them on every pass.
    pub hold_rejected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub bucket: String,
    pub table: String,
    pub owner_column: String,
    pub url_column: String,
    pub flag_column: String,
    pub max_bytes: u64,
    pub max_per_entity: u32,
    pub content_type_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub debounce_ms: u64,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub assume_online: bool,
}

impl ConnectivityConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 1,
                connection_timeout: 30,
            },
            remote: RemoteConfig {
                base_url: String::new(),
                api_key: String::new(),
                access_token: None,
                request_timeout_secs: 30,
                reports_table: "reports".to_string(),
            },
            sync: SyncConfig {
                auto_sync: true,
                hold_rejected: true,
            },
            attachments: AttachmentConfig::default(),
            connectivity: ConnectivityConfig {
                debounce_ms: 1_500,
                probe_interval_secs: 15,
                probe_timeout_secs: 5,
                assume_online: false,
            },
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            bucket: "report-photos".to_string(),
            table: "photos".to_string(),
            owner_column: "report_id".to_string(),
            url_column: "url".to_string(),
            flag_column: "has_photos".to_string(),
            max_bytes: 5 * 1024 * 1024, // 5MB
            max_per_entity: 10,
            content_type_prefix: "image/".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("INSPECTION_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = lookup("INSPECTION_DATABASE_MAX_CONNECTIONS").and_then(|v| parse_u64(&v))
        {
            cfg.database.max_connections = value.clamp(1, u32::MAX as u64) as u32;
        }

        if let Some(v) = lookup("INSPECTION_REMOTE_URL") {
            cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("INSPECTION_REMOTE_API_KEY") {
            cfg.remote.api_key = v.trim().to_string();
        }
        if let Some(v) = lookup("INSPECTION_REMOTE_ACCESS_TOKEN") {
            let token = v.trim();
            cfg.remote.access_token = if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            };
        }
        if let Some(value) = lookup("INSPECTION_REMOTE_TIMEOUT_SECS").and_then(|v| parse_u64(&v)) {
            cfg.remote.request_timeout_secs = value.max(1);
        }
        if let Some(v) = lookup("INSPECTION_REPORTS_TABLE") {
            if !v.trim().is_empty() {
                cfg.remote.reports_table = v.trim().to_string();
            }
        }

        if let Some(v) = lookup("INSPECTION_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(v) = lookup("INSPECTION_HOLD_REJECTED") {
            cfg.sync.hold_rejected = parse_bool(&v, cfg.sync.hold_rejected);
        }

        if let Some(v) = lookup("INSPECTION_PHOTO_BUCKET") {
            if !v.trim().is_empty() {
                cfg.attachments.bucket = v.trim().to_string();
            }
        }
        if let Some(value) = lookup("INSPECTION_PHOTO_MAX_BYTES").and_then(|v| parse_u64(&v)) {
            cfg.attachments.max_bytes = value.max(1);
        }

        if let Some(value) = lookup("INSPECTION_CONNECTIVITY_DEBOUNCE_MS").and_then(|v| parse_u64(&v))
        {
            cfg.connectivity.debounce_ms = value;
        }
        if let Some(value) = lookup("INSPECTION_PROBE_INTERVAL_SECS").and_then(|v| parse_u64(&v)) {
            cfg.connectivity.probe_interval_secs = value.max(1);
        }
        if let Some(v) = lookup("INSPECTION_ASSUME_ONLINE") {
            cfg.connectivity.assume_online = parse_bool(&v, cfg.connectivity.assume_online);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.base_url.is_empty() {
            return Err("Remote base_url is not configured (set INSPECTION_REMOTE_URL)".to_string());
        }
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err("Remote base_url must start with http:// or https://".to_string());
        }
        if self.remote.api_key.is_empty() {
            return Err(
                "Remote api_key is not configured (set INSPECTION_REMOTE_API_KEY)".to_string(),
            );
        }
        if self.attachments.max_per_entity == 0 {
            return Err("Attachments max_per_entity must be greater than 0".to_string());
        }
        if self.connectivity.probe_timeout_secs == 0 {
            return Err("Connectivity probe_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .map(|dir| dir.join("inspection-sync"))
        .unwrap_or_else(|| PathBuf::from("./data"));
    format!("sqlite://{}", dir.join("offline.db").display())
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
