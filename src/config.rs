use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Runtime configuration, loaded once at startup from a JSON file and
/// passed explicitly to every component that needs it.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the remote API, no trailing slash.
    pub base_url: String,
    /// Bearer token for every remote call.
    pub token: String,
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,
    /// Poll interval for the outbound audit queue.
    #[serde(default = "default_audit_interval_seconds")]
    pub audit_interval_seconds: u64,
    /// Path of the JSON file holding the last-sync watermark.
    pub status_file: PathBuf,
    /// URL probed before each pass to verify connectivity.
    pub connectivity_url: String,
    #[serde(default = "default_connectivity_timeout_seconds")]
    pub connectivity_timeout_seconds: u64,
    /// Backward adjustment applied to the watermark before querying,
    /// to tolerate clock skew and in-flight remote writes.
    #[serde(default = "default_lead_interval_minutes")]
    pub lead_interval_minutes: i64,
    /// Identifier of this device, matched against incoming use tokens.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Directory that downloaded account images are written into.
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path. Defaults to `~/.attsync/attsync.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_sync_interval_minutes() -> u64 {
    5
}

fn default_audit_interval_seconds() -> u64 {
    20
}

fn default_connectivity_timeout_seconds() -> u64 {
    5
}

fn default_lead_interval_minutes() -> i64 {
    60
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.base_url.is_empty() {
            return Err(Error::Config("server.base_url must not be empty".into()));
        }
        if self.server.token.is_empty() {
            return Err(Error::Config("server.token must not be empty".into()));
        }
        if self.server.sync_interval_minutes == 0 {
            return Err(Error::Config(
                "server.sync_interval_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.server.sync_interval_minutes * 60)
    }

    pub fn audit_interval(&self) -> Duration {
        Duration::from_secs(self.server.audit_interval_seconds)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connectivity_timeout_seconds)
    }
}
