//! Configuration loading and config file resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `SKILLORBIT_CONFIG` environment variable
//! 3. User config file (`<config dir>/skillorbit/ingest.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file never terminates startup: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SKILLORBIT_CONFIG";

/// What to do with a date cell that cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparsableDatePolicy {
    /// Store the date as absent and keep the row
    #[default]
    DropField,
    /// Drop the whole row with a warning
    RejectRow,
}

/// `[ingest]` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub on_unparsable_date: UnparsableDatePolicy,
    /// Upper bound for the whole delete/insert/commit sequence
    pub store_timeout_secs: u64,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            on_unparsable_date: UnparsableDatePolicy::default(),
            store_timeout_secs: 30,
        }
    }
}

impl IngestSection {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Service configuration (TOML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub log_level: String,
    pub max_upload_bytes: usize,
    /// Browser origins allowed to call the service with credentials
    pub cors_allowed_origins: Vec<String>,
    pub ingest: IngestSection,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: "127.0.0.1:8000".to_string(),
            log_level: "info".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            cors_allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://127.0.0.1:4200".to_string(),
            ],
            ingest: IngestSection::default(),
        }
    }
}

impl ServiceConfig {
    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.trim().is_empty() {
            return Err(Error::Config("bind_address must not be empty".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than zero".to_string()));
        }
        let wildcard = |o: &&String| o.trim().is_empty() || o.trim() == "*";
        if let Some(origin) = self.cors_allowed_origins.iter().find(wildcard) {
            return Err(Error::Config(format!(
                "cors_allowed_origins entry {:?} must be an explicit origin",
                origin
            )));
        }
        if self.ingest.store_timeout_secs == 0 {
            return Err(Error::Config(
                "ingest.store_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pick the config file to load, or `None` to run on compiled defaults
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config file, only if present
    dirs::config_dir()
        .map(|d| d.join("skillorbit").join("ingest.toml"))
        .filter(|p| p.exists())
}

/// Load configuration from `path`, falling back to defaults when absent
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(ServiceConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using compiled defaults",
            path.display()
        );
        return Ok(ServiceConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded config from {}", path.display());

    Ok(config)
}

/// Parse and validate TOML config text
pub fn parse_config(content: &str) -> Result<ServiceConfig> {
    let config: ServiceConfig =
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("skillorbit"))
        .unwrap_or_else(|| PathBuf::from("./skillorbit_data"))
        .join("skillorbit.db")
}
