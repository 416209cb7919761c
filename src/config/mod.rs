//! Configuration paths and on-disk formats

pub mod credentials;
pub mod environments;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub use credentials::{CredentialStore, CredentialStoreError, StorageLocation};
pub use environments::{ActiveSource, EnvironmentRegistry, Selection};

pub const APP_NAME: &str = "financeos-cli";

/// Overrides the active environment for one process
pub const ENV_OVERRIDE_VAR: &str = "FINOS_ENV";

/// Overrides the configuration directory
pub const CONFIG_DIR_VAR: &str = "FINOS_CONFIG_DIR";

pub const ENVIRONMENTS_FILE: &str = "environments.json";

pub const LOG_FILE: &str = "financeos-cli.log";

/// Resolve the configuration directory without touching the filesystem
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_VAR) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let config_dir = if cfg!(target_os = "linux") {
        // Use XDG config directory on Linux
        dirs::config_dir()
            .context("Failed to get XDG config directory")?
            .join(APP_NAME)
    } else {
        // Use home directory with dot prefix on Windows/Mac
        dirs::home_dir()
            .context("Failed to get home directory")?
            .join(format!(".{}", APP_NAME))
    };

    Ok(config_dir)
}

/// Resolve the configuration directory, creating it when missing
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = config_dir()?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        info!("Created config directory: {:?}", config_dir);
    }

    Ok(config_dir)
}

pub fn environments_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(ENVIRONMENTS_FILE))
}

pub fn log_file_path() -> Result<PathBuf> {
    Ok(ensure_config_dir()?.join(LOG_FILE))
}

/// One environment entry in `environments.json`. Missing fields fall back to
/// the built-in definition of the same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Contents of `environments.json`. Unknown keys are preserved on save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentsFile {
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_environment: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
