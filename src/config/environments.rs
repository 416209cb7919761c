//! Environment registry: built-in deployments merged with `environments.json`

use super::{ENV_OVERRIDE_VAR, EnvironmentEntry, EnvironmentsFile};
use crate::api::models::Environment;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Built-in environments, in display order
pub fn default_environments() -> Vec<Environment> {
    vec![
        Environment::new("dev", "https://dev.datarails.com", "https://dev-auth.datarails.com", "Development"),
        Environment::new("demo", "https://demo.datarails.com", "https://demo-auth.datarails.com", "Demo"),
        Environment::new(
            "testapp",
            "https://testapp.datarails.com",
            "https://testapp-auth.datarails.com",
            "Test App",
        ),
        Environment::new("app", "https://app.datarails.com", "https://auth.datarails.com", "Production"),
    ]
}

/// Which rule picked the active environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSource {
    EnvVar,
    Selected,
    ConfigFile,
    Default,
}

/// Outcome of `set_active_environment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Written to the config file
    Persisted,
    /// Config file not writable; the choice holds for this process only
    SessionOnly { reason: String },
}

#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    config_path: PathBuf,
    env_override: Option<String>,
    selected: Option<String>,
}

impl EnvironmentRegistry {
    /// Registry backed by the given config file, ignoring process env vars
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            env_override: None,
            selected: None,
        }
    }

    /// Registry at the standard location, honoring `FINOS_ENV`
    pub fn from_env() -> Result<Self> {
        let override_env = std::env::var(ENV_OVERRIDE_VAR).ok();
        Ok(Self::new(super::environments_path()?).with_env_override(override_env))
    }

    pub fn with_env_override(mut self, env: Option<String>) -> Self {
        self.env_override = env.filter(|e| !e.trim().is_empty());
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Read the config file. Missing or invalid files read as empty.
    fn load_file(&self) -> EnvironmentsFile {
        if !self.config_path.exists() {
            debug!("No environments config at {:?}, using defaults", self.config_path);
            return EnvironmentsFile::default();
        }

        let parsed = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read environments config: {:?}", self.config_path))
            .and_then(|content| {
                serde_json::from_str::<EnvironmentsFile>(&content)
                    .with_context(|| format!("Failed to parse environments config: {:?}", self.config_path))
            });

        match parsed {
            Ok(file) => file,
            Err(e) => {
                warn!("{:#}; using defaults", e);
                EnvironmentsFile::default()
            }
        }
    }

    fn save_file(&self, file: &EnvironmentsFile) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(file).context("Failed to serialize environments config")?;
        fs::write(&self.config_path, content)
            .with_context(|| format!("Failed to write environments config: {:?}", self.config_path))?;

        debug!("Saved environments config to {:?}", self.config_path);
        Ok(())
    }

    /// Defaults merged with the config file; config entries win field by field
    pub fn environments(&self) -> Vec<Environment> {
        let file = self.load_file();
        let mut merged = default_environments();

        for env in merged.iter_mut() {
            if let Some(entry) = file.environments.get(&env.name) {
                apply_entry(env, entry);
            }
        }

        for (name, entry) in &file.environments {
            if merged.iter().any(|env| &env.name == name) {
                continue;
            }
            let mut env = Environment::new(
                name,
                &format!("https://{}.datarails.com", name),
                "",
                name,
            );
            apply_entry(&mut env, entry);
            if env.auth_url.is_empty() {
                env.auth_url = env.base_url.clone();
            }
            merged.push(env);
        }

        merged
    }

    pub fn names(&self) -> Vec<String> {
        self.environments().into_iter().map(|env| env.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<Environment> {
        self.environments().into_iter().find(|env| env.name == name)
    }

    /// Look up an environment, failing with the list of known names
    pub fn require(&self, name: &str) -> Result<Environment> {
        self.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown environment '{}'. Available: {}",
                name,
                self.names().join(", ")
            )
        })
    }

    /// Env var override, then in-process selection, then config file, then `dev`
    pub fn active_environment(&self) -> String {
        self.resolve_active().0
    }

    pub fn active_source(&self) -> ActiveSource {
        self.resolve_active().1
    }

    fn resolve_active(&self) -> (String, ActiveSource) {
        if let Some(env) = &self.env_override {
            return (env.clone(), ActiveSource::EnvVar);
        }
        if let Some(env) = &self.selected {
            return (env.clone(), ActiveSource::Selected);
        }
        if let Some(env) = self.load_file().active_environment {
            return (env, ActiveSource::ConfigFile);
        }
        (DEFAULT_ENVIRONMENT.to_string(), ActiveSource::Default)
    }

    /// Make `name` the active environment and try to persist the choice
    pub fn set_active_environment(&mut self, name: &str) -> Result<Selection> {
        self.require(name)?;
        self.selected = Some(name.to_string());

        let mut file = self.load_file();
        file.active_environment = Some(name.to_string());

        match self.save_file(&file) {
            Ok(()) => {
                info!("Active environment set to {}", name);
                Ok(Selection::Persisted)
            }
            Err(e) => {
                warn!("Could not persist active environment {}: {:#}", name, e);
                Ok(Selection::SessionOnly {
                    reason: format!("{:#}", e),
                })
            }
        }
    }
}

fn apply_entry(env: &mut Environment, entry: &EnvironmentEntry) {
    if let Some(base_url) = &entry.base_url {
        env.base_url = base_url.clone();
    }
    if let Some(auth_url) = &entry.auth_url {
        env.auth_url = auth_url.clone();
    }
    if let Some(display_name) = &entry.display_name {
        env.display_name = display_name.clone();
    }
}
