//! Per-process context: environments, stored sessions and one client per environment

use super::client::ApiClient;
use super::models::SessionCredential;
use crate::auth::{Auth, HttpTokenEndpoint, InjectedCredentials, TokenEndpoint};
use crate::config::{CredentialStore, EnvironmentRegistry, Selection, StorageLocation};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One row of `auth --list` / `status --all`
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub name: String,
    pub display_name: String,
    pub base_url: String,
    pub authenticated: bool,
    pub is_active: bool,
}

/// Built once in `main` and passed to commands. Clients are created lazily
/// and cached per environment until invalidated.
pub struct ClientManager {
    registry: EnvironmentRegistry,
    store: Arc<CredentialStore>,
    injected: InjectedCredentials,
    clients: RwLock<HashMap<String, Arc<ApiClient>>>,
}

impl ClientManager {
    pub fn new(registry: EnvironmentRegistry, store: CredentialStore, injected: InjectedCredentials) -> Self {
        Self {
            registry,
            store: Arc::new(store),
            injected,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Standard config locations, the system keyring and `FINOS_*` variables
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(
            EnvironmentRegistry::from_env()?,
            CredentialStore::system()?,
            InjectedCredentials::from_env(),
        ))
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    pub fn injected(&self) -> &InjectedCredentials {
        &self.injected
    }

    pub fn active_environment(&self) -> String {
        self.registry.active_environment()
    }

    /// `env` if given, otherwise the active environment
    pub fn resolve_name(&self, env: Option<&str>) -> String {
        env.map(str::to_string).unwrap_or_else(|| self.active_environment())
    }

    /// Get or create the client for an environment
    pub async fn client(&self, env: Option<&str>) -> anyhow::Result<Arc<ApiClient>> {
        let name = self.resolve_name(env);

        if let Some(client) = self.clients.read().await.get(&name) {
            return Ok(Arc::clone(client));
        }

        let environment = self.registry.require(&name)?;
        let endpoint: Arc<dyn TokenEndpoint> = Arc::new(HttpTokenEndpoint::new(&environment.base_url)?);
        let injected = self.injected.clone();

        // Selecting the backend reads the keyring, which may block for the full timeout
        let auth = self
            .with_store(move |store| Auth::select(environment, store, endpoint, &injected))
            .await?;
        debug!("Created {:?} client for environment {}", auth.kind(), name);

        let client = Arc::new(ApiClient::new(auth)?);
        self.clients.write().await.insert(name, Arc::clone(&client));
        Ok(client)
    }

    /// Forget the cached client so the next `client` call starts fresh
    pub async fn invalidate(&self, env: &str) {
        if self.clients.write().await.remove(env).is_some() {
            debug!("Dropped cached client for {}", env);
        }
    }

    /// Run a credential store call on the blocking pool
    async fn with_store<T, F>(&self, call: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<CredentialStore>) -> T + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || call(store)).await?)
    }

    pub async fn has_session(&self, env: &str) -> anyhow::Result<bool> {
        let env = env.to_string();
        self.with_store(move |store| store.has_session(&env)).await
    }

    pub async fn keyring_available(&self) -> anyhow::Result<bool> {
        self.with_store(|store| store.keyring_available()).await
    }

    /// Store a session for an environment
    pub async fn login(&self, env: &str, session: &SessionCredential) -> anyhow::Result<StorageLocation> {
        self.registry.require(env)?;
        let (name, session) = (env.to_string(), session.clone());
        let location = self.with_store(move |store| store.save(&name, &session)).await??;
        self.invalidate(env).await;
        info!("Logged in to {} ({:?})", env, location);
        Ok(location)
    }

    pub async fn logout(&self, env: &str) -> anyhow::Result<()> {
        let name = env.to_string();
        self.with_store(move |store| store.clear(&name)).await??;
        self.invalidate(env).await;
        info!("Logged out of {}", env);
        Ok(())
    }

    /// Clear every environment that has a stored session; returns their names
    pub async fn logout_all(&self) -> anyhow::Result<Vec<String>> {
        let mut cleared = Vec::new();
        for status in self.authenticated_environments().await? {
            if status.authenticated {
                self.logout(&status.name).await?;
                cleared.push(status.name);
            }
        }
        Ok(cleared)
    }

    pub fn switch_environment(&mut self, env: &str) -> anyhow::Result<Selection> {
        self.registry.set_active_environment(env)
    }

    pub async fn authenticated_environments(&self) -> anyhow::Result<Vec<EnvironmentStatus>> {
        let active = self.active_environment();
        let environments = self.registry.environments();
        let names: Vec<String> = environments.iter().map(|env| env.name.clone()).collect();
        let sessions = self.with_store(move |store| store.list_authenticated(&names)).await?;

        Ok(environments
            .into_iter()
            .zip(sessions)
            .map(|(env, (_, authenticated))| EnvironmentStatus {
                authenticated,
                is_active: env.name == active,
                name: env.name,
                display_name: env.display_name,
                base_url: env.base_url,
            })
            .collect())
    }
}
