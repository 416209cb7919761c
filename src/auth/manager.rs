//! Token lifecycle for one environment
//!
//! Session cookies are long-lived, the refresh token lives for hours and the
//! access token for minutes. `ensure_valid_token` keeps a usable access token
//! around, touching the network only when the cached one is about to expire.

use super::endpoint::TokenEndpoint;
use super::jwt::BearerToken;
use crate::api::constants::headers;
use crate::api::models::{Environment, SessionCredential};
use crate::config::{CredentialStore, StorageLocation};
use log::{debug, info, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Refresh this many seconds before the access token actually expires
pub const REFRESH_BUFFER_SECS: i64 = 30;

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Default)]
struct TokenState {
    session: Option<SessionCredential>,
    access: Option<BearerToken>,
    refresh: Option<BearerToken>,
}

/// Token lifetimes for `status` output
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub environment: String,
    pub has_session: bool,
    pub has_access_token: bool,
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
    pub needs_refresh: bool,
}

pub struct TokenManager {
    environment: Environment,
    endpoint: Arc<dyn TokenEndpoint>,
    store: Option<Arc<CredentialStore>>,
    buffer_secs: i64,
    state: RwLock<TokenState>,
}

impl TokenManager {
    /// Manager whose session is read from, and written back to, the store
    pub fn load(environment: Environment, store: Arc<CredentialStore>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        let session = store.load(&environment.name);
        debug!(
            "Token manager for {} created (session present: {})",
            environment.name,
            session.is_some()
        );

        Self {
            environment,
            endpoint,
            store: Some(store),
            buffer_secs: REFRESH_BUFFER_SECS,
            state: RwLock::new(TokenState {
                session,
                ..TokenState::default()
            }),
        }
    }

    /// Manager that never touches persistent storage
    pub fn detached(
        environment: Environment,
        endpoint: Arc<dyn TokenEndpoint>,
        session: Option<SessionCredential>,
    ) -> Self {
        Self {
            environment,
            endpoint,
            store: None,
            buffer_secs: REFRESH_BUFFER_SECS,
            state: RwLock::new(TokenState {
                session,
                ..TokenState::default()
            }),
        }
    }

    pub fn with_buffer(mut self, buffer_secs: i64) -> Self {
        self.buffer_secs = buffer_secs;
        self
    }

    /// Seed a pre-issued access token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.state.get_mut().access = Some(BearerToken::new(token));
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    pub async fn has_access_token(&self) -> bool {
        self.state.read().await.access.is_some()
    }

    /// Make sure a usable access token is cached.
    ///
    /// Reuses the cached token while it is outside the refresh buffer, then
    /// tries the refresh token, then a new pair from the session. Failures are
    /// logged and reported as `false`.
    pub async fn ensure_valid_token(&self) -> bool {
        {
            let state = self.state.read().await;
            if state.access.as_ref().is_some_and(|t| t.is_fresh(now_secs(), self.buffer_secs)) {
                return true;
            }
        }

        let mut state = self.state.write().await;
        let now = now_secs();

        // Another caller may have refreshed while we waited for the lock
        if state.access.as_ref().is_some_and(|t| t.is_fresh(now, self.buffer_secs)) {
            return true;
        }

        let refresh_token = state
            .refresh
            .as_ref()
            .filter(|t| t.is_fresh(now, self.buffer_secs))
            .map(|t| t.value().to_string());

        if let Some(refresh_token) = refresh_token {
            let refreshed = self.endpoint.refresh(state.session.as_ref(), &refresh_token).await;
            match refreshed {
                Ok(access) => {
                    state.access = Some(BearerToken::new(access));
                    debug!("Refreshed access token for {}", self.environment.name);
                    return true;
                }
                Err(e) => warn!("Token refresh failed for {}: {:#}", self.environment.name, e),
            }
        }

        let Some(session) = state.session.clone() else {
            debug!("No session for {}, cannot fetch tokens", self.environment.name);
            return false;
        };

        match self.endpoint.issue(&session).await {
            Ok(pair) => {
                state.access = Some(BearerToken::new(pair.access));
                state.refresh = Some(BearerToken::new(pair.refresh));
                info!("Fetched new token pair for {}", self.environment.name);
                true
            }
            Err(e) => {
                warn!("Token fetch failed for {}: {:#}", self.environment.name, e);
                false
            }
        }
    }

    /// Request headers from the current state, without checking expiry
    pub async fn headers(&self) -> HeaderMap {
        let state = self.state.read().await;
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static(headers::CONTENT_TYPE_JSON));

        if let Some(access) = &state.access {
            match HeaderValue::from_str(&format!("Bearer {}", access.value())) {
                Ok(value) => {
                    map.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Access token for {} is not a valid header value", self.environment.name),
            }
        }

        if let Some(session) = &state.session {
            if let Ok(value) = HeaderValue::from_str(&session.csrf_token) {
                map.insert(HeaderName::from_static(headers::CSRF_HEADER_NAME), value);
            }
        }

        map
    }

    /// Mark the access token stale so the next `ensure_valid_token` goes to the network
    pub async fn invalidate_access_token(&self) {
        if let Some(access) = self.state.write().await.access.as_mut() {
            access.expire();
        }
    }

    /// Install a new session, persist it and drop cached tokens
    pub async fn set_session(&self, session: SessionCredential) -> anyhow::Result<Option<StorageLocation>> {
        let location = match &self.store {
            Some(store) => {
                let (store, env, record) = (Arc::clone(store), self.environment.name.clone(), session.clone());
                Some(tokio::task::spawn_blocking(move || store.save(&env, &record)).await??)
            }
            None => None,
        };

        let mut state = self.state.write().await;
        state.session = Some(session);
        state.access = None;
        state.refresh = None;

        Ok(location)
    }

    /// Wipe tokens and session and delete the persisted entry
    pub async fn clear(&self) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            *state = TokenState::default();
        }

        if let Some(store) = &self.store {
            let (store, env) = (Arc::clone(store), self.environment.name.clone());
            tokio::task::spawn_blocking(move || store.clear(&env)).await??;
        }

        Ok(())
    }

    pub async fn token_info(&self) -> TokenInfo {
        let state = self.state.read().await;
        let now = now_secs();

        TokenInfo {
            environment: self.environment.name.clone(),
            has_session: state.session.is_some(),
            has_access_token: state.access.is_some(),
            access_expires_in: state.access.as_ref().map_or(0, |t| t.seconds_left(now)),
            refresh_expires_in: state.refresh.as_ref().map_or(0, |t| t.seconds_left(now)),
            needs_refresh: !state.access.as_ref().is_some_and(|t| t.is_fresh(now, self.buffer_secs)),
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("environment", &self.environment.name)
            .field("buffer_secs", &self.buffer_secs)
            .finish()
    }
}
