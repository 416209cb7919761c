//! Authentication backends
//!
//! A stored browser session (`TokenManager`) or credentials injected through
//! environment variables (`EnvAuth`), behind one `Authenticator` interface.

pub mod browser;
pub mod credentials;
pub mod endpoint;
pub mod env;
pub mod jwt;
pub mod manager;

use crate::api::models::{AuthRequired, Environment};
use crate::config::CredentialStore;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;

pub use credentials::InjectedCredentials;
pub use endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenPair};
pub use env::EnvAuth;
pub use manager::{REFRESH_BUFFER_SECS, TokenInfo, TokenManager};

/// What the API client needs from an authentication backend
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn environment(&self) -> &Environment;
    async fn is_authenticated(&self) -> bool;
    async fn ensure_valid_token(&self) -> bool;
    async fn headers(&self) -> HeaderMap;
    async fn invalidate_access_token(&self);
    async fn clear(&self) -> anyhow::Result<()>;
    async fn token_info(&self) -> TokenInfo;
    fn auth_required(&self) -> AuthRequired;
}

#[async_trait]
impl Authenticator for TokenManager {
    fn environment(&self) -> &Environment {
        TokenManager::environment(self)
    }

    async fn is_authenticated(&self) -> bool {
        TokenManager::is_authenticated(self).await
    }

    async fn ensure_valid_token(&self) -> bool {
        TokenManager::ensure_valid_token(self).await
    }

    async fn headers(&self) -> HeaderMap {
        TokenManager::headers(self).await
    }

    async fn invalidate_access_token(&self) {
        TokenManager::invalidate_access_token(self).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        TokenManager::clear(self).await
    }

    async fn token_info(&self) -> TokenInfo {
        TokenManager::token_info(self).await
    }

    fn auth_required(&self) -> AuthRequired {
        AuthRequired::for_browser_login(TokenManager::environment(self))
    }
}

#[async_trait]
impl Authenticator for EnvAuth {
    fn environment(&self) -> &Environment {
        EnvAuth::environment(self)
    }

    async fn is_authenticated(&self) -> bool {
        EnvAuth::is_authenticated(self).await
    }

    async fn ensure_valid_token(&self) -> bool {
        EnvAuth::ensure_valid_token(self).await
    }

    async fn headers(&self) -> HeaderMap {
        EnvAuth::headers(self).await
    }

    async fn invalidate_access_token(&self) {
        EnvAuth::invalidate_access_token(self).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        EnvAuth::clear(self).await
    }

    async fn token_info(&self) -> TokenInfo {
        EnvAuth::token_info(self).await
    }

    fn auth_required(&self) -> AuthRequired {
        EnvAuth::auth_required(self)
    }
}

/// Which backend a set of injected credentials selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Session,
    Env,
}

impl AuthKind {
    /// Injected credentials win over the stored session whenever present
    pub fn for_credentials(injected: &InjectedCredentials) -> Self {
        if injected.is_configured() {
            AuthKind::Env
        } else {
            AuthKind::Session
        }
    }
}

/// The authentication backend for one environment
#[derive(Debug)]
pub enum Auth {
    Session(TokenManager),
    Env(EnvAuth),
}

impl Auth {
    pub fn select(
        environment: Environment,
        store: Arc<CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        injected: &InjectedCredentials,
    ) -> Self {
        match AuthKind::for_credentials(injected) {
            AuthKind::Env => Auth::Env(EnvAuth::new(environment, endpoint, injected)),
            AuthKind::Session => Auth::Session(TokenManager::load(environment, store, endpoint)),
        }
    }

    pub fn kind(&self) -> AuthKind {
        match self {
            Auth::Session(_) => AuthKind::Session,
            Auth::Env(_) => AuthKind::Env,
        }
    }

    fn inner(&self) -> &dyn Authenticator {
        match self {
            Auth::Session(manager) => manager,
            Auth::Env(env) => env,
        }
    }
}

#[async_trait]
impl Authenticator for Auth {
    fn environment(&self) -> &Environment {
        self.inner().environment()
    }

    async fn is_authenticated(&self) -> bool {
        self.inner().is_authenticated().await
    }

    async fn ensure_valid_token(&self) -> bool {
        self.inner().ensure_valid_token().await
    }

    async fn headers(&self) -> HeaderMap {
        self.inner().headers().await
    }

    async fn invalidate_access_token(&self) {
        self.inner().invalidate_access_token().await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner().clear().await
    }

    async fn token_info(&self) -> TokenInfo {
        self.inner().token_info().await
    }

    fn auth_required(&self) -> AuthRequired {
        self.inner().auth_required()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::SessionCredential;

    #[test]
    fn test_auth_kind_selection() {
        assert_eq!(AuthKind::for_credentials(&InjectedCredentials::default()), AuthKind::Session);

        let jwt_only = InjectedCredentials {
            session: None,
            jwt_token: Some("a.b.c".to_string()),
            csrf_token: None,
        };
        assert_eq!(AuthKind::for_credentials(&jwt_only), AuthKind::Env);

        let cookies = InjectedCredentials {
            session: Some(SessionCredential::new("sid", "csrf")),
            jwt_token: None,
            csrf_token: None,
        };
        assert_eq!(AuthKind::for_credentials(&cookies), AuthKind::Env);
    }
}
