//! Authentication from injected process credentials

use super::credentials::InjectedCredentials;
use super::endpoint::TokenEndpoint;
use super::manager::{TokenInfo, TokenManager};
use crate::api::models::{AuthRequired, Environment};
use crate::api::constants::headers;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;

/// Session cookies or a bearer token from `FINOS_*` variables. Nothing is
/// ever written to the credential store.
#[derive(Debug)]
pub struct EnvAuth {
    tokens: TokenManager,
    has_jwt: bool,
    csrf_token: Option<String>,
}

impl EnvAuth {
    pub fn new(environment: Environment, endpoint: Arc<dyn TokenEndpoint>, injected: &InjectedCredentials) -> Self {
        let mut tokens = TokenManager::detached(environment, endpoint, injected.session.clone());
        if let Some(jwt) = &injected.jwt_token {
            tokens = tokens.with_access_token(jwt.clone());
        }

        Self {
            tokens,
            has_jwt: injected.jwt_token.is_some(),
            csrf_token: injected.csrf_token.clone(),
        }
    }

    pub fn environment(&self) -> &Environment {
        self.tokens.environment()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.has_jwt || self.tokens.is_authenticated().await
    }

    pub async fn ensure_valid_token(&self) -> bool {
        self.tokens.ensure_valid_token().await
    }

    /// Token manager headers, plus a lone injected CSRF token when there is no session
    pub async fn headers(&self) -> HeaderMap {
        let mut map = self.tokens.headers().await;
        let csrf_header = HeaderName::from_static(headers::CSRF_HEADER_NAME);

        if !map.contains_key(&csrf_header) {
            if let Some(value) = self.csrf_token.as_deref().and_then(|t| HeaderValue::from_str(t).ok()) {
                map.insert(csrf_header, value);
            }
        }
        map
    }

    pub async fn invalidate_access_token(&self) {
        self.tokens.invalidate_access_token().await
    }

    /// Drops in-memory tokens; injected values cannot be un-set from here
    pub async fn clear(&self) -> anyhow::Result<()> {
        self.tokens.clear().await
    }

    pub async fn token_info(&self) -> TokenInfo {
        self.tokens.token_info().await
    }

    pub fn auth_required(&self) -> AuthRequired {
        AuthRequired::for_injected_credentials(self.environment())
    }
}
