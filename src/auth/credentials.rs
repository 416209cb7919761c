use crate::api::models::SessionCredential;
use log::info;

pub const SESSION_ID_VAR: &str = "FINOS_SESSION_ID";
pub const CSRF_TOKEN_VAR: &str = "FINOS_CSRF_TOKEN";
pub const JWT_TOKEN_VAR: &str = "FINOS_JWT_TOKEN";

/// Credentials handed to the process directly, typically in CI
#[derive(Debug, Clone, Default)]
pub struct InjectedCredentials {
    pub session: Option<SessionCredential>,
    pub jwt_token: Option<String>,
    /// `FINOS_CSRF_TOKEN`, kept even without a session id so it still
    /// reaches the `X-CSRFToken` header next to a bearer token
    pub csrf_token: Option<String>,
}

impl InjectedCredentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let csrf_token = read(CSRF_TOKEN_VAR);
        let session = match (read(SESSION_ID_VAR), &csrf_token) {
            (Some(session_id), Some(csrf)) => Some(SessionCredential::new(session_id, csrf.clone())),
            _ => None,
        };
        let jwt_token = read(JWT_TOKEN_VAR);

        let injected = Self {
            session,
            jwt_token,
            csrf_token,
        };
        if injected.is_configured() {
            info!("Using credentials from environment variables");
        }
        injected
    }

    /// A complete session pair or a bearer token is present
    pub fn is_configured(&self) -> bool {
        self.session.is_some() || self.jwt_token.is_some()
    }
}
