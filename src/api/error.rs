//! Typed failures returned by the API client

use super::models::AuthRequired;
use serde_json::{Value, json};
use thiserror::Error;

/// Expected failures of an API call. These are values, not panics.
#[derive(Debug, Clone, Error)]
pub enum ApiFailure {
    #[error("authentication required for environment '{}'", .0.environment)]
    AuthRequired(AuthRequired),

    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type ApiResult<T> = Result<T, ApiFailure>;

impl ApiFailure {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiFailure::Timeout
        } else if error.is_decode() {
            ApiFailure::InvalidResponse(error.to_string())
        } else if let Some(status) = error.status() {
            ApiFailure::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            ApiFailure::Network(error.to_string())
        }
    }

    /// HTTP status, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiFailure::Status { status, .. } => Some(*status),
            ApiFailure::AuthRequired(_) => Some(401),
            _ => None,
        }
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, ApiFailure::AuthRequired(_))
    }

    /// JSON shape used by `--json` output
    pub fn to_json(&self) -> Value {
        match self {
            ApiFailure::AuthRequired(payload) => {
                serde_json::to_value(payload).unwrap_or_else(|_| json!({"error": "authentication_required"}))
            }
            ApiFailure::Status { status, body } => json!({
                "error": format!("API error: {}", status),
                "details": body,
            }),
            ApiFailure::Timeout => json!({"error": "Request timed out"}),
            ApiFailure::Network(message) => json!({"error": format!("Request failed: {}", message)}),
            ApiFailure::InvalidResponse(message) => json!({"error": format!("Invalid response: {}", message)}),
        }
    }
}
