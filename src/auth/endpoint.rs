//! Token endpoint seam: session cookies in, bearer tokens out

use crate::api::constants::{self, headers, timeouts};
use crate::api::models::SessionCredential;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};

/// Access and refresh token pair issued for a session
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and refreshes bearer tokens for one environment
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange session cookies for a fresh access/refresh pair
    async fn issue(&self, session: &SessionCredential) -> anyhow::Result<TokenPair>;

    /// Exchange a refresh token for a new access token
    async fn refresh(&self, session: Option<&SessionCredential>, refresh_token: &str) -> anyhow::Result<String>;
}

/// Finance OS `/jwt/api/token/` endpoints over HTTP
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenEndpoint {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeouts::TOKEN)
            .connect_timeout(timeouts::CONNECT)
            .user_agent(constants::USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    fn post(&self, url: &str, session: Option<&SessionCredential>) -> reqwest::RequestBuilder {
        let mut request = self.http.post(url).header(CONTENT_TYPE, headers::CONTENT_TYPE_JSON);
        if let Some(session) = session {
            request = request
                .header(COOKIE, session.cookie_header())
                .header(headers::CSRF_TOKEN, &session.csrf_token);
        }
        request
    }

    async fn read_json(response: reqwest::Response) -> anyhow::Result<serde_json::Value> {
        let status = response.status();
        log::debug!("Token request status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Token request failed ({}): {}", status, error_text);
        }

        Ok(response.json().await?)
    }
}

fn token_field(data: &serde_json::Value, field: &str) -> anyhow::Result<String> {
    data.get(field)
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("No {} token in response", field))
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn issue(&self, session: &SessionCredential) -> anyhow::Result<TokenPair> {
        let url = constants::token_url(&self.base_url);
        log::info!("Requesting token pair from {}", url);

        let response = self.post(&url, Some(session)).send().await?;
        let data = Self::read_json(response).await?;

        Ok(TokenPair {
            access: token_field(&data, "access")?,
            refresh: token_field(&data, "refresh")?,
        })
    }

    async fn refresh(&self, session: Option<&SessionCredential>, refresh_token: &str) -> anyhow::Result<String> {
        let url = constants::token_refresh_url(&self.base_url);
        log::info!("Refreshing access token via {}", url);

        let response = self
            .post(&url, session)
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await?;
        let data = Self::read_json(response).await?;

        token_field(&data, "access")
    }
}
