//! Data models shared by the auth layer, the API client and the CLI

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A named Finance OS deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub base_url: String,
    pub auth_url: String,
    pub display_name: String,
}

impl Environment {
    pub fn new(name: &str, base_url: &str, auth_url: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            auth_url: auth_url.to_string(),
            display_name: display_name.to_string(),
        }
    }

    /// Where a user goes to sign in and obtain session cookies
    pub fn login_url(&self) -> &str {
        &self.auth_url
    }
}

/// Browser session cookies for one environment
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub session_id: String,
    pub csrf_token: String,
}

impl SessionCredential {
    pub fn new(session_id: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            csrf_token: csrf_token.into(),
        }
    }

    /// Both cookies must be non-empty to be usable
    pub fn is_complete(&self) -> bool {
        !self.session_id.is_empty() && !self.csrf_token.is_empty()
    }

    /// Value for the `Cookie` header on token endpoints
    pub fn cookie_header(&self) -> String {
        format!("csrftoken={}; sessionid={}", self.csrf_token, self.session_id)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("session_id", &"***")
            .field("csrf_token", &"***")
            .finish()
    }
}

/// Row filter passed through to the data and aggregate endpoints as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub values: Vec<Value>,
    pub is_excluded: bool,
}

impl Filter {
    pub fn include<I, V>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            is_excluded: false,
        }
    }

    pub fn exclude<I, V>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            is_excluded: true,
            ..Self::include(name, values)
        }
    }

    /// Parse a `name=v1,v2` command-line argument
    pub fn parse(arg: &str, is_excluded: bool) -> anyhow::Result<Self> {
        let (name, raw_values) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Filter '{}' must look like name=value[,value...]", arg))?;

        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Filter '{}' has an empty field name", arg);
        }

        let values: Vec<Value> = raw_values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Value::String(v.to_string()))
            .collect();

        if values.is_empty() {
            anyhow::bail!("Filter '{}' has no values", arg);
        }

        Ok(Self {
            name: name.to_string(),
            values,
            is_excluded,
        })
    }
}

/// One aggregate measure, e.g. `{"field": "Amount", "agg": "SUM"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub field: String,
    pub agg: String,
}

impl Metric {
    pub fn sum(field: &str) -> Self {
        Self {
            field: field.to_string(),
            agg: "SUM".to_string(),
        }
    }
}

/// A labelled aggregate request for concurrent fan-out
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub label: String,
    pub table_id: String,
    pub dimensions: Vec<String>,
    pub metrics: Vec<Metric>,
    pub filters: Vec<Filter>,
}

/// Structured "please log in" payload returned instead of an error string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequired {
    pub error: String,
    pub message: String,
    pub environment: String,
    pub login_url: String,
    pub instructions: Vec<String>,
}

impl AuthRequired {
    /// Browser login flow for a keyring-backed session
    pub fn for_browser_login(env: &Environment) -> Self {
        let login_url = env.login_url().to_string();
        Self {
            error: "authentication_required".to_string(),
            message: format!("Please authenticate with Finance OS ({}) to continue.", env.display_name),
            environment: env.name.clone(),
            instructions: vec![
                format!("1. Open {} in browser", login_url),
                "2. Sign in with your organization's SSO".to_string(),
                "3. After login, you'll be redirected to the Finance OS app".to_string(),
                format!("4. Run `financeos-cli auth --env {}` to store the session cookies (sessionid, csrftoken)", env.name),
                "5. These cookies are persistent - you won't need to re-authenticate frequently".to_string(),
            ],
            login_url,
        }
    }

    /// Injected credentials are missing or rejected
    pub fn for_injected_credentials(env: &Environment) -> Self {
        Self {
            error: "authentication_required".to_string(),
            message: format!(
                "Injected credentials for Finance OS ({}) are missing or no longer valid.",
                env.display_name
            ),
            environment: env.name.clone(),
            login_url: env.login_url().to_string(),
            instructions: vec![
                "1. Set FINOS_SESSION_ID and FINOS_CSRF_TOKEN to fresh session cookie values".to_string(),
                "2. Or set FINOS_JWT_TOKEN to a valid access token".to_string(),
                "3. Unset all three to fall back to the stored session".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parse() {
        let filter = Filter::parse("Scenario=Actuals, Budget", false).unwrap();
        assert_eq!(filter.name, "Scenario");
        assert_eq!(filter.values, vec![Value::from("Actuals"), Value::from("Budget")]);
        assert!(!filter.is_excluded);

        assert!(Filter::parse("Scenario", false).is_err());
        assert!(Filter::parse("=Actuals", false).is_err());
        assert!(Filter::parse("Scenario=", true).is_err());
    }

    #[test]
    fn test_filter_serializes_verbatim() {
        let filter = Filter::exclude("Account", ["Cash"]);
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Account", "values": ["Cash"], "is_excluded": true})
        );
    }

    #[test]
    fn test_session_debug_redacts() {
        let session = SessionCredential::new("abc123", "tok456");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("abc123"));
        assert!(!debug.contains("tok456"));
        assert_eq!(session.cookie_header(), "csrftoken=tok456; sessionid=abc123");
    }

    #[test]
    fn test_auth_required_payload() {
        let env = Environment::new(
            "app",
            "https://app.datarails.com",
            "https://auth.datarails.com",
            "Production",
        );
        let payload = AuthRequired::for_browser_login(&env);
        assert_eq!(payload.error, "authentication_required");
        assert_eq!(payload.login_url, "https://auth.datarails.com");
        assert_eq!(payload.instructions.len(), 5);
        assert!(payload.instructions[0].contains("https://auth.datarails.com"));
    }
}
