//! JWT expiry decoding and bearer token bookkeeping
//!
//! Tokens are never verified here, only inspected for their `exp` claim so the
//! manager can decide when to refresh.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use std::fmt;

/// Extract the `exp` claim (seconds since the epoch) from a JWT.
///
/// Anything that is not a three-segment token with a base64url JSON payload
/// carrying a numeric `exp` yields 0, which always reads as expired.
pub fn decode_expiry(token: &str) -> i64 {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return 0;
    }

    let payload = parts[1].trim_end_matches('=');
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
        return 0;
    };

    let Ok(claims) = serde_json::from_slice::<Value>(&bytes) else {
        return 0;
    };

    match claims.get("exp") {
        Some(exp) => exp
            .as_i64()
            .or_else(|| exp.as_f64().map(|secs| secs as i64))
            .unwrap_or(0),
        None => 0,
    }
}

/// A bearer token and its decoded expiry
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    value: String,
    expires_at: i64,
}

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at = decode_expiry(&value);
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Valid for at least `buffer_secs` more seconds
    pub fn is_fresh(&self, now: i64, buffer_secs: i64) -> bool {
        self.expires_at.saturating_sub(buffer_secs) > now
    }

    pub fn seconds_left(&self, now: i64) -> i64 {
        self.expires_at.saturating_sub(now).max(0)
    }

    /// Force the token stale while keeping its value for request headers
    pub fn expire(&mut self) {
        self.expires_at = 0;
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_decode_expiry() {
        assert_eq!(decode_expiry(&token_with_payload(r#"{"exp":1700000000}"#)), 1_700_000_000);
        assert_eq!(decode_expiry(&token_with_payload(r#"{"exp":1700000000.75}"#)), 1_700_000_000);
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":42}"#);
        assert!(payload.ends_with('='));
        assert_eq!(decode_expiry(&format!("h.{}.s", payload)), 42);
    }

    #[test]
    fn test_malformed_tokens_decode_to_zero() {
        assert_eq!(decode_expiry(""), 0);
        assert_eq!(decode_expiry("not-a-jwt"), 0);
        assert_eq!(decode_expiry("a.b"), 0);
        assert_eq!(decode_expiry("a.b.c.d"), 0);
        assert_eq!(decode_expiry("a.!!!.c"), 0);
        assert_eq!(decode_expiry(&token_with_payload("not json")), 0);
        assert_eq!(decode_expiry(&token_with_payload(r#"{"sub":"user"}"#)), 0);
        assert_eq!(decode_expiry(&token_with_payload(r#"{"exp":"tomorrow"}"#)), 0);
        assert_eq!(decode_expiry(&token_with_payload("[1,2,3]")), 0);
    }

    #[test]
    fn test_freshness_respects_buffer() {
        let token = BearerToken::new(token_with_payload(r#"{"exp":1000}"#));
        assert!(token.is_fresh(900, 30));
        assert!(!token.is_fresh(970, 30));
        assert!(!token.is_fresh(990, 30));
        assert_eq!(token.seconds_left(990), 10);
        assert_eq!(token.seconds_left(2000), 0);
    }

    #[test]
    fn test_extreme_expiry_does_not_overflow() {
        let past = BearerToken::new(token_with_payload(r#"{"exp":-1e300}"#));
        assert_eq!(past.expires_at(), i64::MIN);
        assert_eq!(past.seconds_left(1_700_000_000), 0);
        assert!(!past.is_fresh(1_700_000_000, 30));

        let future = BearerToken::new(token_with_payload(r#"{"exp":1e300}"#));
        assert_eq!(future.seconds_left(-1_700_000_000), i64::MAX);
    }

    #[test]
    fn test_expire_keeps_value() {
        let mut token = BearerToken::new(token_with_payload(r#"{"exp":1000}"#));
        token.expire();
        assert!(!token.is_fresh(0, 0));
        assert!(token.value().ends_with(".signature"));
        assert!(!format!("{:?}", token).contains("signature"));
    }
}
