//! Endpoint paths, headers and timeouts for the Finance OS REST surface

use std::time::Duration;

/// Prefix for every data endpoint
pub const API_BASE_PATH: &str = "/finance-os/api";

/// Exchanges session cookies for an access/refresh token pair
pub const TOKEN_PATH: &str = "/jwt/api/token/";

/// Exchanges a refresh token for a new access token
pub const TOKEN_REFRESH_PATH: &str = "/jwt/api/token/refresh/";

/// Largest page the data endpoint will return
pub const MAX_PAGE_SIZE: usize = 500;

pub const USER_AGENT: &str = "financeos-cli/0.1";

/// Standard headers for Finance OS requests
pub mod headers {
    /// Content type for JSON requests
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    /// Anti-forgery header expected alongside the session cookie and bearer token
    pub const CSRF_TOKEN: &str = "X-CSRFToken";

    /// `CSRF_TOKEN` in the lowercase form `HeaderName::from_static` needs
    pub const CSRF_HEADER_NAME: &str = "x-csrftoken";
}

/// Request timeouts. Token calls are short, bulk data calls get more room.
pub mod timeouts {
    use super::Duration;

    pub const TOKEN: Duration = Duration::from_secs(30);
    pub const DATA: Duration = Duration::from_secs(60);
    pub const CONNECT: Duration = Duration::from_secs(10);
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Build a full data API URL from an endpoint path
pub fn api_url(base_url: &str, endpoint: &str) -> String {
    format!("{}{}{}", trim_base(base_url), API_BASE_PATH, endpoint)
}

pub fn token_url(base_url: &str) -> String {
    format!("{}{}", trim_base(base_url), TOKEN_PATH)
}

pub fn token_refresh_url(base_url: &str) -> String {
    format!("{}{}", trim_base(base_url), TOKEN_REFRESH_PATH)
}

pub fn tables_endpoint() -> String {
    "/tables/v1/".to_string()
}

pub fn table_endpoint(table_id: &str) -> String {
    format!("/tables/v1/{}", table_id)
}

pub fn table_data_endpoint(table_id: &str) -> String {
    format!("/tables/v1/{}/data", table_id)
}

pub fn table_aggregate_endpoint(table_id: &str) -> String {
    format!("/tables/v1/{}/aggregate", table_id)
}

/// Field names may contain spaces or slashes, so they are percent-encoded
pub fn distinct_values_endpoint(table_id: &str, field: &str) -> String {
    format!(
        "/tables/v1/{}/fields/by-name/{}/distinct",
        table_id,
        urlencoding::encode(field)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_strips_trailing_slash() {
        assert_eq!(
            api_url("https://app.datarails.com/", &tables_endpoint()),
            "https://app.datarails.com/finance-os/api/tables/v1/"
        );
    }

    #[test]
    fn test_token_urls() {
        assert_eq!(token_url("https://dev.datarails.com"), "https://dev.datarails.com/jwt/api/token/");
        assert_eq!(
            token_refresh_url("https://dev.datarails.com"),
            "https://dev.datarails.com/jwt/api/token/refresh/"
        );
    }

    #[test]
    fn test_distinct_endpoint_encodes_field() {
        assert_eq!(
            distinct_values_endpoint("34298", "Cost Center"),
            "/tables/v1/34298/fields/by-name/Cost%20Center/distinct"
        );
    }
}
