//! Authenticated client for the Finance OS tables API

use super::constants::{self, timeouts};
use super::error::{ApiFailure, ApiResult};
use super::models::{AggregateQuery, Environment, Filter, Metric};
use super::pagination::PageSource;
use crate::auth::{Auth, Authenticator};
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct ApiClient {
    auth: Auth,
    http: reqwest::Client,
    base_url: String,
    schema_cache: RwLock<HashMap<String, Value>>,
}

impl ApiClient {
    pub fn new(auth: Auth) -> anyhow::Result<Self> {
        Self::with_timeout(auth, timeouts::DATA)
    }

    /// Client with a custom per-request timeout
    pub fn with_timeout(auth: Auth, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .connect_timeout(timeouts::CONNECT)
            .user_agent(constants::USER_AGENT)
            .build()?;

        let base_url = auth.environment().base_url.clone();
        Ok(Self {
            auth,
            http,
            base_url,
            schema_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn environment(&self) -> &Environment {
        self.auth.environment()
    }

    /// Drop tokens, the stored session and cached schemas
    pub async fn invalidate(&self) -> anyhow::Result<()> {
        self.schema_cache.write().await.clear();
        self.auth.clear().await
    }

    /// Send one request with the current headers. Any status >= 400, 401
    /// included, comes back as `ApiFailure::Status`.
    async fn send(&self, method: Method, endpoint: &str, body: Option<&Value>) -> ApiResult<Value> {
        let url = constants::api_url(&self.base_url, endpoint);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, &url).headers(self.auth.headers().await);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiFailure::from_reqwest(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| ApiFailure::from_reqwest(&e))?;

        if status.is_client_error() || status.is_server_error() {
            debug!("{} returned {}", url, status);
            return Err(ApiFailure::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| ApiFailure::InvalidResponse(e.to_string()))
    }

    /// Authenticated request: checks the session and token first, and turns a
    /// 401 into a cleared session plus `AuthRequired`.
    async fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> ApiResult<Value> {
        if !self.auth.is_authenticated().await {
            return Err(ApiFailure::AuthRequired(self.auth.auth_required()));
        }

        if !self.auth.ensure_valid_token().await {
            return Err(ApiFailure::AuthRequired(self.auth.auth_required()));
        }

        match self.send(method, endpoint, body).await {
            Err(ApiFailure::Status { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                warn!("Session for {} was rejected, clearing it", self.environment().name);
                if let Err(e) = self.invalidate().await {
                    warn!("Failed to clear stored session: {:#}", e);
                }
                Err(ApiFailure::AuthRequired(self.auth.auth_required()))
            }
            other => other,
        }
    }

    pub async fn list_tables(&self) -> ApiResult<Value> {
        let result = self.request(Method::GET, &constants::tables_endpoint(), None).await?;
        Ok(unwrap_data(result))
    }

    /// Table schema, cached for the life of the client
    pub async fn describe_table(&self, table_id: &str) -> ApiResult<Value> {
        if let Some(schema) = self.schema_cache.read().await.get(table_id) {
            debug!("Schema cache hit for table {}", table_id);
            return Ok(schema.clone());
        }

        let result = self.request(Method::GET, &constants::table_endpoint(table_id), None).await?;
        let schema = unwrap_data(result);
        self.schema_cache
            .write()
            .await
            .insert(table_id.to_string(), schema.clone());
        Ok(schema)
    }

    /// Distinct values of a field, truncated to `limit`
    pub async fn distinct_values(&self, table_id: &str, field: &str, limit: usize) -> ApiResult<Vec<Value>> {
        let endpoint = constants::distinct_values_endpoint(table_id, field);
        let result = self.request(Method::GET, &endpoint, None).await?;

        let mut values = match unwrap_data(result).get("values") {
            Some(Value::Array(values)) => values.clone(),
            _ => Vec::new(),
        };
        values.truncate(limit);
        Ok(values)
    }

    /// One page of rows. `limit` is capped at the server maximum.
    pub async fn fetch_rows(&self, table_id: &str, filters: &[Filter], limit: usize, offset: usize) -> ApiResult<Vec<Value>> {
        let body = data_request_body(filters, limit, offset);
        let result = self
            .request(Method::POST, &constants::table_data_endpoint(table_id), Some(&body))
            .await?;
        rows_from(result)
    }

    pub async fn aggregate(
        &self,
        table_id: &str,
        dimensions: &[String],
        metrics: &[Metric],
        filters: &[Filter],
    ) -> ApiResult<Value> {
        let body = aggregate_request_body(dimensions, metrics, filters);
        let result = self
            .request(Method::POST, &constants::table_aggregate_endpoint(table_id), Some(&body))
            .await?;
        Ok(unwrap_data(result))
    }

    /// Run several aggregate queries at once. Each result stands alone; one
    /// failure does not affect the others.
    pub async fn aggregate_many(&self, queries: &[AggregateQuery]) -> Vec<(String, ApiResult<Value>)> {
        let futures = queries.iter().map(|query| async move {
            let result = self
                .aggregate(&query.table_id, &query.dimensions, &query.metrics, &query.filters)
                .await;

            match &result {
                Ok(data) => info!(
                    "Aggregate '{}' returned {} rows",
                    query.label,
                    data.as_array().map_or(0, Vec::len)
                ),
                Err(e) => warn!("Aggregate '{}' failed: {}", query.label, e),
            }

            (query.label.clone(), result)
        });

        join_all(futures).await
    }
}

#[async_trait]
impl PageSource for ApiClient {
    async fn fetch_page(&self, table_id: &str, filters: &[Filter], limit: usize, offset: usize) -> ApiResult<Vec<Value>> {
        let body = data_request_body(filters, limit, offset);
        let result = self
            .send(Method::POST, &constants::table_data_endpoint(table_id), Some(&body))
            .await?;
        rows_from(result)
    }

    async fn ensure_token(&self) -> bool {
        self.auth.ensure_valid_token().await
    }

    async fn force_refresh(&self) -> bool {
        self.auth.invalidate_access_token().await;
        self.auth.ensure_valid_token().await
    }
}

/// Finance OS wraps payloads in `{"success": ..., "data": ...}`
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

fn rows_from(value: Value) -> ApiResult<Vec<Value>> {
    match unwrap_data(value) {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        other => Err(ApiFailure::InvalidResponse(format!(
            "expected a list of rows, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn data_request_body(filters: &[Filter], limit: usize, offset: usize) -> Value {
    json!({
        "filters": if filters.is_empty() { Value::Null } else { json!(filters) },
        "limit": limit.min(constants::MAX_PAGE_SIZE),
        "offset": offset,
        "get_all_versions": false,
    })
}

pub(crate) fn aggregate_request_body(dimensions: &[String], metrics: &[Metric], filters: &[Filter]) -> Value {
    let mut body = json!({
        "dimensions": dimensions,
        "metrics": metrics,
    });
    if !filters.is_empty() {
        body["filters"] = json!(filters);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_body_caps_limit() {
        let body = data_request_body(&[], 5000, 1000);
        assert_eq!(body["limit"], 500);
        assert_eq!(body["offset"], 1000);
        assert!(body["filters"].is_null());
        assert_eq!(body["get_all_versions"], false);
    }

    #[test]
    fn test_data_body_passes_filters_through() {
        let filters = vec![Filter::include("Scenario", ["Actuals"])];
        let body = data_request_body(&filters, 100, 0);
        assert_eq!(
            body["filters"],
            json!([{"name": "Scenario", "values": ["Actuals"], "is_excluded": false}])
        );
    }

    #[test]
    fn test_aggregate_body_omits_empty_filters() {
        let body = aggregate_request_body(&["Account".to_string()], &[Metric::sum("Amount")], &[]);
        assert!(body.get("filters").is_none());
        assert_eq!(body["metrics"], json!([{"field": "Amount", "agg": "SUM"}]));
    }

    #[test]
    fn test_rows_from_envelope() {
        let rows = rows_from(json!({"success": true, "data": [{"a": 1}, {"a": 2}]})).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows_from(json!({"data": null})).unwrap().is_empty());
        assert!(matches!(
            rows_from(json!({"data": {"a": 1}})),
            Err(ApiFailure::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_unwrap_data_leaves_bare_payloads() {
        assert_eq!(unwrap_data(json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_data(json!({"data": {"values": [1]}})), json!({"values": [1]}));
    }
}
