//! Integration tests for the API client and token endpoint over real HTTP
//!
//! A small in-process HTTP/1.1 server answers with canned responses and
//! records every request it sees.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use financeos_cli::api::{ApiClient, ApiFailure, Environment, FetchConfig, SessionCredential, StopReason, fetch_all};
use financeos_cli::auth::{Auth, Authenticator, EnvAuth, HttpTokenEndpoint, InjectedCredentials, TokenEndpoint, TokenManager};
use financeos_cli::config::CredentialStore;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

enum Reply {
    Json(u16, Value),
    Text(u16, String),
    /// Accept the request and never answer
    Stall,
}

type Route = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    async fn start<F>(route: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route: Route = Arc::new(route);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (route, log) = (Arc::clone(&route), Arc::clone(&log));
                tokio::spawn(async move {
                    let _ = serve(stream, route, log).await;
                });
            }
        });

        Self { base_url, requests }
    }

    fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

async fn serve(mut stream: TcpStream, route: Route, log: Arc<Mutex<Vec<Recorded>>>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (header_end + length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    let request = Recorded {
        method,
        path,
        headers,
        body,
    };
    let reply = route(&request);
    log.lock().unwrap().push(request);

    let (status, body) = match reply {
        Reply::Json(status, value) => (status, value.to_string()),
        Reply::Text(status, text) => (status, text),
        Reply::Stall => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }
    };

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn jwt_expiring_in(secs: i64) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, chrono::Utc::now().timestamp() + secs))
    )
}

fn token_pair() -> Reply {
    Reply::Json(
        200,
        json!({"access": jwt_expiring_in(3600), "refresh": jwt_expiring_in(86_400)}),
    )
}

fn environment(base_url: &str) -> Environment {
    Environment::new("dev", base_url, "https://dev-auth.datarails.com", "Development")
}

/// Client backed by a stored session in a temporary fallback file
fn session_client(base_url: &str, dir: &tempfile::TempDir) -> (ApiClient, Arc<CredentialStore>) {
    let store = Arc::new(CredentialStore::new(None, dir.path().join("auth.json")));
    store.save("dev", &SessionCredential::new("sid", "csrf")).unwrap();

    let endpoint: Arc<dyn TokenEndpoint> = Arc::new(HttpTokenEndpoint::new(base_url).unwrap());
    let auth = Auth::Session(TokenManager::load(environment(base_url), Arc::clone(&store), endpoint));
    (ApiClient::new(auth).unwrap(), store)
}

/// Client holding an injected access token, so no token endpoint is needed
fn jwt_auth(base_url: &str) -> Auth {
    let injected = InjectedCredentials {
        session: None,
        jwt_token: Some(jwt_expiring_in(3600)),
        csrf_token: None,
    };
    let endpoint: Arc<dyn TokenEndpoint> = Arc::new(HttpTokenEndpoint::new(base_url).unwrap());
    Auth::Env(EnvAuth::new(environment(base_url), endpoint, &injected))
}

#[tokio::test]
async fn test_session_is_exchanged_and_envelope_unwrapped() {
    let server = StubServer::start(|req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/jwt/api/token/") => token_pair(),
        ("GET", "/finance-os/api/tables/v1/") => {
            Reply::Json(200, json!({"success": true, "data": [{"id": 1, "name": "GL"}]}))
        }
        ("GET", "/finance-os/api/tables/v1/1") => {
            Reply::Json(200, json!({"success": true, "data": {"fields": ["Account"]}}))
        }
        _ => Reply::Text(404, "unexpected".to_string()),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let (client, _store) = session_client(&server.base_url, &dir);

    let tables = client.list_tables().await.unwrap();
    assert_eq!(tables, json!([{"id": 1, "name": "GL"}]));

    let schema = client.describe_table("1").await.unwrap();
    let cached = client.describe_table("1").await.unwrap();
    assert_eq!(schema, json!({"fields": ["Account"]}));
    assert_eq!(schema, cached);
    assert_eq!(server.requests_to("/finance-os/api/tables/v1/1").len(), 1);

    let token_requests = server.requests_to("/jwt/api/token/");
    assert_eq!(token_requests.len(), 1);
    assert_eq!(token_requests[0].headers["cookie"], "csrftoken=csrf; sessionid=sid");
    assert_eq!(token_requests[0].headers["x-csrftoken"], "csrf");

    let data_request = &server.requests_to("/finance-os/api/tables/v1/")[0];
    assert!(data_request.headers["authorization"].starts_with("Bearer "));
    assert_eq!(data_request.headers["x-csrftoken"], "csrf");
}

#[tokio::test]
async fn test_unauthorized_clears_tokens_and_stored_session() {
    let server = StubServer::start(|req| match req.path.as_str() {
        "/jwt/api/token/" => token_pair(),
        _ => Reply::Text(401, r#"{"detail": "Invalid token"}"#.to_string()),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let (client, store) = session_client(&server.base_url, &dir);

    match client.list_tables().await {
        Err(ApiFailure::AuthRequired(payload)) => {
            assert_eq!(payload.environment, "dev");
            assert_eq!(payload.login_url, "https://dev-auth.datarails.com");
        }
        other => panic!("expected AuthRequired, got {:?}", other),
    }

    assert!(store.load("dev").is_none());
    assert!(!client.auth().is_authenticated().await);
    assert!(!client.auth().token_info().await.has_access_token);
}

#[tokio::test]
async fn test_error_statuses_keep_body_and_session() {
    let server = StubServer::start(|req| match req.path.as_str() {
        "/jwt/api/token/" => token_pair(),
        "/finance-os/api/tables/v1/77" => Reply::Text(404, "no such table".to_string()),
        _ => Reply::Text(503, "maintenance".to_string()),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let (client, store) = session_client(&server.base_url, &dir);

    match client.describe_table("77").await {
        Err(ApiFailure::Status { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such table");
        }
        other => panic!("expected a 404 status, got {:?}", other),
    }

    let aggregate = client.aggregate("77", &["Account".to_string()], &[], &[]).await;
    assert!(matches!(aggregate, Err(ApiFailure::Status { status: 503, .. })));
    assert!(store.load("dev").is_some());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = ApiClient::new(jwt_auth(&base_url)).unwrap();
    assert!(matches!(client.list_tables().await, Err(ApiFailure::Network(_))));
}

#[tokio::test]
async fn test_stalled_response_times_out() {
    let server = StubServer::start(|_| Reply::Stall).await;
    let client = ApiClient::with_timeout(jwt_auth(&server.base_url), Duration::from_millis(300)).unwrap();

    assert!(matches!(client.list_tables().await, Err(ApiFailure::Timeout)));
}

#[tokio::test]
async fn test_pages_over_http_survive_a_rejected_token() {
    let rejected_once = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&rejected_once);

    let server = StubServer::start(move |req| match req.path.as_str() {
        "/jwt/api/token/" => token_pair(),
        "/jwt/api/token/refresh/" => Reply::Json(200, json!({"access": jwt_expiring_in(3600)})),
        "/finance-os/api/tables/v1/34298/data" => {
            let body: Value = serde_json::from_str(&req.body).unwrap_or(Value::Null);
            let offset = body["offset"].as_u64().unwrap_or(0) as usize;
            let limit = body["limit"].as_u64().unwrap_or(0) as usize;

            if offset == 500 && !flag.swap(true, Ordering::SeqCst) {
                return Reply::Text(401, "expired".to_string());
            }

            let end = (offset + limit).min(1200);
            let rows: Vec<Value> = (offset..end).map(|i| json!({"row": i})).collect();
            Reply::Json(200, json!({"success": true, "data": rows}))
        }
        _ => Reply::Text(404, "unexpected".to_string()),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let (client, store) = session_client(&server.base_url, &dir);

    let report = fetch_all(&client, "34298", &[], &FetchConfig::default()).await;

    assert_eq!(report.stop, StopReason::Complete);
    assert_eq!(report.rows.len(), 1200);
    assert_eq!(report.rows[1199], json!({"row": 1199}));
    assert!(rejected_once.load(Ordering::SeqCst));

    let data_requests = server.requests_to("/finance-os/api/tables/v1/34298/data");
    assert_eq!(data_requests.len(), 4);
    let first: Value = serde_json::from_str(&data_requests[0].body).unwrap();
    assert_eq!(first, json!({"filters": null, "limit": 500, "offset": 0, "get_all_versions": false}));

    let refreshes = server.requests_to("/jwt/api/token/refresh/");
    assert_eq!(refreshes.len(), 1);
    let refresh_body: Value = serde_json::from_str(&refreshes[0].body).unwrap();
    assert!(refresh_body["refresh"].as_str().is_some_and(|t| t.ends_with(".sig")));

    assert!(store.load("dev").is_some());
}

#[tokio::test]
async fn test_token_endpoint_reports_rejection() {
    let server = StubServer::start(|_| Reply::Text(403, "CSRF verification failed".to_string())).await;
    let endpoint = HttpTokenEndpoint::new(&server.base_url).unwrap();

    let err = endpoint
        .issue(&SessionCredential::new("sid", "csrf"))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("403"));
    assert!(message.contains("CSRF verification failed"));
}
