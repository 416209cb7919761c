//! Session credential storage
//!
//! Sessions live in the OS keyring, one entry per environment. When the keyring
//! is missing, failing or hanging, they go to a JSON fallback file in the home
//! directory instead. Every keyring call is bounded by a timeout.

use crate::api::models::SessionCredential;
use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

pub const KEYRING_SERVICE: &str = "financeos-cli";
pub const KEYRING_TIMEOUT: Duration = Duration::from_secs(5);
pub const FALLBACK_FILE: &str = ".financeos-auth.json";

pub fn keyring_account(env: &str) -> String {
    format!("session_{}", env)
}

/// Errors from the credential store
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    /// Keyring error.
    #[error("keyring error: {0}")]
    Keyring(String),

    /// The keyring did not answer in time.
    #[error("keyring did not respond within {0:?}")]
    TimedOut(Duration),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Fallback file error.
    #[error("fallback file error: {0}")]
    Io(#[from] std::io::Error),
}

/// A secret store addressed by account name
pub trait SecretBackend: Send + Sync + 'static {
    /// `Ok(None)` when no entry exists
    fn get(&self, account: &str) -> Result<Option<String>, CredentialStoreError>;
    fn set(&self, account: &str, secret: &str) -> Result<(), CredentialStoreError>;
    /// Deleting a missing entry is not an error
    fn delete(&self, account: &str) -> Result<(), CredentialStoreError>;
}

/// The platform keyring (Keychain, Credential Manager, Secret Service)
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, CredentialStoreError> {
        keyring::Entry::new(&self.service, account).map_err(|e| CredentialStoreError::Keyring(e.to_string()))
    }
}

impl SecretBackend for KeyringBackend {
    fn get(&self, account: &str) -> Result<Option<String>, CredentialStoreError> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialStoreError::Keyring(e.to_string())),
        }
    }

    fn set(&self, account: &str, secret: &str) -> Result<(), CredentialStoreError> {
        self.entry(account)?
            .set_password(secret)
            .map_err(|e| CredentialStoreError::Keyring(e.to_string()))
    }

    fn delete(&self, account: &str) -> Result<(), CredentialStoreError> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialStoreError::Keyring(e.to_string())),
        }
    }
}

/// Run a backend call on a detached thread and wait at most `timeout`.
///
/// A call that never returns leaves its thread behind; the caller moves on.
fn call_with_timeout<T, F>(
    backend: &Arc<dyn SecretBackend>,
    timeout: Duration,
    call: F,
) -> Result<T, CredentialStoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn SecretBackend) -> Result<T, CredentialStoreError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let backend = Arc::clone(backend);

    std::thread::Builder::new()
        .name("keyring".to_string())
        .spawn(move || {
            let _ = tx.send(call(backend.as_ref()));
        })
        .map_err(CredentialStoreError::Io)?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(CredentialStoreError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(CredentialStoreError::Keyring("keyring worker exited without a result".to_string()))
        }
    }
}

/// Where a session ended up after `save`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLocation {
    Keyring,
    FallbackFile,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyringRecord {
    session_id: String,
    csrf_token: String,
    env: String,
    saved_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FallbackRecord {
    session_id: String,
    csrf_token: String,
    #[serde(default)]
    saved_at: Option<String>,
}

type FallbackMap = serde_json::Map<String, serde_json::Value>;

/// Per-environment session storage with keyring-first, file-second semantics
pub struct CredentialStore {
    backend: Option<Arc<dyn SecretBackend>>,
    fallback_path: PathBuf,
    timeout: Duration,
    /// Set after a timeout so later calls skip a keyring that is known to hang
    stalled: AtomicBool,
}

impl CredentialStore {
    pub fn new(backend: Option<Arc<dyn SecretBackend>>, fallback_path: PathBuf) -> Self {
        Self {
            backend,
            fallback_path,
            timeout: KEYRING_TIMEOUT,
            stalled: AtomicBool::new(false),
        }
    }

    /// The platform keyring with `~/.financeos-auth.json` as fallback
    pub fn system() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        let backend: Arc<dyn SecretBackend> = Arc::new(KeyringBackend::new(KEYRING_SERVICE));
        Ok(Self::new(Some(backend), home.join(FALLBACK_FILE)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fallback_path(&self) -> &Path {
        &self.fallback_path
    }

    fn keyring_call<T, F>(&self, call: F) -> Result<T, CredentialStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SecretBackend) -> Result<T, CredentialStoreError> + Send + 'static,
    {
        let Some(backend) = &self.backend else {
            return Err(CredentialStoreError::Keyring("no keyring backend".to_string()));
        };

        if self.stalled.load(Ordering::Relaxed) {
            return Err(CredentialStoreError::TimedOut(self.timeout));
        }

        let result = call_with_timeout(backend, self.timeout, call);
        if let Err(CredentialStoreError::TimedOut(_)) = &result {
            warn!("Keyring timed out after {:?}, using fallback file for this run", self.timeout);
            self.stalled.store(true, Ordering::Relaxed);
        }
        result
    }

    /// Persist a session. Keyring first, fallback file if that fails.
    pub fn save(&self, env: &str, session: &SessionCredential) -> Result<StorageLocation, CredentialStoreError> {
        let saved_at = chrono::Utc::now().to_rfc3339();

        let record = KeyringRecord {
            session_id: session.session_id.clone(),
            csrf_token: session.csrf_token.clone(),
            env: env.to_string(),
            saved_at: saved_at.clone(),
        };
        let secret = serde_json::to_string(&record).map_err(|e| CredentialStoreError::Serialization(e.to_string()))?;
        let account = keyring_account(env);

        match self.keyring_call(move |backend| backend.set(&account, &secret)) {
            Ok(()) => {
                info!("Stored session for environment {} in keyring", env);
                return Ok(StorageLocation::Keyring);
            }
            Err(e) => warn!("Keyring save failed for {}: {}", env, e),
        }

        let mut entries = self.read_fallback();
        let record = FallbackRecord {
            session_id: session.session_id.clone(),
            csrf_token: session.csrf_token.clone(),
            saved_at: Some(saved_at),
        };
        entries.insert(
            env.to_string(),
            serde_json::to_value(record).map_err(|e| CredentialStoreError::Serialization(e.to_string()))?,
        );
        self.write_fallback(&entries)?;

        info!("Stored session for environment {} in {:?}", env, self.fallback_path);
        Ok(StorageLocation::FallbackFile)
    }

    /// Load a session. A keyring miss, error or timeout falls through to the file.
    pub fn load(&self, env: &str) -> Option<SessionCredential> {
        let account = keyring_account(env);
        match self.keyring_call(move |backend| backend.get(&account)) {
            Ok(Some(secret)) => match serde_json::from_str::<KeyringRecord>(&secret) {
                Ok(record) => {
                    let session = SessionCredential::new(record.session_id, record.csrf_token);
                    if session.is_complete() {
                        debug!("Loaded session for {} from keyring", env);
                        return Some(session);
                    }
                }
                Err(e) => warn!("Ignoring unreadable keyring entry for {}: {}", env, e),
            },
            Ok(None) => debug!("No keyring entry for {}", env),
            Err(e) => debug!("Keyring load failed for {}: {}", env, e),
        }

        let entries = self.read_fallback();
        let record: FallbackRecord = serde_json::from_value(entries.get(env)?.clone()).ok()?;
        let session = SessionCredential::new(record.session_id, record.csrf_token);

        if session.is_complete() {
            debug!("Loaded session for {} from fallback file", env);
            Some(session)
        } else {
            None
        }
    }

    /// Remove a session from both the keyring and the fallback file
    pub fn clear(&self, env: &str) -> Result<(), CredentialStoreError> {
        let account = keyring_account(env);
        if let Err(e) = self.keyring_call(move |backend| backend.delete(&account)) {
            debug!("Keyring delete skipped for {}: {}", env, e);
        }

        let mut entries = self.read_fallback();
        if entries.remove(env).is_some() {
            self.write_fallback(&entries)?;
        }

        info!("Cleared stored session for environment {}", env);
        Ok(())
    }

    pub fn has_session(&self, env: &str) -> bool {
        self.load(env).is_some()
    }

    /// Session presence per environment, in the order given
    pub fn list_authenticated(&self, envs: &[String]) -> Vec<(String, bool)> {
        envs.iter().map(|env| (env.clone(), self.has_session(env))).collect()
    }

    /// Whether the keyring answers a lookup within the timeout
    pub fn keyring_available(&self) -> bool {
        let account = keyring_account("__availability__");
        self.keyring_call(move |backend| backend.get(&account)).is_ok()
    }

    fn read_fallback(&self) -> FallbackMap {
        let contents = match std::fs::read_to_string(&self.fallback_path) {
            Ok(contents) => contents,
            Err(_) => return FallbackMap::new(),
        };

        match serde_json::from_str::<FallbackMap>(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable fallback file {:?}: {}", self.fallback_path, e);
                FallbackMap::new()
            }
        }
    }

    /// Write tmp + rename, owner-only permissions on unix
    fn write_fallback(&self, entries: &FallbackMap) -> Result<(), CredentialStoreError> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| CredentialStoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.fallback_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_name = format!(
            "{}.{}.tmp",
            self.fallback_path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
        );
        let tmp_path = self.fallback_path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp_path, &self.fallback_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_keyring_store_is_persistent() {
        // keyutils alone forgets entries at logout; the secret service keeps them
        let manifest = include_str!("../../Cargo.toml");
        let keyring = manifest.lines().find(|line| line.starts_with("keyring")).unwrap();
        assert!(keyring.contains("linux-native-sync-persistent"));
        assert!(keyring.contains("crypto-rust"));
    }

    struct FailingBackend;

    impl SecretBackend for FailingBackend {
        fn get(&self, _account: &str) -> Result<Option<String>, CredentialStoreError> {
            Err(CredentialStoreError::Keyring("locked".to_string()))
        }
        fn set(&self, _account: &str, _secret: &str) -> Result<(), CredentialStoreError> {
            Err(CredentialStoreError::Keyring("locked".to_string()))
        }
        fn delete(&self, _account: &str) -> Result<(), CredentialStoreError> {
            Err(CredentialStoreError::Keyring("locked".to_string()))
        }
    }

    #[test]
    fn test_keyring_account_naming() {
        assert_eq!(keyring_account("app"), "session_app");
    }

    #[test]
    fn test_failing_keyring_uses_fallback_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FALLBACK_FILE);
        let store = CredentialStore::new(Some(Arc::new(FailingBackend)), path.clone());

        let location = store.save("dev", &SessionCredential::new("sid", "csrf")).unwrap();
        assert_eq!(location, StorageLocation::FallbackFile);
        assert!(path.exists());
        assert_eq!(store.load("dev"), Some(SessionCredential::new("sid", "csrf")));
        assert!(!store.keyring_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_fallback_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FALLBACK_FILE);
        let store = CredentialStore::new(None, path.clone());
        store.save("dev", &SessionCredential::new("sid", "csrf")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_fallback_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FALLBACK_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let store = CredentialStore::new(None, path);
        assert!(store.load("dev").is_none());
    }

    #[test]
    fn test_incomplete_fallback_entry_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FALLBACK_FILE);
        std::fs::write(&path, r#"{"dev": {"session_id": "sid", "csrf_token": ""}}"#).unwrap();

        let store = CredentialStore::new(None, path);
        assert!(store.load("dev").is_none());
    }
}
