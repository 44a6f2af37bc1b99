//! Persisted failure bookkeeping and remembered token
//!
//! The store is a small key-value document:
//!
//! ```json
//! { "failures": 2, "lockout_until": 1700000300000, "auth_token": "..." }
//! ```
//!
//! Absent keys read as zero / none. Only the controller's serialized update
//! path touches the store, so implementations only need to be internally
//! consistent, not transactional across calls.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LockgateError, Result};

/// Persisted failure state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureRecord {
    /// Consecutive failed attempts
    pub failure_count: u32,
    /// Lockout deadline in epoch milliseconds
    pub lockout_until: Option<i64>,
}

/// Key-value persistence used by the login controller
pub trait CredentialStore: Send + Sync {
    /// Add one failed attempt
    fn increment_failure_count(&self) -> Result<()>;

    /// Number of consecutive failed attempts
    fn failure_count(&self) -> Result<u32>;

    /// Forget all failed attempts
    fn reset_failure_count(&self) -> Result<()>;

    /// Persist the lockout deadline (epoch millis)
    fn set_lockout_until(&self, timestamp_millis: i64) -> Result<()>;

    /// Persisted lockout deadline, if any
    fn lockout_until(&self) -> Result<Option<i64>>;

    /// Remove the lockout deadline
    fn clear_lockout_until(&self) -> Result<()>;

    /// Persist the auth token, or remove it with `None`
    fn save_token(&self, token: Option<String>) -> Result<()>;

    /// Persisted auth token, if any
    fn saved_token(&self) -> Result<Option<String>>;

    /// Failure count and deadline together
    fn failure_record(&self) -> Result<FailureRecord> {
        Ok(FailureRecord {
            failure_count: self.failure_count()?,
            lockout_until: self.lockout_until()?,
        })
    }
}

/// On-disk document layout
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lockout_until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
}

fn lock(data: &Mutex<StoreData>) -> MutexGuard<'_, StoreData> {
    // The document stays valid even if a holder panicked mid-update
    data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a failure record
    pub fn with_record(record: FailureRecord) -> Self {
        Self {
            data: Mutex::new(StoreData {
                failures: record.failure_count,
                lockout_until: record.lockout_until,
                auth_token: None,
            }),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn increment_failure_count(&self) -> Result<()> {
        let mut data = lock(&self.data);
        data.failures = data.failures.saturating_add(1);
        Ok(())
    }

    fn failure_count(&self) -> Result<u32> {
        Ok(lock(&self.data).failures)
    }

    fn reset_failure_count(&self) -> Result<()> {
        lock(&self.data).failures = 0;
        Ok(())
    }

    fn set_lockout_until(&self, timestamp_millis: i64) -> Result<()> {
        lock(&self.data).lockout_until = Some(timestamp_millis);
        Ok(())
    }

    fn lockout_until(&self) -> Result<Option<i64>> {
        Ok(lock(&self.data).lockout_until)
    }

    fn clear_lockout_until(&self) -> Result<()> {
        lock(&self.data).lockout_until = None;
        Ok(())
    }

    fn save_token(&self, token: Option<String>) -> Result<()> {
        lock(&self.data).auth_token = token;
        Ok(())
    }

    fn saved_token(&self) -> Result<Option<String>> {
        Ok(lock(&self.data).auth_token.clone())
    }
}

/// JSON file store that survives process restarts
///
/// Every mutation is written through to disk before returning.
#[derive(Debug)]
pub struct FileStore {
    /// Path to the JSON document
    path: PathBuf,
    /// Cached copy of the document
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories as needed
    ///
    /// A missing file is treated as an empty record.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StoreData::default()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    LockgateError::Store(format!("Corrupt store at {:?}: {}", path, e))
                })?
            }
        } else {
            StoreData::default()
        };

        debug!("Opened credential store at {:?}", path);

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove all persisted state
    pub fn clear(&self) -> Result<()> {
        self.update(|data| *data = StoreData::default())
    }

    /// Apply a mutation and write the result to disk
    fn update(&self, mutate: impl FnOnce(&mut StoreData)) -> Result<()> {
        let mut data = lock(&self.data);
        let mut next = data.clone();
        mutate(&mut next);
        self.save_to_disk(&next)?;
        *data = next;
        Ok(())
    }

    fn save_to_disk(&self, data: &StoreData) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn increment_failure_count(&self) -> Result<()> {
        self.update(|data| data.failures = data.failures.saturating_add(1))
    }

    fn failure_count(&self) -> Result<u32> {
        Ok(lock(&self.data).failures)
    }

    fn reset_failure_count(&self) -> Result<()> {
        self.update(|data| data.failures = 0)
    }

    fn set_lockout_until(&self, timestamp_millis: i64) -> Result<()> {
        self.update(|data| data.lockout_until = Some(timestamp_millis))
    }

    fn lockout_until(&self) -> Result<Option<i64>> {
        Ok(lock(&self.data).lockout_until)
    }

    fn clear_lockout_until(&self) -> Result<()> {
        self.update(|data| data.lockout_until = None)
    }

    fn save_token(&self, token: Option<String>) -> Result<()> {
        self.update(|data| data.auth_token = token)
    }

    fn saved_token(&self) -> Result<Option<String>> {
        Ok(lock(&self.data).auth_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_failure_count() {
        let store = MemoryStore::new();
        assert_eq!(store.failure_count().unwrap(), 0);

        store.increment_failure_count().unwrap();
        store.increment_failure_count().unwrap();
        assert_eq!(store.failure_count().unwrap(), 2);

        store.reset_failure_count().unwrap();
        assert_eq!(store.failure_count().unwrap(), 0);
    }

    #[test]
    fn test_memory_store_token_cleared_explicitly() {
        let store = MemoryStore::new();
        store.save_token(Some("token".to_string())).unwrap();
        assert_eq!(store.saved_token().unwrap().as_deref(), Some("token"));

        store.save_token(None).unwrap();
        assert!(store.saved_token().unwrap().is_none());
    }

    #[test]
    fn test_failure_record() {
        let store = MemoryStore::with_record(FailureRecord {
            failure_count: 3,
            lockout_until: Some(42),
        });
        let record = store.failure_record().unwrap();
        assert_eq!(record.failure_count, 3);
        assert_eq!(record.lockout_until, Some(42));

        store.clear_lockout_until().unwrap();
        assert!(store.lockout_until().unwrap().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("credentials.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.increment_failure_count().unwrap();
            store.increment_failure_count().unwrap();
            store.set_lockout_until(1_700_000_300_000).unwrap();
            store.save_token(Some("fake-jwt-token".to_string())).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.failure_count().unwrap(), 2);
        assert_eq!(store.lockout_until().unwrap(), Some(1_700_000_300_000));
        assert_eq!(
            store.saved_token().unwrap().as_deref(),
            Some("fake-jwt-token")
        );
    }

    #[test]
    fn test_file_store_layout() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = FileStore::open(&path).unwrap();

        store.increment_failure_count().unwrap();
        store.save_token(Some("abc".to_string())).unwrap();
        store.save_token(None).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["failures"], 1);
        assert!(json.get("auth_token").is_none());
        assert!(json.get("lockout_until").is_none());
    }

    #[test]
    fn test_file_store_missing_and_empty_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.failure_record().unwrap(), FailureRecord::default());

        std::fs::write(&path, "").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.failure_count().unwrap(), 0);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, LockgateError::Store(_)));
    }

    #[test]
    fn test_file_store_clear() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = FileStore::open(&path).unwrap();
        store.increment_failure_count().unwrap();
        store.save_token(Some("abc".to_string())).unwrap();

        store.clear().unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.failure_count().unwrap(), 0);
        assert!(reopened.saved_token().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = FileStore::open(&path).unwrap();
        store.increment_failure_count().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
