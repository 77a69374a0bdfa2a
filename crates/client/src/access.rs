//! Client-side persistence of ancillary access grants.
//!
//! A submission may return an opaque grant (for example, one unlocking a
//! related session).  It is stored once per job id under
//! [`grant_key`]; a second write for the same job is a no-op.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::submitter::AncillaryAccess;

/// Storage key for the grant belonging to `job_id`.
pub fn grant_key(job_id: &str) -> String {
    format!("card_access:{job_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Access grant store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Access grant store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Write-once store of ancillary access grants.
#[async_trait]
pub trait AccessGrantStore: Send + Sync {
    /// Store `grant` for `job_id`. Returns `false` without overwriting if a
    /// grant for that job already exists.
    async fn record(&self, job_id: &str, grant: &AncillaryAccess) -> Result<bool, StoreError>;

    async fn get(&self, job_id: &str) -> Result<Option<AncillaryAccess>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store; grants disappear with the process.
#[derive(Debug, Default)]
pub struct MemoryAccessGrantStore {
    grants: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryAccessGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grants
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccessGrantStore for MemoryAccessGrantStore {
    async fn record(&self, job_id: &str, grant: &AncillaryAccess) -> Result<bool, StoreError> {
        let mut grants = self
            .grants
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = grant_key(job_id);
        if grants.contains_key(&key) {
            return Ok(false);
        }
        grants.insert(key, grant.0.clone());
        Ok(true)
    }

    async fn get(&self, job_id: &str) -> Result<Option<AncillaryAccess>, StoreError> {
        let grants = self
            .grants
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(grants.get(&grant_key(job_id)).cloned().map(AncillaryAccess))
    }
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

/// Grants kept in a single JSON object on disk, keyed by [`grant_key`].
///
/// A missing file reads as empty.  Writes go to a sibling temp file that
/// is then renamed over the original.
pub struct FileAccessGrantStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileAccessGrantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, grants: &BTreeMap<String, serde_json::Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(grants)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AccessGrantStore for FileAccessGrantStore {
    async fn record(&self, job_id: &str, grant: &AncillaryAccess) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut grants = self.load().await?;
        let key = grant_key(job_id);
        if grants.contains_key(&key) {
            tracing::debug!(job_id, "Access grant already recorded");
            return Ok(false);
        }
        grants.insert(key, grant.0.clone());
        self.save(&grants).await?;
        tracing::debug!(job_id, path = %self.path.display(), "Access grant recorded");
        Ok(true)
    }

    async fn get(&self, job_id: &str) -> Result<Option<AncillaryAccess>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut grants = self.load().await?;
        Ok(grants.remove(&grant_key(job_id)).map(AncillaryAccess))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn grant(session: &str) -> AncillaryAccess {
        AncillaryAccess(json!({ "session_id": session, "expires_in": 3600 }))
    }

    #[test]
    fn key_is_derived_from_job_id() {
        assert_eq!(grant_key("abc123"), "card_access:abc123");
    }

    #[tokio::test]
    async fn memory_store_is_write_once() {
        let store = MemoryAccessGrantStore::new();
        assert!(store.record("j1", &grant("first")).await.unwrap());
        assert!(!store.record("j1", &grant("second")).await.unwrap());

        assert_eq!(store.get("j1").await.unwrap(), Some(grant("first")));
        assert_eq!(store.get("j2").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_survives_a_poisoned_lock() {
        let store = MemoryAccessGrantStore::new();
        assert!(store.record("j1", &grant("first")).await.unwrap());

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.grants.lock().unwrap();
            panic!("writer died while holding the lock");
        }));
        assert!(poisoned.is_err());
        assert!(store.grants.is_poisoned());

        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert!(store.record("j2", &grant("second")).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("grants.json");

        let store = FileAccessGrantStore::new(&path);
        assert!(store.record("j1", &grant("s1")).await.unwrap());
        assert!(store.record("j2", &grant("s2")).await.unwrap());
        assert!(!store.record("j1", &grant("other")).await.unwrap());

        let reopened = FileAccessGrantStore::new(&path);
        assert_eq!(reopened.get("j1").await.unwrap(), Some(grant("s1")));
        assert_eq!(reopened.get("j2").await.unwrap(), Some(grant("s2")));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw.get("card_access:j1").is_some());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAccessGrantStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("j1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileAccessGrantStore::new(&path);
        assert_matches!(
            store.record("j1", &grant("s1")).await,
            Err(StoreError::Serde(_))
        );
    }
}
