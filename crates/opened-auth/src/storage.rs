//! Key-value storage for token fields
//!
//! The session persists each token field under `"{prefix}.{field}"`, the
//! same layout a browser build keeps in `localStorage`. [`TokenStore`] is the
//! seam; [`MemoryStore`] keeps fields for the life of the process and
//! [`FileStore`] keeps them in a JSON file across restarts.
//!
//! The store only serializes individual reads and writes. Callers that run
//! `login`/`silent_login`/`logout` concurrently get last-write-wins.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by [`TokenStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistent string key-value storage.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Insert or overwrite a value.
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;

    /// Delete a key. Removing an absent key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// Delete every key starting with `prefix`. Returns how many were removed.
    fn remove_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, usize>;
}

/// In-process store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.entries
                .lock()
                .await
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }

    fn remove_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(prefix));
            Ok(before - entries.len())
        })
    }
}

/// JSON-file store.
///
/// The whole map is rewritten on every change using atomic temp-file +
/// rename, with 0600 permissions since the file holds bearer tokens. A tokio
/// Mutex serializes writers.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, creating it as `{}` if it doesn't exist.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading token file: {e}")))?;
            let entries: BTreeMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("parsing token file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded token file");
            entries
        } else {
            info!(path = %path.display(), "token file not found, starting empty");
            let entries = BTreeMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.insert(key.to_owned(), value.to_owned());
            debug!(key, "stored token field");
            write_atomic(&self.path, &state).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(key).is_some() {
                debug!(key, "removed token field");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }

    fn remove_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let before = state.len();
            state.retain(|key, _| !key.starts_with(prefix));
            let removed = before - state.len();
            if removed > 0 {
                debug!(prefix, removed, "removed token fields");
                write_atomic(&self.path, &state).await?;
            }
            Ok(removed)
        })
    }
}

/// Write the map to `path` via a temp file in the same directory + rename.
async fn write_atomic(path: &Path, data: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing token file: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("token file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".opened-tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("_openEd.access_token").await.unwrap().is_none());

        store.set("_openEd.access_token", "abc").await.unwrap();
        assert_eq!(
            store.get("_openEd.access_token").await.unwrap().as_deref(),
            Some("abc")
        );

        store.set("_openEd.access_token", "def").await.unwrap();
        assert_eq!(
            store.get("_openEd.access_token").await.unwrap().as_deref(),
            Some("def"),
            "set must overwrite"
        );

        store.remove("_openEd.access_token").await.unwrap();
        assert!(store.is_empty().await);

        // removing again is a no-op
        store.remove("_openEd.access_token").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("_openEd.access_token", "abc").await.unwrap();
        store.set("_openEd.expires_in", "1735500060000").await.unwrap();

        let reopened = FileStore::open(path).await.unwrap();
        assert_eq!(
            reopened.get("_openEd.access_token").await.unwrap().as_deref(),
            Some("abc")
        );
        assert_eq!(
            reopened.get("_openEd.expires_in").await.unwrap().as_deref(),
            Some("1735500060000")
        );
    }

    #[tokio::test]
    async fn file_store_cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        assert!(!path.exists());
        let _store = FileStore::open(path.clone()).await.unwrap();
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn file_store_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("_openEd.access_token", "abc").await.unwrap();
        store.remove("_openEd.access_token").await.unwrap();

        let reopened = FileStore::open(path).await.unwrap();
        assert!(reopened.get("_openEd.access_token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_prefix_leaves_other_namespaces() {
        let store = MemoryStore::new();
        store.set("_openEd.access_token", "abc").await.unwrap();
        store.set("_openEd.scope", "read").await.unwrap();
        store.set("_openEdX.access_token", "other").await.unwrap();

        assert_eq!(store.remove_prefix("_openEd.").await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("_openEdX.access_token").await.unwrap().as_deref(),
            Some("other")
        );
        assert_eq!(store.remove_prefix("_openEd.").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_store_remove_prefix_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("_openEd.access_token", "abc").await.unwrap();
        store.set("_openEd.token_type", "bearer").await.unwrap();
        store.set("unrelated", "keep").await.unwrap();
        assert_eq!(store.remove_prefix("_openEd.").await.unwrap(), 2);

        let reopened = FileStore::open(path).await.unwrap();
        assert!(reopened.get("_openEd.token_type").await.unwrap().is_none());
        assert_eq!(
            reopened.get("unrelated").await.unwrap().as_deref(),
            Some("keep")
        );
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileStore::open(path).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("_openEd.access_token", "abc").await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }
}
