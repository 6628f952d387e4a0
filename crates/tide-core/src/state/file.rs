// # File Cache Store
//
// File-based implementation of CacheStore with crash recovery.
//
// ## Purpose
//
// Keeps the last observed IP across daemon restarts so a restart with an
// unchanged address does not look like a change.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "currentIP": "203.0.113.7",
//   "lastUpdate": "2025-01-09T12:00:00Z"
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::cache_store::{CacheStore, CachedState};

/// File-based cache store with crash recovery
///
/// # Crash Recovery
///
/// - **Atomic writes**: New state written to temporary file, then renamed
/// - **Backup**: Last known good state kept in `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use tide_core::state::FileCacheStore;
/// use tide_core::traits::{CacheStore, CachedState};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileCacheStore::new("./cache/ip-cache.json");
///
///     // Atomically written to disk, directory created if missing
///     store.save(&CachedState::observed("1.2.3.4".parse()?)).await?;
///
///     let state = store.load().await;
///     assert_eq!(state.current_ip, "1.2.3.4");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    /// Serializes writers sharing this store
    write_lock: Mutex<()>,
}

impl FileCacheStore {
    /// Create a file cache store
    ///
    /// Nothing is touched on disk until the first `load()` or `save()`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main cache file
    /// 2. If it is unreadable or corrupt, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_with_recovery(&self) -> CachedState {
        let error = match Self::read_state(&self.path).await {
            Ok(Some(state)) => {
                tracing::debug!("Cache loaded: currentIP={:?}", state.current_ip);
                return state;
            }
            Ok(None) => {
                tracing::debug!("Cache file does not exist: {}", self.path.display());
                return CachedState::default();
            }
            Err(e) => e,
        };

        tracing::warn!(
            "Cache file {} appears corrupted: {}. Attempting recovery from backup.",
            self.path.display(),
            error
        );

        let backup_path = Self::backup_path(&self.path);
        match Self::read_state(&backup_path).await {
            Ok(Some(state)) => {
                tracing::info!("Recovered cache from backup: currentIP={:?}", state.current_ip);

                if let Err(restore_err) = Self::restore_from_backup(&self.path, &backup_path).await
                {
                    tracing::error!("Failed to restore cache file from backup: {}", restore_err);
                }

                state
            }
            Ok(None) => {
                tracing::warn!("No backup file found. Starting with empty state.");
                CachedState::default()
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty state.",
                    backup_err
                );
                CachedState::default()
            }
        }
    }

    /// Read and parse a cache document
    ///
    /// Returns `Ok(None)` when the file does not exist.
    async fn read_state(path: &Path) -> Result<Option<CachedState>, Error> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// Write state to file atomically
    async fn write_state(&self, state: &CachedState) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(state)?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        // Keep the current file as backup, but only if it is still valid
        if let Ok(Some(_)) = Self::read_state(&self.path).await {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::cache_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Cache written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore cache file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::cache_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored cache file from backup");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self) -> CachedState {
        self.load_with_recovery().await
    }

    async fn save(&self, state: &CachedState) -> Result<(), Error> {
        self.write_state(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("ip-cache.json"));

        let state = store.load().await;
        assert!(state.is_empty());
        assert!(state.last_update.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_directories_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache").join("ip-cache.json");

        let store = FileCacheStore::new(&path);
        store
            .save(&CachedState::observed(Ipv4Addr::new(1, 2, 3, 4)))
            .await
            .unwrap();

        assert!(path.exists());

        // A fresh instance sees the persisted state
        let store2 = FileCacheStore::new(&path);
        assert_eq!(store2.load().await.current_ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_corrupt_file_without_backup_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip-cache.json");
        fs::write(&path, b"{not json").await.unwrap();

        let store = FileCacheStore::new(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip-cache.json");

        let store = FileCacheStore::new(&path);
        store
            .save(&CachedState::observed(Ipv4Addr::new(1, 2, 3, 4)))
            .await
            .unwrap();

        // Second write creates the backup of the first
        store
            .save(&CachedState::observed(Ipv4Addr::new(1, 2, 3, 5)))
            .await
            .unwrap();

        let backup_path = FileCacheStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileCacheStore::new(&path).load().await;
        assert_eq!(
            recovered.current_ip, "1.2.3.4",
            "Backup should contain previous state, not latest"
        );

        // Main file was restored from the backup
        let restored = fs::read_to_string(&path).await.unwrap();
        assert!(restored.contains("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_save_fails_when_parent_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").await.unwrap();

        let store = FileCacheStore::new(blocker.join("ip-cache.json"));
        let result = store
            .save(&CachedState::observed(Ipv4Addr::new(1, 2, 3, 4)))
            .await;

        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_read_state_reports_parse_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip-cache.json");
        fs::write(&path, b"{\"currentIP\": 42}").await.unwrap();

        let result = FileCacheStore::read_state(&path).await;
        assert!(matches!(result, Err(Error::Json(_))));

        assert!(matches!(
            FileCacheStore::read_state(&dir.path().join("absent.json")).await,
            Ok(None)
        ));
    }

    #[tokio::test]
    async fn test_read_state_reports_io_errors() {
        let dir = tempdir().unwrap();

        // A directory cannot be read as a file
        let result = FileCacheStore::read_state(dir.path()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_rapid_writes_end_consistent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip-cache.json");
        let store = FileCacheStore::new(&path);

        for i in 0..10 {
            store
                .save(&CachedState::observed(Ipv4Addr::new(1, 2, 3, i)))
                .await
                .unwrap();
        }

        let final_state = FileCacheStore::new(&path).load().await;
        assert_eq!(final_state.current_ip, "1.2.3.9");
    }
}
