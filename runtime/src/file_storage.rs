//! File-backed snapshot storage.

use slicestore_core::{StateStorage, StorageError, StorageFuture};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Environment variable naming the directory [`FileStorage::from_env`] uses.
pub const STORAGE_DIR_ENV: &str = "SLICESTORE_STORAGE_DIR";

/// Directory used when [`STORAGE_DIR_ENV`] is unset.
pub const DEFAULT_STORAGE_DIR: &str = ".slicestore";

/// Stores each entry as `<dir>/<name>.json`.
///
/// Each write goes to its own uniquely named temporary file that is renamed
/// over the entry, so a reader never sees a half-written snapshot and
/// concurrent writers never share a staging file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage rooted at `$SLICESTORE_STORAGE_DIR`, or `.slicestore`
    #[must_use]
    pub fn from_env() -> Self {
        let dir = std::env::var_os(STORAGE_DIR_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);
        Self::new(dir)
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for the entry `name`
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

/// Write `value` to a uniquely named file in `dir`, then rename it over `path`.
fn write_atomically(dir: &Path, path: &Path, value: &[u8]) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir)?;
    let mut staging = NamedTempFile::new_in(dir)?;
    staging.write_all(value)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|error| error.error)?;
    Ok(())
}

impl StateStorage for FileStorage {
    fn get_item(&self, name: &str) -> StorageFuture<'_, Option<Vec<u8>>> {
        let path = self.path_for(name);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
                Err(error) => Err(StorageError::from(error)),
            }
        })
    }

    fn set_item(&self, name: &str, value: Vec<u8>) -> StorageFuture<'_, ()> {
        let path = self.path_for(name);
        let dir = self.dir.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &value))
                .await
                .map_err(|error| StorageError::Backend(error.to_string()))?
        })
    }

    fn remove_item(&self, name: &str) -> StorageFuture<'_, ()> {
        let path = self.path_for(name);
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(error) => Err(StorageError::from(error)),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));

        assert_eq!(storage.get_item("dashboard-store").await.unwrap(), None);

        storage
            .set_item("dashboard-store", b"{\"state\":{},\"version\":0}".to_vec())
            .await
            .unwrap();
        assert_eq!(
            storage.get_item("dashboard-store").await.unwrap(),
            Some(b"{\"state\":{},\"version\":0}".to_vec())
        );

        storage.remove_item("dashboard-store").await.unwrap();
        assert_eq!(storage.get_item("dashboard-store").await.unwrap(), None);
        storage.remove_item("dashboard-store").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_each_land_a_whole_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = std::sync::Arc::new(FileStorage::new(dir.path()));
        let values: Vec<Vec<u8>> = (0..16)
            .map(|i| format!("{{\"state\":{{\"writer\":{i}}},\"version\":1}}").into_bytes())
            .collect();

        let writers: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let storage = std::sync::Arc::clone(&storage);
                tokio::spawn(async move { storage.set_item("dashboard-store", value).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let stored = storage.get_item("dashboard-store").await.unwrap().unwrap();
        assert!(values.contains(&stored));

        // Only the entry itself is left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn entry_names_are_sanitized() {
        let storage = FileStorage::new("/tmp/store");
        assert_eq!(
            storage.path_for("../evil name"),
            PathBuf::from("/tmp/store/.._evil_name.json")
        );
    }
}
