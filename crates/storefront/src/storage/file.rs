//! File-backed persistent storage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{KeyValueStorage, StorageError};

/// Key-value storage persisted as a single JSON object on disk.
///
/// Plays the role of browser `localStorage` for native clients. The whole
/// file is rewritten on every change.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStorage {
    /// Open storage at `path`.
    ///
    /// A missing file starts empty. A file that is not a JSON object of
    /// strings is logged and replaced by empty storage on the next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable storage file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, entries })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        self.flush()
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.json");

        let mut storage = JsonFileStorage::open(&path).unwrap();
        storage.set_item("nog_cart_v1_u1", "[]").unwrap();
        storage.set_item("other", "1").unwrap();
        storage.remove_item("other").unwrap();

        let reopened = JsonFileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("nog_cart_v1_u1").as_deref(), Some("[]"));
        assert!(reopened.get_item("other").is_none());
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = JsonFileStorage::open(&path).unwrap();
        assert!(storage.get_item("anything").is_none());
    }
}
