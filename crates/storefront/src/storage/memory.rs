//! In-memory storage backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nogalim_core::UserId;

use super::{DocumentStore, KeyValueStorage, StorageError, UserDocument};

/// Key-value storage held in process memory.
///
/// Behaves like browser `sessionStorage`: contents are gone when the value is
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Document store held in process memory.
///
/// Clones share the same documents, so one instance can stand in for the
/// remote store seen by several devices. Reads and writes can be made to fail
/// to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<MemoryDocumentStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryDocumentStoreInner {
    documents: Mutex<HashMap<UserId, UserDocument>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a user's document directly.
    pub fn insert(&self, user: UserId, document: UserDocument) {
        self.documents().insert(user, document);
    }

    /// A copy of a user's document.
    #[must_use]
    pub fn get(&self, user: &UserId) -> Option<UserDocument> {
        self.documents().get(user).cloned()
    }

    /// Make subsequent reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    fn documents(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, UserDocument>> {
        self.inner
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, user: &UserId) -> Result<Option<UserDocument>, StorageError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("reads disabled".to_string()));
        }
        Ok(self.get(user))
    }

    async fn merge_write(&self, user: &UserId, patch: UserDocument) -> Result<(), StorageError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }

        {
            let mut documents = self.documents();
            let document = documents.entry(user.clone()).or_default();
            if let Some(cart) = patch.cart {
                document.cart = Some(cart);
            }
            if let Some(location) = patch.location {
                document.location = Some(location);
            }
        }
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
