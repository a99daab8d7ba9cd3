//! Read-through cache layer
//!
//! Entries have no TTL: they are invalidated precisely on writes observed
//! through the owning backend. Writers that reach the underlying storage
//! without going through the same backend instance (another process on the
//! same file or database) are not observed; that staleness window is
//! accepted, not a correctness guarantee. The document backend's digest
//! check exists for exactly that case.
//!
//! Keys in use: `node:<path>` for row-backend entries, a single fixed key
//! for the document backend's serialized envelope.

use std::collections::HashMap;
use std::sync::Mutex;

/// Generic byte cache collaborator keyed by strings
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, bytes: Vec<u8>);
    fn remove(&self, key: &str);
}

/// Process-local cache backed by a hash map
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, bytes: Vec<u8>) {
        self.lock().insert(key.to_string(), bytes);
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}
