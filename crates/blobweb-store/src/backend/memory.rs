use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::Backend;

/// In-memory, map-based backend.
///
/// Intended for tests, embedding, and deployments without persistence.
/// Entries are held behind a `RwLock` for safe concurrent access and are
/// listed in key order.
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Total payload bytes across all keys.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .read()
            .expect("lock poisoned")
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InMemoryBackend {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    fn set(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.remove(key);
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        self.entries.write().expect("lock poisoned").clear();
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::KeyPattern;

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn set_and_get() {
        let backend = InMemoryBackend::new();
        backend.set("foo", b"hello").unwrap();
        assert_eq!(backend.get("foo").unwrap().as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn set_replaces() {
        let backend = InMemoryBackend::new();
        backend.set("foo", b"one").unwrap();
        backend.set("foo", b"two").unwrap();
        assert_eq!(backend.get("foo").unwrap().unwrap(), b"two");
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let backend = InMemoryBackend::new();
        assert!(backend.get("missing").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let backend = InMemoryBackend::new();
        backend.set("foo", b"x").unwrap();
        backend.delete("foo").unwrap();
        backend.delete("foo").unwrap();
        assert!(!backend.exists("foo").unwrap());
    }

    #[test]
    fn flush_removes_all() {
        let backend = InMemoryBackend::new();
        backend.set("a", b"1").unwrap();
        backend.set("b", b"2").unwrap();
        backend.flush().unwrap();
        assert!(backend.is_empty());
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    #[test]
    fn keys_are_sorted() {
        let backend = InMemoryBackend::new();
        backend.set("b", b"").unwrap();
        backend.set("a", b"").unwrap();
        backend.set("c", b"").unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn default_pattern_filtering() {
        let backend = InMemoryBackend::new();
        backend.set("foo", b"").unwrap();
        backend.set("bar", b"").unwrap();
        let f = KeyPattern::new("f*").unwrap();
        assert_eq!(backend.keys_matching(&f).unwrap(), vec!["foo"]);
        let bar = KeyPattern::new("bar").unwrap();
        assert_eq!(backend.keys_matching(&bar).unwrap(), vec!["bar"]);
    }

    #[test]
    fn total_bytes() {
        let backend = InMemoryBackend::new();
        backend.set("a", b"12345").unwrap();
        backend.set("b", b"123456789").unwrap();
        assert_eq!(backend.total_bytes(), 14);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writers_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let backend = Arc::new(InMemoryBackend::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || {
                    backend.set(&format!("key{i}"), b"data").unwrap();
                    assert!(backend.exists(&format!("key{i}")).unwrap());
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(backend.len(), 8);
    }

    #[test]
    fn debug_format() {
        let backend = InMemoryBackend::new();
        backend.set("x", b"").unwrap();
        let debug = format!("{backend:?}");
        assert!(debug.contains("InMemoryBackend"));
        assert!(debug.contains("key_count"));
    }
}
