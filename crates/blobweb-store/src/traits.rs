use crate::error::StoreResult;
use crate::pattern::KeyPattern;

/// A storage driver for the store keyspace.
///
/// Backends hold opaque byte payloads under string keys and never interpret
/// them. All implementations must satisfy these rules:
/// - `get` on a missing key returns `Ok(None)`, never an error.
/// - `set` returns an error on any I/O or connection failure.
/// - `delete` on a missing key succeeds (idempotent).
/// - Implementations are shared across request workers, so they must be
///   safe for concurrent use or serialize access internally.
pub trait Backend: Send + Sync {
    /// Human-readable description (driver and location).
    fn describe(&self) -> String;

    /// Store `data` under `key`, replacing any previous value.
    fn set(&self, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Read the bytes stored under `key`.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `key` if present.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Remove every key.
    fn flush(&self) -> StoreResult<()>;

    /// List every key, in backend-defined order.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Check whether `key` is present.
    ///
    /// Default implementation reads the value. Backends may override with a
    /// cheaper native check.
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List keys matching a glob pattern.
    ///
    /// Default implementation filters [`Backend::keys`]. Backends with native
    /// pattern support should override.
    fn keys_matching(&self, pattern: &KeyPattern) -> StoreResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| pattern.matches(key))
            .collect())
    }
}
