use crate::record::RecordKind;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key is absent.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A payload exists under the key but could not be decoded.
    #[error("could not deserialize record at {key}: {reason}")]
    Deserialize { key: String, reason: String },

    /// A record could not be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record exists and overwriting was disabled.
    #[error("{kind} {key} already exists and overwrite is disabled")]
    Duplicate { kind: RecordKind, key: String },

    /// The record under the key is not of the expected kind.
    #[error("cannot load {key} as a {expected} since it is a {found}")]
    TypeMismatch {
        key: String,
        expected: RecordKind,
        found: RecordKind,
    },

    /// The resolved key exceeds the length bound.
    #[error("key is too long: {len} characters (maximum {max})")]
    KeyTooLong { len: usize, max: usize },

    /// The store URI does not name a usable backend.
    #[error("unsupported store URI {uri:?}: {reason}")]
    UnsupportedUri { uri: String, reason: String },

    /// A key filter pattern is not valid glob syntax.
    #[error("invalid key pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The persisted settings record could not be loaded.
    #[error("could not load store settings: {0}")]
    Settings(String),

    /// I/O error from a file-system backend or the temp directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the relational backend.
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Error from the remote key-value backend.
    #[cfg(feature = "redis-storage")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// Returns `true` for the errors a tolerant caller may treat as "absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
