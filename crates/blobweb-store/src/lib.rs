//! Key-value persistence for blobweb applications.
//!
//! A [`Store`] stores typed records ([`Blob`], [`User`], [`Task`]) as opaque
//! bytes in a pluggable [`Backend`]. Keys are derived by the [`KeyCodec`]
//! from any mix of an explicit key, an object type, and a uid, with the
//! canonical form `objtype::uid`.
//!
//! # Backends
//!
//! Selected by URI through [`open_backend`]:
//!
//! - [`InMemoryBackend`] -- `memory://`, for tests and embedding
//! - [`FileBackend`] -- `file://<dir>`, one file per key
//! - [`SqlBackend`] -- SQLite, `sqlite:///<path>` or a bare path
//! - `RedisBackend` -- `kv://` / `redis://`, behind the `redis-storage` feature
//!
//! # Rules
//!
//! 1. A missing key reads as `None`; an unreadable one is an error.
//! 2. Deleting a missing key succeeds.
//! 3. Keys never exceed 255 characters.
//! 4. Keys starting with `_` are internal and are not migrated.
//! 5. The settings record lives in the keyspace it configures.

pub mod backend;
pub mod error;
pub mod key;
pub mod migrate;
pub mod pattern;
pub mod record;
pub mod settings;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
#[cfg(feature = "redis-storage")]
pub use backend::RedisBackend;
pub use backend::{open_backend, BackendUri, FileBackend, InMemoryBackend, SqlBackend, SqlTarget};
pub use error::{StoreError, StoreResult};
pub use key::{KeyCodec, KeyRequest, Keyed, ResolvedKey, DEFAULT_SEPARATOR, MAX_KEY_LEN};
pub use migrate::{copy_store, is_internal_key, migrate, MigrationReport};
pub use pattern::KeyPattern;
pub use record::{Blob, Record, RecordKind, Task, TaskStatus, User, TASK_OBJTYPE, USER_OBJTYPE};
pub use settings::{cleanup_temp_dirs, create_scratch_dir, StoreSettings, SETTINGS_KEY};
pub use store::{LoadOptions, SaveOptions, Store, StoreOptions};
pub use traits::Backend;
