//! Storage drivers and the URI factory that selects between them.
//!
//! | URI                                  | Backend            |
//! |--------------------------------------|--------------------|
//! | `kv://host[:port][/db]`, `redis://`  | [`RedisBackend`] (feature `redis-storage`) |
//! | `file://<dir>` (`file://./rel/`)     | [`FileBackend`]    |
//! | `memory://`                          | [`InMemoryBackend`]|
//! | anything else                        | [`SqlBackend`]     |

use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};
use crate::traits::Backend;

pub mod file;
pub mod memory;
#[cfg(feature = "redis-storage")]
pub mod kv;
pub mod sql;

pub use file::FileBackend;
pub use memory::InMemoryBackend;
#[cfg(feature = "redis-storage")]
pub use kv::RedisBackend;
pub use sql::{SqlBackend, SqlTarget};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// A parsed store URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendUri {
    Memory,
    File(PathBuf),
    Sql(SqlTarget),
    /// A `redis://` connection URL.
    Redis(String),
}

impl BackendUri {
    pub fn parse(uri: &str) -> StoreResult<Self> {
        let uri = uri.trim();
        if let Some(rest) = uri.strip_prefix("kv://") {
            return Ok(Self::Redis(if rest.is_empty() {
                DEFAULT_REDIS_URL.to_string()
            } else {
                format!("redis://{rest}")
            }));
        }
        if uri.starts_with("redis://") || uri.starts_with("rediss://") {
            return Ok(Self::Redis(uri.to_string()));
        }
        if let Some(rest) = uri.strip_prefix("file://") {
            if rest.is_empty() {
                return Err(unsupported(uri, "file URI needs a directory path"));
            }
            return Ok(Self::File(PathBuf::from(rest)));
        }
        if uri == "memory://" || uri == "memory:" {
            return Ok(Self::Memory);
        }
        parse_sql(uri).map(Self::Sql)
    }
}

/// `sqlite://` variants and bare paths. Other relational drivers are not
/// compiled in.
fn parse_sql(uri: &str) -> StoreResult<SqlTarget> {
    if let Some(rest) = uri.strip_prefix("sqlite://") {
        return match rest {
            "" | "/" | "/:memory:" => Ok(SqlTarget::Memory),
            _ => match rest.strip_prefix('/') {
                Some(path) => Ok(SqlTarget::File(PathBuf::from(path))),
                None => Err(unsupported(uri, "expected sqlite:///<path>")),
            },
        };
    }
    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(unsupported(
            uri,
            &format!("no relational driver for scheme {scheme:?}"),
        ));
    }
    match uri {
        "" => Err(unsupported(uri, "empty store URI")),
        ":memory:" => Ok(SqlTarget::Memory),
        path => Ok(SqlTarget::File(PathBuf::from(path))),
    }
}

fn unsupported(uri: &str, reason: &str) -> StoreError {
    StoreError::UnsupportedUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

/// Open the backend a URI names.
pub fn open_backend(uri: &str) -> StoreResult<Box<dyn Backend>> {
    match BackendUri::parse(uri)? {
        BackendUri::Memory => Ok(Box::new(InMemoryBackend::new())),
        BackendUri::File(path) => Ok(Box::new(FileBackend::open(path)?)),
        BackendUri::Sql(target) => Ok(Box::new(SqlBackend::open(target)?)),
        BackendUri::Redis(url) => open_redis(uri, &url),
    }
}

#[cfg(feature = "redis-storage")]
fn open_redis(_uri: &str, url: &str) -> StoreResult<Box<dyn Backend>> {
    Ok(Box::new(RedisBackend::open(url)?))
}

#[cfg(not(feature = "redis-storage"))]
fn open_redis(uri: &str, _url: &str) -> StoreResult<Box<dyn Backend>> {
    Err(unsupported(
        uri,
        "remote key-value support requires the redis-storage feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kv_and_redis() {
        assert_eq!(
            BackendUri::parse("kv://cache:6380/2").unwrap(),
            BackendUri::Redis("redis://cache:6380/2".into())
        );
        assert_eq!(
            BackendUri::parse("kv://").unwrap(),
            BackendUri::Redis(DEFAULT_REDIS_URL.into())
        );
        assert_eq!(
            BackendUri::parse("redis://127.0.0.1/3").unwrap(),
            BackendUri::Redis("redis://127.0.0.1/3".into())
        );
    }

    #[test]
    fn parse_file() {
        assert_eq!(
            BackendUri::parse("file://./temp_store/").unwrap(),
            BackendUri::File(PathBuf::from("./temp_store/"))
        );
        assert_eq!(
            BackendUri::parse("file:///var/lib/blobweb").unwrap(),
            BackendUri::File(PathBuf::from("/var/lib/blobweb"))
        );
        assert!(BackendUri::parse("file://").is_err());
    }

    #[test]
    fn parse_sqlite_forms() {
        assert_eq!(
            BackendUri::parse("sqlite:///datastore.db").unwrap(),
            BackendUri::Sql(SqlTarget::File(PathBuf::from("datastore.db")))
        );
        assert_eq!(
            BackendUri::parse("sqlite:////tmp/abs.db").unwrap(),
            BackendUri::Sql(SqlTarget::File(PathBuf::from("/tmp/abs.db")))
        );
        assert_eq!(
            BackendUri::parse("sqlite:///:memory:").unwrap(),
            BackendUri::Sql(SqlTarget::Memory)
        );
        assert_eq!(
            BackendUri::parse("sqlite://").unwrap(),
            BackendUri::Sql(SqlTarget::Memory)
        );
        assert_eq!(
            BackendUri::parse("data/store.db").unwrap(),
            BackendUri::Sql(SqlTarget::File(PathBuf::from("data/store.db")))
        );
    }

    #[test]
    fn parse_memory() {
        assert_eq!(BackendUri::parse("memory://").unwrap(), BackendUri::Memory);
    }

    #[test]
    fn other_relational_schemes_are_rejected() {
        let err = BackendUri::parse("postgresql://u:p@localhost/db").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedUri { .. }));
    }

    #[test]
    fn open_backend_by_uri() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("file://{}/", dir.path().join("files").display());
        let backend = open_backend(&uri).unwrap();
        backend.set("k", b"v").unwrap();
        assert!(dir.path().join("files").join("k").is_file());

        let backend = open_backend("sqlite:///:memory:").unwrap();
        assert!(backend.describe().contains("sqlite"));
    }

    #[cfg(feature = "redis-storage")]
    #[test]
    fn kv_uri_reaches_redis() {
        assert!(matches!(open_backend("kv://127.0.0.1:1"), Err(StoreError::Redis(_))));
    }

    #[cfg(not(feature = "redis-storage"))]
    #[test]
    fn redis_without_feature_is_unsupported() {
        assert!(matches!(
            open_backend("kv://localhost"),
            Err(StoreError::UnsupportedUri { .. })
        ));
    }
}
