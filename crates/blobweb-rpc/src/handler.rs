use std::path::{Path, PathBuf};

use blobweb_store::Store;
use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::session::Session;

/// What a handler can see about the call it is serving.
#[derive(Clone, Copy, Debug)]
pub struct CallContext<'a> {
    pub name: &'a str,
    pub session: Option<&'a Session>,
    pub store: Option<&'a Store>,
    /// Scratch directory for uploads and generated files.
    pub tempfolder: &'a Path,
}

impl<'a> CallContext<'a> {
    /// The store, or an error for handlers that cannot run without one.
    pub fn require_store(&self) -> anyhow::Result<&'a Store> {
        self.store
            .ok_or_else(|| anyhow::anyhow!("RPC \"{}\" requires a datastore", self.name))
    }

    pub fn username(&self) -> Option<&'a str> {
        self.session.map(|s| s.username.as_str())
    }
}

/// A handler's result.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Nothing to return: an empty body.
    None,
    /// JSON returned as-is, key order preserved.
    Value(Value),
    /// A file on disk, optionally served under another name.
    File {
        path: PathBuf,
        filename: Option<String>,
    },
    /// An in-memory buffer, optionally named.
    Bytes {
        data: Vec<u8>,
        filename: Option<String>,
    },
}

impl Reply {
    /// Serialize any value into a JSON reply.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// A `{"error": message}` reply, passed through with status 200.
    pub fn error(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("error".into(), Value::String(message.into()));
        Self::Value(Value::Object(map))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            filename: None,
        }
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        Self::Bytes {
            data,
            filename: None,
        }
    }

    /// Name the download.
    pub fn named(self, name: impl Into<String>) -> Self {
        match self {
            Self::File { path, .. } => Self::File {
                path,
                filename: Some(name.into()),
            },
            Self::Bytes { data, .. } => Self::Bytes {
                data,
                filename: Some(name.into()),
            },
            other => other,
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            value => Self::Value(value),
        }
    }
}

/// A handler error that maps straight to an HTTP status instead of an
/// exception report.
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct Abort {
    pub status: StatusCode,
    pub message: String,
}

impl Abort {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

/// A callable registered under an RPC name.
pub trait RpcHandler: Send + Sync {
    fn call(
        &self,
        ctx: &CallContext<'_>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> anyhow::Result<Reply>;
}

impl<F> RpcHandler for F
where
    F: Fn(&CallContext<'_>, Vec<Value>, Map<String, Value>) -> anyhow::Result<Reply> + Send + Sync,
{
    fn call(
        &self,
        ctx: &CallContext<'_>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> anyhow::Result<Reply> {
        self(ctx, args, kwargs)
    }
}

/// Positional argument `index`, decoded.
pub fn arg<T: serde::de::DeserializeOwned>(args: &[Value], index: usize) -> anyhow::Result<T> {
    let value = args
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("missing positional argument {index}"))?;
    Ok(serde_json::from_value(value.clone())?)
}
