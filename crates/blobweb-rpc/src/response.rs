use std::path::PathBuf;

use http::StatusCode;
use serde_json::{json, Value};

/// Default attachment name for in-memory downloads.
pub const DEFAULT_DOWNLOAD_NAME: &str = "download.obj";

/// Where an attachment's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Streamed from disk. The file is left in place after sending.
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// The transport-neutral outcome of a dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum RpcResponse {
    /// A JSON body.
    Json { status: StatusCode, body: Value },
    /// An empty 200 body.
    Empty,
    /// A file download.
    Attachment {
        status: StatusCode,
        filename: String,
        source: AttachmentSource,
    },
    /// A bare HTTP error status (tier checks, malformed requests, `Abort`).
    Aborted { status: StatusCode, message: String },
}

impl RpcResponse {
    pub fn ok(body: Value) -> Self {
        Self::Json {
            status: StatusCode::OK,
            body,
        }
    }

    /// A handled error: status 200 with `{"error": message}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::ok(json!({ "error": message.into() }))
    }

    /// A handler exception: status 500 with `{"exception": text}`.
    pub fn exception(text: impl Into<String>) -> Self {
        Self::Json {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "exception": text.into() }),
        }
    }

    pub fn aborted(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Aborted {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Json { status, .. }
            | Self::Attachment { status, .. }
            | Self::Aborted { status, .. } => *status,
            Self::Empty => StatusCode::OK,
        }
    }

    /// The JSON body, if there is one.
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The `error` field of a handled error.
    pub fn error_message(&self) -> Option<&str> {
        self.json()?.get("error")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes() {
        let err = RpcResponse::error("nope");
        assert_eq!(err.status(), StatusCode::OK);
        assert_eq!(err.error_message(), Some("nope"));

        let exc = RpcResponse::exception("boom");
        assert_eq!(exc.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(exc.json().unwrap()["exception"], "boom");

        assert_eq!(RpcResponse::Empty.status(), StatusCode::OK);
        assert!(RpcResponse::Empty.json().is_none());

        let aborted = RpcResponse::aborted(StatusCode::FORBIDDEN, "disabled");
        assert_eq!(aborted.status(), StatusCode::FORBIDDEN);
    }
}
