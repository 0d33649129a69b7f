use http::StatusCode;

/// Errors from registration, dispatch plumbing, tasks, and notification.
///
/// Dispatch itself never returns these to the caller: they are shaped into
/// an [`RpcResponse`](crate::RpcResponse) first.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Could not find requested RPC \"{0}\"")]
    UnknownRpc(String),

    #[error("Invalid RPC - must be a string ({0})")]
    InvalidName(String),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("no task function registered as \"{0}\"")]
    UnknownTask(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("store error: {0}")]
    Store(#[from] blobweb_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// The HTTP status a client sees for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownRpc(_) | Self::InvalidName(_) => StatusCode::OK,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        Self::Notify(e.to_string())
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(RpcError::UnknownRpc("x".into()).status(), StatusCode::OK);
        assert_eq!(RpcError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(RpcError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RpcError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            RpcError::UnknownTask("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_rpc_message() {
        assert_eq!(
            RpcError::UnknownRpc("nope".into()).to_string(),
            "Could not find requested RPC \"nope\""
        );
    }
}
