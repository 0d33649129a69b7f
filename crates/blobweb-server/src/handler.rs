use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Form;
use blobweb_rpc::{AttachmentSource, Dispatcher, RpcError, RpcRequest, RpcResponse, UploadedFile};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::auth::{Credentials, SessionProvider};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<dyn SessionProvider>,
    /// Bounds concurrent dispatches.
    pub workers: Arc<Semaphore>,
    pub max_request_bytes: usize,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, sessions: Arc<dyn SessionProvider>, max_workers: usize) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sessions,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            max_request_bytes: 64 * 1024 * 1024,
        }
    }

    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit;
        self
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    let dispatcher = &state.dispatcher;
    Json(json!({
        "name": "blobweb-server",
        "version": env!("CARGO_PKG_VERSION"),
        "rpcs": dispatcher.registry().names().collect::<Vec<_>>(),
        "datastore": dispatcher.store().map(|s| s.describe()),
        "users": dispatcher.config().use_users,
        "logging_mode": dispatcher.config().logging_mode,
    }))
}

/// `POST /rpcs`: parse, resolve the session, and dispatch on a worker.
pub async fn rpc_handler(State(state): State<AppState>, request: Request) -> Response {
    let credentials = Credentials::from_headers(request.headers());
    let session = match state.sessions.session(&credentials).await {
        Ok(session) => session,
        Err(e) => {
            warn!("rejected RPC request: {e}");
            return no_cache(plain(StatusCode::UNAUTHORIZED, e.to_string()));
        }
    };

    let rpc_request = match parse_request(request, state.max_request_bytes).await {
        Ok(r) => r,
        Err(e) => {
            debug!("malformed RPC request: {e}");
            return no_cache(plain(e.status(), e.to_string()));
        }
    };

    let Ok(permit) = Arc::clone(&state.workers).acquire_owned().await else {
        return no_cache(plain(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down"));
    };
    let dispatcher = Arc::clone(&state.dispatcher);
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        dispatcher.dispatch(rpc_request, session.as_ref())
    })
    .await;

    match outcome {
        Ok(response) => no_cache(render(response).await),
        Err(e) => {
            error!("RPC worker failed: {e}");
            no_cache(plain(StatusCode::INTERNAL_SERVER_ERROR, "RPC worker failed"))
        }
    }
}

/// Accepts multipart forms (the only way to upload), urlencoded forms, and
/// JSON bodies.
async fn parse_request(request: Request, limit: usize) -> Result<RpcRequest, RpcError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        return parse_multipart(request).await;
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| RpcError::BadRequest(e.to_string()))?;
        return Ok(RpcRequest::from_form(
            fields.get("funcname").cloned(),
            fields.get("args").map(String::as_str),
            fields.get("kwargs").map(String::as_str),
            None,
        ));
    }

    let body = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|e| RpcError::BadRequest(e.to_string()))?;
    RpcRequest::from_json_body(&body)
}

async fn parse_multipart(request: Request) -> Result<RpcRequest, RpcError> {
    let bad = |e: &dyn std::fmt::Display| RpcError::BadRequest(e.to_string());
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| bad(&e))?;

    let mut funcname = None;
    let mut args = None;
    let mut kwargs = None;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| bad(&e))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "funcname" => funcname = Some(field.text().await.map_err(|e| bad(&e))?),
            "args" => args = Some(field.text().await.map_err(|e| bad(&e))?),
            "kwargs" => kwargs = Some(field.text().await.map_err(|e| bad(&e))?),
            "uploadfile" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|e| bad(&e))?.to_vec();
                upload = Some(UploadedFile { filename, data });
            }
            other => debug!(field = other, "ignoring form field"),
        }
    }
    Ok(RpcRequest::from_form(funcname, args.as_deref(), kwargs.as_deref(), upload))
}

async fn render(response: RpcResponse) -> Response {
    match response {
        RpcResponse::Json { status, body } => (status, Json(body)).into_response(),
        RpcResponse::Empty => StatusCode::OK.into_response(),
        RpcResponse::Aborted { status, message } => plain(status, message),
        RpcResponse::Attachment {
            status,
            filename,
            source,
        } => {
            let data = match source {
                AttachmentSource::Bytes(data) => data,
                AttachmentSource::Path(path) => match tokio::fs::read(&path).await {
                    Ok(data) => data,
                    Err(e) => {
                        error!(path = %path.display(), "cannot read download: {e}");
                        return plain(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Could not read download \"{}\"", path.display()),
                        );
                    }
                },
            };
            let mut response = (status, Body::from(data)).into_response();
            attachment_headers(response.headers_mut(), &filename);
            response
        }
    }
}

fn attachment_headers(headers: &mut HeaderMap, filename: &str) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let quoted = filename.replace('"', "");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{quoted}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    match HeaderValue::from_str(filename) {
        Ok(value) => {
            headers.insert("filename", value);
        }
        Err(_) => warn!(filename, "download name is not a valid header value"),
    }
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

fn no_cache(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}
