//! Request dispatch: lookup, tier checks, invocation, and response shaping.
//!
//! Nothing here returns an error to the transport. Every failure, including
//! a panicking handler, becomes an [`RpcResponse`]:
//!
//! | Situation                         | Response                           |
//! |-----------------------------------|------------------------------------|
//! | name not a string / not found     | 200 `{"error": ...}`               |
//! | tier `disabled`                   | 403                                |
//! | tier check failed                 | 401 or 403                         |
//! | upload without a file             | 400                                |
//! | handler returned `{"error": ...}` | 200 `{"error": ...}`               |
//! | handler failed or panicked        | 500 `{"exception": ...}`           |
//! | handler failed with [`Abort`]     | the abort's status                 |
//! | download of a path / a buffer     | 201 / 200 attachment               |

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use blobweb_store::Store;
use chrono::Utc;
use http::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::error::RpcError;
use crate::handler::{Abort, CallContext, Reply};
use crate::notify::Notifier;
use crate::registry::{CallType, Registry, Validation};
use crate::request::{RpcRequest, UploadedFile};
use crate::response::{AttachmentSource, RpcResponse, DEFAULT_DOWNLOAD_NAME};
use crate::session::Session;

/// Routes parsed requests to registered handlers.
pub struct Dispatcher {
    registry: Registry,
    store: Option<Arc<Store>>,
    tempfolder: PathBuf,
    config: DispatchConfig,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Dispatcher {
    /// Uploads are written to `tempfolder`.
    pub fn new(registry: Registry, tempfolder: impl Into<PathBuf>, config: DispatchConfig) -> Self {
        Self {
            registry,
            store: None,
            tempfolder: tempfolder.into(),
            config,
            notifier: None,
        }
    }

    /// Give handlers access to `store`. Uploads move to the store's temp
    /// folder.
    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.tempfolder = store.tempfolder().to_path_buf();
        self.store = Some(store);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> Option<&Arc<Store>> {
        self.store.as_ref()
    }

    pub fn tempfolder(&self) -> &Path {
        &self.tempfolder
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one call. Blocks for as long as the handler does.
    pub fn dispatch(&self, request: RpcRequest, session: Option<&Session>) -> RpcResponse {
        let summary = request.summary();
        let RpcRequest {
            funcname,
            mut args,
            kwargs,
            upload,
        } = request;

        let name = match funcname {
            Value::String(name) => name,
            other => return RpcResponse::error(RpcError::InvalidName(other.to_string()).to_string()),
        };
        let Some(rpc) = self.registry.get(&name) else {
            debug!(rpc = %name, "unknown RPC requested");
            return RpcResponse::error(RpcError::UnknownRpc(name).to_string());
        };

        if let Err(e) = check_tier(rpc.validation, session, self.config.use_users) {
            warn!(rpc = %name, validation = %rpc.validation, "RPC refused: {e}");
            return RpcResponse::aborted(e.status(), e.to_string());
        }

        let user = session.map_or("no user", |s| s.username.as_str());

        let uploaded = match (rpc.call_type, upload) {
            (CallType::Upload, None) => {
                return RpcResponse::aborted(
                    StatusCode::BAD_REQUEST,
                    "upload RPC requires an uploadfile part",
                )
            }
            (CallType::Upload, Some(file)) => match self.save_upload(&file) {
                Ok(path) => {
                    args.insert(0, Value::String(path.display().to_string()));
                    Some(path)
                }
                Err(e) => {
                    let err = anyhow::anyhow!("Could not save uploaded file: {e}");
                    return self.report_failure(&name, user, &summary, err);
                }
            },
            _ => None,
        };

        if self.config.logging_mode.is_full() {
            info!(rpc = %name, user, "RPC called");
        } else {
            debug!(rpc = %name, user, "RPC called");
        }

        let ctx = CallContext {
            name: &name,
            session,
            store: self.store.as_deref(),
            tempfolder: &self.tempfolder,
        };
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| rpc.handler.call(&ctx, args, kwargs)));
        let elapsed = started.elapsed();

        if let Some(path) = uploaded {
            if let Err(e) = fs::remove_file(&path) {
                debug!(path = %path.display(), "could not remove uploaded file: {e}");
            }
        }

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return self.report_failure(&name, user, &summary, err),
            Err(payload) => {
                let err = anyhow::anyhow!("RPC panicked: {}", panic_message(payload.as_ref()));
                return self.report_failure(&name, user, &summary, err);
            }
        };

        if let Reply::Value(Value::Object(map)) = &reply {
            if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
                return RpcResponse::ok(json!({ "error": error }));
            }
        }

        if self.config.logging_mode.is_full() {
            info!(rpc = %name, user, elapsed_ms = elapsed.as_millis() as u64, "RPC finished");
        } else {
            debug!(rpc = %name, user, elapsed_ms = elapsed.as_millis() as u64, "RPC finished");
        }

        match rpc.call_type {
            CallType::Download => download_response(&name, reply),
            CallType::Normal | CallType::Upload => json_response(reply),
        }
    }

    fn save_upload(&self, file: &UploadedFile) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.tempfolder)?;
        let path = self.tempfolder.join(secure_filename(&file.filename));
        fs::write(&path, &file.data)?;
        debug!(path = %path.display(), bytes = file.data.len(), "saved upload");
        Ok(path)
    }

    /// Log, notify, and shape a handler failure.
    fn report_failure(&self, name: &str, user: &str, summary: &str, err: anyhow::Error) -> RpcResponse {
        let short = err.to_string();
        let trace: String = format!("{err:?}")
            .chars()
            .take(self.config.trace_limit)
            .collect();
        let tracemsg = format!(
            "|{}| [{}] <{}> Exception during RPC \"{}\" \nRequest: {} \n{}",
            self.config.host,
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            user,
            name,
            summary,
            trace
        );
        error!("{tracemsg}");
        self.notify(tracemsg.clone());

        if let Some(abort) = err.downcast_ref::<Abort>() {
            return RpcResponse::aborted(abort.status, abort.message.clone());
        }
        RpcResponse::exception(format!("{short}\n\nException details:\n{tracemsg}"))
    }

    fn notify(&self, message: String) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("rpc-notify".into())
            .spawn(move || {
                if let Err(e) = notifier.notify(&message) {
                    warn!("could not send notification: {e}");
                }
            });
        if let Err(e) = spawned {
            warn!("could not start notification thread: {e}");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rpcs", &self.registry.len())
            .field("tempfolder", &self.tempfolder)
            .field("config", &self.config)
            .field("has_store", &self.store.is_some())
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}

/// Enforce a validation tier. Only `disabled` applies without user
/// management.
pub fn check_tier(
    validation: Validation,
    session: Option<&Session>,
    use_users: bool,
) -> Result<(), RpcError> {
    if validation == Validation::Disabled {
        return Err(RpcError::Forbidden("RPC is disabled".into()));
    }
    if !use_users {
        return Ok(());
    }
    match validation {
        Validation::Disabled | Validation::None => Ok(()),
        Validation::Any => match session {
            Some(s) if s.is_anonymous || s.is_authenticated => Ok(()),
            _ => Err(RpcError::Unauthorized("a session is required".into())),
        },
        Validation::Named => match session {
            Some(s) if s.is_named() => Ok(()),
            _ => Err(RpcError::Unauthorized("a logged-in user is required".into())),
        },
        Validation::Admin => match session {
            Some(s) if s.is_named() && s.is_admin => Ok(()),
            Some(s) if s.is_named() => Err(RpcError::Forbidden("admin rights are required".into())),
            _ => Err(RpcError::Unauthorized("a logged-in admin is required".into())),
        },
    }
}

fn json_response(reply: Reply) -> RpcResponse {
    match reply {
        Reply::None | Reply::Value(Value::Null) => RpcResponse::Empty,
        Reply::Value(value) => RpcResponse::ok(value),
        Reply::File { path, .. } => RpcResponse::ok(Value::String(path.display().to_string())),
        Reply::Bytes { .. } => RpcResponse::error("Binary output requires a download RPC"),
    }
}

fn download_response(name: &str, reply: Reply) -> RpcResponse {
    match reply {
        Reply::None => RpcResponse::error(format!(
            "Could not find resource to download from RPC \"{name}\": result is None"
        )),
        Reply::Value(Value::String(path)) => file_attachment(PathBuf::from(path), None),
        Reply::File { path, filename } => file_attachment(path, filename),
        Reply::Bytes { data, filename } => RpcResponse::Attachment {
            status: StatusCode::OK,
            filename: filename.unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string()),
            source: AttachmentSource::Bytes(data),
        },
        Reply::Value(_) => RpcResponse::error("Unrecognized RPC output"),
    }
}

fn file_attachment(path: PathBuf, filename: Option<String>) -> RpcResponse {
    let filename = filename
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string());
    RpcResponse::Attachment {
        status: StatusCode::CREATED,
        filename,
        source: AttachmentSource::Path(path),
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Path separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped, and leading/trailing `.`/`_` are
/// trimmed. An empty result becomes `upload`.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
