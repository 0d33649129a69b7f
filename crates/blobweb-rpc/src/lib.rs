//! RPC registry and dispatcher for blobweb.
//!
//! Functions are registered by name in a [`Registry`] together with a
//! [`CallType`] and a [`Validation`] tier. A [`Dispatcher`] turns an
//! [`RpcRequest`] plus the caller's [`Session`] into an [`RpcResponse`]:
//!
//! ```text
//! request -> name lookup -> tier check -> [save upload] -> handler -> shape
//! ```
//!
//! The crate is transport-neutral. `blobweb-server` maps requests and
//! responses to HTTP.
//!
//! # Validation tiers
//!
//! | Tier       | Who may call                          |
//! |------------|---------------------------------------|
//! | `disabled` | nobody (403)                          |
//! | `none`     | everybody                             |
//! | `any`      | any session, anonymous included (401) |
//! | `named`    | a logged-in user (401)                |
//! | `admin`    | a logged-in admin (401 / 403)         |
//!
//! All but `disabled` are only enforced when user management is enabled.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod notify;
pub mod registry;
pub mod request;
pub mod response;
pub mod session;
pub mod tasks;

pub use config::{local_host_name, DispatchConfig, LoggingMode, DEFAULT_TRACE_LIMIT};
pub use dispatcher::{check_tier, secure_filename, Dispatcher};
pub use error::{RpcError, RpcResult};
pub use handler::{arg, Abort, CallContext, Reply, RpcHandler};
pub use notify::{Notifier, WebhookConfig, WebhookNotifier};
pub use registry::{CallType, RegisterOutcome, Registry, Rpc, RpcOptions, Validation};
pub use request::{RpcRequest, UploadedFile};
pub use response::{AttachmentSource, RpcResponse, DEFAULT_DOWNLOAD_NAME};
pub use session::Session;
pub use tasks::{register_task_rpcs, TaskFn, TaskQueue, ThreadTaskQueue};
