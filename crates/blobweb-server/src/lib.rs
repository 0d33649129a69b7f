//! HTTP server for blobweb.
//!
//! Builds a [`WebApp`] from an [`AppConfig`], lets the embedding program
//! register RPCs and task functions, and serves them at `POST /rpcs` (also
//! `/api/rpcs`) with axum. Sessions come from a [`SessionProvider`]; with
//! user management on, bearer tokens are mapped to stored users.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{AnonymousSessions, Credentials, SessionProvider, TokenSessions};
pub use config::{AppConfig, DatastoreSection, ServerSection, TasksSection, UsersSection};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::{WebApp, WebServer};
