use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobweb_rpc::{
    register_task_rpcs, CallContext, Dispatcher, RegisterOutcome, Registry, Reply, RpcOptions,
    ThreadTaskQueue, WebhookNotifier,
};
use blobweb_store::{cleanup_temp_dirs, create_scratch_dir, Store, StoreOptions};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::{AnonymousSessions, SessionProvider, TokenSessions};
use crate::config::AppConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

const STARTUP_KEY_LISTING: usize = 20;

/// An application under construction: the store is open, RPCs and tasks
/// are being registered.
pub struct WebApp {
    config: AppConfig,
    store: Option<Arc<Store>>,
    tempfolder: PathBuf,
    registry: Registry,
    tasks: Option<Arc<ThreadTaskQueue>>,
    sessions: Option<Arc<dyn SessionProvider>>,
}

impl WebApp {
    /// Open the datastore (or a scratch directory without one) and set up
    /// the task RPCs when enabled.
    pub fn new(config: AppConfig) -> ServerResult<Self> {
        let (store, tempfolder) = if config.datastore.enabled {
            let store = open_store(&config)?;
            let tempfolder = store.tempfolder().to_path_buf();
            (Some(Arc::new(store)), tempfolder)
        } else {
            let tempfolder = create_scratch_dir()?;
            info!(tempfolder = %tempfolder.display(), "running without a datastore");
            (None, tempfolder)
        };

        let mut registry = Registry::new(config.logging_mode);
        let tasks = match (&store, config.tasks.enabled) {
            (Some(store), true) => {
                let queue = Arc::new(ThreadTaskQueue::new(Arc::clone(store)));
                register_task_rpcs(&mut registry, queue.clone());
                Some(queue)
            }
            (None, true) => {
                warn!("tasks need a datastore, task RPCs are not available");
                None
            }
            _ => None,
        };

        Ok(Self {
            config,
            store,
            tempfolder,
            registry,
            tasks,
            sessions: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<Store>> {
        self.store.as_ref()
    }

    pub fn tempfolder(&self) -> &Path {
        &self.tempfolder
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Expose `handler` as an RPC.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F, options: RpcOptions) -> RegisterOutcome
    where
        F: Fn(&CallContext<'_>, Vec<Value>, Map<String, Value>) -> anyhow::Result<Reply>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, handler, options)
    }

    /// Make `func` launchable through `launch_task`. Fails when tasks are
    /// not enabled.
    pub fn register_task<F>(&self, name: impl Into<String>, func: F) -> ServerResult<()>
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let queue = self
            .tasks
            .as_ref()
            .ok_or_else(|| ServerError::Config("tasks are not enabled".into()))?;
        queue.register(name, func);
        Ok(())
    }

    /// Replace the session provider chosen from the config.
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Freeze the registry and build the server.
    pub fn into_server(self) -> ServerResult<WebServer> {
        let bind_addr = self.config.bind_addr()?;
        let sessions = match self.sessions {
            Some(sessions) => sessions,
            None => default_sessions(&self.config, self.store.as_ref()),
        };

        let mut dispatcher = Dispatcher::new(self.registry, self.tempfolder, self.config.dispatch_config());
        if let Some(store) = self.store {
            dispatcher = dispatcher.with_store(store);
        }
        if let Some(webhook) = &self.config.notifications {
            dispatcher = dispatcher.with_notifier(Arc::new(WebhookNotifier::new(webhook.clone())));
        }

        let state = AppState::new(dispatcher, sessions, self.config.server.max_workers)
            .with_max_request_bytes(self.config.server.max_request_bytes);
        Ok(WebServer {
            bind_addr,
            cors: self.config.server.cors,
            state,
        })
    }
}

fn open_store(config: &AppConfig) -> ServerResult<Store> {
    let mut options = StoreOptions::default();
    if let Some(tempfolder) = &config.datastore.tempfolder {
        options = options.with_tempfolder(tempfolder);
    }
    if let Some(separator) = &config.datastore.separator {
        options = options.with_separator(separator);
    }
    let store = Store::open_with(&config.datastore.url, options)?;
    info!(datastore = %store.describe(), new = store.is_new(), "datastore ready");
    if config.logging_mode.is_full() {
        store.log_keys(STARTUP_KEY_LISTING)?;
    }
    Ok(store)
}

fn default_sessions(config: &AppConfig, store: Option<&Arc<Store>>) -> Arc<dyn SessionProvider> {
    match store {
        Some(store) if config.use_users() => {
            Arc::new(TokenSessions::from_config(&config.users.tokens).with_store(Arc::clone(store)))
        }
        _ => Arc::new(AnonymousSessions),
    }
}

/// A configured blobweb HTTP server.
pub struct WebServer {
    bind_addr: SocketAddr,
    cors: bool,
    state: AppState,
}

impl WebServer {
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.cors)
    }

    /// Serve until Ctrl-C, then remove the temp directories this process
    /// created.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!("blobweb server listening on {}", self.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let removed = cleanup_temp_dirs();
        info!(removed, "server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
