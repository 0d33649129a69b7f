use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use blobweb_rpc::{local_host_name, DispatchConfig, LoggingMode, WebhookConfig, DEFAULT_TRACE_LIMIT};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Application settings, usually read from a TOML file.
///
/// ```toml
/// logging_mode = "quiet"
///
/// [server]
/// port = 9000
///
/// [datastore]
/// enabled = true
/// url = "sqlite:///app.db"
///
/// [users]
/// enabled = true
/// tokens = { "s3cret" = "admin" }
///
/// [notifications]
/// webhook = "https://hooks.example.com/T000/B000"
/// to = "#alerts"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerSection,
    pub datastore: DatastoreSection,
    pub users: UsersSection,
    pub tasks: TasksSection,
    /// Exception reports go here when set.
    pub notifications: Option<WebhookConfig>,
    pub logging_mode: LoggingMode,
    /// Recorded for handlers that render plots; the server does not use it.
    pub plotting_backend: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Concurrent RPC dispatches.
    pub max_workers: usize,
    pub max_request_bytes: usize,
    /// Answer cross-origin requests permissively.
    pub cors: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            max_workers: 30,
            max_request_bytes: 64 * 1024 * 1024,
            cors: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatastoreSection {
    pub enabled: bool,
    pub url: String,
    pub tempfolder: Option<PathBuf>,
    pub separator: Option<String>,
}

impl Default for DatastoreSection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "sqlite:///datastore.db".into(),
            tempfolder: None,
            separator: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsersSection {
    pub enabled: bool,
    /// Bearer token to username.
    pub tokens: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TasksSection {
    pub enabled: bool,
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn bind_addr(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid listen address: {e}")))
    }

    /// User tiers need somewhere to keep users.
    pub fn use_users(&self) -> bool {
        self.datastore.enabled && self.users.enabled
    }

    /// Tasks are recorded in the datastore.
    pub fn use_tasks(&self) -> bool {
        self.datastore.enabled && self.tasks.enabled
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            use_users: self.use_users(),
            logging_mode: self.logging_mode,
            trace_limit: DEFAULT_TRACE_LIMIT,
            host: local_host_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AppConfig::default();
        assert_eq!(c.bind_addr().unwrap(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(c.server.max_workers, 30);
        assert!(!c.datastore.enabled);
        assert_eq!(c.datastore.url, "sqlite:///datastore.db");
        assert!(c.notifications.is_none());
        assert!(c.logging_mode.is_full());
        assert!(!c.use_users());
    }

    #[test]
    fn parse_toml() {
        let c = AppConfig::from_toml_str(
            r##"
            logging_mode = "quiet"
            plotting_backend = "Agg"

            [server]
            port = 9000
            max_workers = 4

            [datastore]
            enabled = true
            url = "memory://"

            [users]
            enabled = true
            tokens = { "t0k" = "root" }

            [notifications]
            webhook = "https://hooks.example.com/x"
            to = "#ops"
            "##,
        )
        .unwrap();
        assert_eq!(c.server.port, 9000);
        assert_eq!(c.server.host, "127.0.0.1");
        assert_eq!(c.logging_mode, LoggingMode::Quiet);
        assert!(c.use_users());
        assert!(!c.use_tasks());
        assert_eq!(c.users.tokens.get("t0k").map(String::as_str), Some("root"));
        assert_eq!(c.notifications.unwrap().to.as_deref(), Some("#ops"));

        let dispatch = AppConfig::from_toml_str("[users]\nenabled = true").unwrap().dispatch_config();
        assert!(!dispatch.use_users);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AppConfig::from_toml_str("[server]\nprot = 1").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn toml_round_trip() {
        let mut c = AppConfig::default();
        c.tasks.enabled = true;
        let text = c.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobweb.toml");
        std::fs::write(&path, "[server]\nport = 1234\n").unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().server.port, 1234);
        assert!(AppConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
