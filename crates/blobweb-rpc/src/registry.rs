use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::LoggingMode;
use crate::handler::{CallContext, Reply, RpcHandler};

/// How a call's request and response are shaped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// JSON in, JSON out.
    #[default]
    Normal,
    /// Multipart form with an `uploadfile` part; the saved path is
    /// prepended to the positional args.
    Upload,
    /// The result is a file or buffer sent as an attachment.
    Download,
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
        }
    }
}

impl FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            other => Err(format!("unknown call type {other:?}")),
        }
    }
}

/// Who may invoke an RPC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    /// Nobody: always 403.
    Disabled,
    /// Everybody.
    #[default]
    None,
    /// Any session, anonymous included.
    Any,
    /// A logged-in, non-anonymous user.
    Named,
    /// A logged-in admin.
    Admin,
}

impl Validation {
    /// Parse a tier name. Unknown names mean [`Validation::None`].
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "disabled" => Self::Disabled,
            "none" => Self::None,
            "any" => Self::Any,
            "named" => Self::Named,
            "admin" => Self::Admin,
            other => {
                warn!(tier = other, "unknown validation tier, treating as none");
                Self::None
            }
        }
    }
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::None => write!(f, "none"),
            Self::Any => write!(f, "any"),
            Self::Named => write!(f, "named"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Registration options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RpcOptions {
    pub call_type: CallType,
    pub validation: Validation,
    /// Replace an existing registration with the same name.
    pub override_existing: bool,
}

impl RpcOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn override_existing(mut self) -> Self {
        self.override_existing = true;
        self
    }
}

/// A registered RPC.
#[derive(Clone)]
pub struct Rpc {
    pub name: String,
    pub handler: Arc<dyn RpcHandler>,
    pub call_type: CallType,
    pub validation: Validation,
}

impl std::fmt::Debug for Rpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rpc")
            .field("name", &self.name)
            .field("call_type", &self.call_type)
            .field("validation", &self.validation)
            .finish()
    }
}

/// What a registration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    Replaced,
    /// The name was taken and overriding was not requested.
    Rejected,
}

/// Name-to-handler table.
///
/// Names are unique. A duplicate registration without
/// [`RpcOptions::override_existing`] is logged and ignored rather than
/// raised, so a startup script can register the same RPC twice.
#[derive(Debug, Default)]
pub struct Registry {
    rpcs: BTreeMap<String, Rpc>,
    logging_mode: LoggingMode,
    route_active: bool,
}

impl Registry {
    pub fn new(logging_mode: LoggingMode) -> Self {
        Self {
            rpcs: BTreeMap::new(),
            logging_mode,
            route_active: false,
        }
    }

    /// Register a closure or function.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F, options: RpcOptions) -> RegisterOutcome
    where
        F: Fn(&CallContext<'_>, Vec<Value>, Map<String, Value>) -> anyhow::Result<Reply>
            + Send
            + Sync
            + 'static,
    {
        self.register_handler(name, Arc::new(handler), options)
    }

    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn RpcHandler>,
        options: RpcOptions,
    ) -> RegisterOutcome {
        let name = name.into();
        let exists = self.rpcs.contains_key(&name);
        if exists && !options.override_existing {
            warn!(rpc = %name, "RPC already exists and override is not set, ignoring registration");
            return RegisterOutcome::Rejected;
        }
        if exists && self.logging_mode.is_full() {
            warn!(rpc = %name, "overriding existing RPC");
        }

        self.rpcs.insert(
            name.clone(),
            Rpc {
                name: name.clone(),
                handler,
                call_type: options.call_type,
                validation: options.validation,
            },
        );

        if !self.route_active {
            self.route_active = true;
            info!("RPC route activated");
        }
        debug!(rpc = %name, call_type = %options.call_type, validation = %options.validation, "registered RPC");

        if exists {
            RegisterOutcome::Replaced
        } else {
            RegisterOutcome::Added
        }
    }

    pub fn get(&self, name: &str) -> Option<&Rpc> {
        self.rpcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rpcs.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rpcs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rpcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rpcs.is_empty()
    }

    /// `true` once anything has been registered; the HTTP route is only
    /// mounted after that.
    pub fn route_active(&self) -> bool {
        self.route_active
    }

    pub fn logging_mode(&self) -> LoggingMode {
        self.logging_mode
    }
}
