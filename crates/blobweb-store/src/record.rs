use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::key::Keyed;
use crate::settings::StoreSettings;

/// Object type used to namespace user records.
pub const USER_OBJTYPE: &str = "user";

/// Object type used to namespace task records.
pub const TASK_OBJTYPE: &str = "task";

/// The kind of record stored under a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Blob,
    User,
    Task,
    Settings,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "Blob"),
            Self::User => write!(f, "User"),
            Self::Task => write!(f, "Task"),
            Self::Settings => write!(f, "Settings"),
        }
    }
}

/// A stored record: kind tag plus the record body.
///
/// Records are encoded as JSON objects with a `kind` field. Decoding is the
/// only place a payload is interpreted, so a byte string that fails here is
/// reported as [`StoreError::Deserialize`], distinct from a missing key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Record {
    Blob(Blob),
    User(User),
    Task(Task),
    Settings(StoreSettings),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Blob(_) => RecordKind::Blob,
            Self::User(_) => RecordKind::User,
            Self::Task(_) => RecordKind::Task,
            Self::Settings(_) => RecordKind::Settings,
        }
    }

    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(key: &str, data: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(data).map_err(|e| StoreError::Deserialize {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn into_blob(self) -> Result<Blob, Self> {
        match self {
            Self::Blob(blob) => Ok(blob),
            other => Err(other),
        }
    }

    pub fn into_user(self) -> Result<User, Self> {
        match self {
            Self::User(user) => Ok(user),
            other => Err(other),
        }
    }

    pub fn into_task(self) -> Result<Task, Self> {
        match self {
            Self::Task(task) => Ok(task),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Envelope pairing an arbitrary payload with its identity and history.
///
/// `modified` is never empty: it starts with the creation time and every
/// save appends the save time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub key: String,
    pub objtype: Option<String>,
    pub uid: String,
    pub created: DateTime<Utc>,
    pub modified: Vec<DateTime<Utc>>,
    pub payload: Value,
}

impl Blob {
    /// Wrap a payload. A missing uid is generated.
    pub fn new(key: impl Into<String>, objtype: Option<String>, uid: Option<String>, payload: Value) -> Self {
        let created = Utc::now();
        Self {
            key: key.into(),
            objtype,
            uid: uid.unwrap_or_else(|| Uuid::new_v4().to_string()),
            created,
            modified: vec![created],
            payload,
        }
    }

    /// Replace the payload and record the save time.
    pub fn save(&mut self, payload: Value) -> DateTime<Utc> {
        self.payload = payload;
        self.touch()
    }

    /// Append the current time to the modification history.
    pub fn touch(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.modified.push(now);
        now
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.modified.last().copied().unwrap_or(self.created)
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

impl Keyed for Blob {
    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    fn objtype(&self) -> Option<&str> {
        self.objtype.as_deref()
    }

    fn uid(&self) -> Option<&str> {
        Some(&self.uid)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user account record, stored under `user<separator>username`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub displayname: String,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            displayname: username.clone(),
            username,
            email: String::new(),
            is_admin: false,
            is_active: true,
            created: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

impl Keyed for User {
    fn objtype(&self) -> Option<&str> {
        Some(USER_OBJTYPE)
    }

    fn uid(&self) -> Option<&str> {
        Some(&self.username)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Lifecycle state of a background task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Started,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Started => write!(f, "started"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A background task record, stored under `task<separator>uid`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub uid: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub queued: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(task_name: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            task_name: task_name.into(),
            status: TaskStatus::Queued,
            args,
            kwargs,
            result: None,
            error: None,
            queued: Utc::now(),
            started: None,
            stopped: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Started;
        self.started = Some(Utc::now());
    }

    pub fn complete(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.stopped = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(error.into());
        self.stopped = Some(Utc::now());
    }

    /// Wall-clock run time, once the task has started and stopped.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.stopped? - self.started?)
    }
}

impl Keyed for Task {
    fn objtype(&self) -> Option<&str> {
        Some(TASK_OBJTYPE)
    }

    fn uid(&self) -> Option<&str> {
        Some(&self.uid)
    }
}
