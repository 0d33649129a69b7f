//! The backend-agnostic store façade.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{open_backend, InMemoryBackend};
use crate::error::{StoreError, StoreResult};
use crate::key::{KeyCodec, KeyRequest, Keyed, ResolvedKey};
use crate::pattern::KeyPattern;
use crate::record::{Blob, Record, RecordKind, Task, User, TASK_OBJTYPE, USER_OBJTYPE};
use crate::settings::{resolve_settings, StoreSettings, SETTINGS_KEY};
use crate::traits::Backend;

/// Construction options.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Overrides the stored temp folder.
    pub tempfolder: Option<PathBuf>,
    /// Overrides the stored key separator.
    pub separator: Option<String>,
    pub settings_key: String,
    /// Fail construction when the stored settings cannot be read.
    pub die: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            tempfolder: None,
            separator: None,
            settings_key: SETTINGS_KEY.to_string(),
            die: false,
        }
    }
}

impl StoreOptions {
    pub fn with_tempfolder(mut self, tempfolder: impl Into<PathBuf>) -> Self {
        self.tempfolder = Some(tempfolder.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }
}

/// Options for the typed save operations.
#[derive(Clone, Copy, Debug)]
pub struct SaveOptions {
    pub overwrite: bool,
    pub force_type: bool,
    pub die: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            force_type: true,
            die: true,
        }
    }
}

impl SaveOptions {
    /// Refuse to replace an existing record, failing with `Duplicate`.
    pub fn no_overwrite() -> Self {
        Self {
            overwrite: false,
            ..Self::default()
        }
    }

    /// Like [`SaveOptions::no_overwrite`], but log instead of failing.
    pub fn tolerant() -> Self {
        Self {
            overwrite: false,
            die: false,
            ..Self::default()
        }
    }
}

/// Options for the typed load operations.
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    pub force_type: bool,
    /// Missing or mismatched records are errors rather than `None`.
    pub die: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            force_type: true,
            die: true,
        }
    }
}

impl LoadOptions {
    pub fn tolerant() -> Self {
        Self {
            die: false,
            ..Self::default()
        }
    }
}

/// Typed storage over one backend.
///
/// Keys are resolved through [`KeyCodec`] on every call and never cached.
/// Every record is encoded as tagged JSON, so `set` followed by `get`
/// returns an equal [`Record`].
///
/// # Example
///
/// ```
/// use blobweb_store::{KeyRequest, SaveOptions, Store};
///
/// let store = Store::in_memory().unwrap();
/// let key = store
///     .save_blob(&vec![1, 2, 3], &KeyRequest::key("numbers"), SaveOptions::default())
///     .unwrap();
/// let numbers: Vec<i32> = store.load_blob(&KeyRequest::key(key)).unwrap();
/// assert_eq!(numbers, vec![1, 2, 3]);
/// ```
pub struct Store {
    backend: Box<dyn Backend>,
    uri: String,
    settings_key: String,
    settings: StoreSettings,
}

impl Store {
    /// Open the backend named by `uri` with default options.
    pub fn open(uri: &str) -> StoreResult<Self> {
        Self::open_with(uri, StoreOptions::default())
    }

    pub fn open_with(uri: &str, options: StoreOptions) -> StoreResult<Self> {
        let backend = open_backend(uri)?;
        Self::with_backend(backend, uri, options)
    }

    /// A store over a fresh in-memory backend.
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_backend(
            Box::new(InMemoryBackend::new()),
            "memory://",
            StoreOptions::default(),
        )
    }

    /// Wrap an already-open backend and resolve its settings.
    pub fn with_backend(
        backend: Box<dyn Backend>,
        uri: impl Into<String>,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        let settings = resolve_settings(
            backend.as_ref(),
            &options.settings_key,
            options.tempfolder.as_deref(),
            options.separator.as_deref(),
            options.die,
        )?;
        let uri = uri.into();
        info!(uri = %uri, backend = %backend.describe(), is_new = settings.is_new, "opened store");
        Ok(Self {
            backend,
            uri,
            settings_key: options.settings_key,
            settings,
        })
    }

    /// Re-read the settings record, applying the given overrides.
    pub fn reload_settings(
        &mut self,
        tempfolder: Option<&Path>,
        separator: Option<&str>,
        die: bool,
    ) -> StoreResult<&StoreSettings> {
        self.settings = resolve_settings(
            self.backend.as_ref(),
            &self.settings_key,
            tempfolder,
            separator,
            die,
        )?;
        Ok(&self.settings)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn settings_key(&self) -> &str {
        &self.settings_key
    }

    pub fn tempfolder(&self) -> &Path {
        &self.settings.tempfolder
    }

    pub fn separator(&self) -> &str {
        &self.settings.separator
    }

    pub fn is_new(&self) -> bool {
        self.settings.is_new
    }

    pub fn codec(&self) -> KeyCodec<'_> {
        KeyCodec::new(&self.settings.separator)
    }

    /// Resolve a key against this store, probing the backend as needed.
    pub fn resolve_key(
        &self,
        request: &KeyRequest,
        obj: Option<&dyn Keyed>,
        force_type: bool,
    ) -> StoreResult<ResolvedKey> {
        self.codec()
            .resolve(request, obj, force_type, |key| self.backend.exists(key))
    }

    // -----------------------------------------------------------------------
    // Primitives
    // -----------------------------------------------------------------------

    pub fn set(&self, key: &str, record: &Record) -> StoreResult<()> {
        let bytes = record.to_bytes()?;
        self.backend.set(key, &bytes)?;
        debug!(key, kind = %record.kind(), "set record");
        Ok(())
    }

    /// Read the record under `key`. A missing key is `Ok(None)`; bytes
    /// that do not decode are a `Deserialize` error.
    pub fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        match self.backend.get(key)? {
            Some(bytes) => Record::from_bytes(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_required(&self, key: &str) -> StoreResult<Record> {
        self.get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Raw bytes under `key`, undecoded.
    pub fn get_bytes(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.backend.get(key)
    }

    pub fn set_bytes(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        self.backend.set(key, data)
    }

    /// Remove `key`. Missing keys are not an error.
    pub fn delete(&self, key: &str) -> StoreResult<()> {
        self.backend.delete(key)?;
        info!(key, "deleted key");
        Ok(())
    }

    pub fn exists(&self, key: &str) -> StoreResult<bool> {
        self.backend.exists(key)
    }

    /// List keys, optionally filtered by a glob pattern.
    pub fn keys(&self, pattern: Option<&str>) -> StoreResult<Vec<String>> {
        match pattern {
            Some(pattern) => self.backend.keys_matching(&KeyPattern::new(pattern)?),
            None => self.backend.keys(),
        }
    }

    /// Every record matching `pattern`, in backend enumeration order.
    /// Keys that disappear between listing and reading are skipped.
    pub fn items(&self, pattern: Option<&str>) -> StoreResult<IndexMap<String, Record>> {
        let mut items = IndexMap::new();
        for key in self.keys(pattern)? {
            if let Some(record) = self.get(&key)? {
                items.insert(key, record);
            }
        }
        Ok(items)
    }

    /// Remove every key, the settings record included.
    pub fn flush(&self) -> StoreResult<()> {
        self.backend.flush()?;
        warn!(uri = %self.uri, "flushed store");
        Ok(())
    }

    /// Log the first and last `limit` keys. Returns the total key count.
    pub fn log_keys(&self, limit: usize) -> StoreResult<usize> {
        let mut keys = self.keys(None)?;
        keys.sort();
        let total = keys.len();
        if total <= limit * 2 {
            info!(total, "store keys: {}", keys.join(", "));
        } else {
            info!(
                total,
                "store keys: {} ... {}",
                keys[..limit].join(", "),
                keys[total - limit..].join(", ")
            );
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Blobs
    // -----------------------------------------------------------------------

    /// Save `obj` as the payload of a blob, returning the resolved key.
    ///
    /// An existing blob is updated in place (`created` and `uid` kept, a
    /// modification timestamp appended) unless `overwrite` is off.
    pub fn save_blob<T: Serialize + ?Sized>(
        &self,
        obj: &T,
        request: &KeyRequest,
        options: SaveOptions,
    ) -> StoreResult<String> {
        let payload =
            serde_json::to_value(obj).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let resolved = self.resolve_key(request, None, options.force_type)?;
        let key = resolved.key;

        let blob = match self.get(&key)? {
            Some(Record::Blob(mut blob)) => {
                if !options.overwrite {
                    return self.refuse_overwrite(RecordKind::Blob, key, options.die);
                }
                blob.save(payload);
                blob
            }
            Some(other) => {
                return Err(StoreError::TypeMismatch {
                    key,
                    expected: RecordKind::Blob,
                    found: other.kind(),
                })
            }
            None => Blob::new(key.clone(), resolved.objtype, resolved.uid, payload),
        };

        self.set(&key, &Record::Blob(blob))?;
        info!(key = %key, "saved blob");
        Ok(key)
    }

    /// Load and decode a blob payload, failing if it is missing.
    pub fn load_blob<T: DeserializeOwned>(&self, request: &KeyRequest) -> StoreResult<T> {
        let blob = self.load_required(request, RecordKind::Blob, true, Record::into_blob)?;
        decode_payload(blob)
    }

    pub fn load_blob_with<T: DeserializeOwned>(
        &self,
        request: &KeyRequest,
        options: LoadOptions,
    ) -> StoreResult<Option<T>> {
        match self.load_blob_record(request, options)? {
            Some(blob) => decode_payload(blob).map(Some),
            None => Ok(None),
        }
    }

    /// Load the blob envelope itself, with its history.
    pub fn load_blob_record(
        &self,
        request: &KeyRequest,
        options: LoadOptions,
    ) -> StoreResult<Option<Blob>> {
        let record = self.load_checked(request, None, RecordKind::Blob, options)?;
        Ok(record.and_then(|r| r.into_blob().ok()))
    }

    pub fn delete_blob(&self, request: &KeyRequest) -> StoreResult<String> {
        let key = self.resolve_key(request, None, true)?.key;
        self.delete(&key)?;
        Ok(key)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn save_user(&self, user: &User, options: SaveOptions) -> StoreResult<String> {
        let key = self
            .resolve_key(&KeyRequest::new(), Some(user as &dyn Keyed), options.force_type)?
            .key;
        self.save_record(key, Record::User(user.clone()), options)
    }

    /// Load a user by name, failing if it is missing.
    pub fn load_user(&self, username: &str) -> StoreResult<User> {
        self.load_user_with(username, LoadOptions::default())?
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }

    pub fn load_user_with(&self, username: &str, options: LoadOptions) -> StoreResult<Option<User>> {
        let request = KeyRequest::key(username).with_objtype(USER_OBJTYPE);
        let record = self.load_checked(&request, Some(USER_OBJTYPE), RecordKind::User, options)?;
        Ok(record.and_then(|r| r.into_user().ok()))
    }

    pub fn delete_user(&self, username: &str) -> StoreResult<String> {
        let request = KeyRequest::key(username).with_objtype(USER_OBJTYPE);
        let key = self.resolve_key(&request, None, true)?.key;
        self.delete(&key)?;
        Ok(key)
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn save_task(&self, task: &Task, options: SaveOptions) -> StoreResult<String> {
        let key = self
            .resolve_key(&KeyRequest::new(), Some(task as &dyn Keyed), options.force_type)?
            .key;
        self.save_record(key, Record::Task(task.clone()), options)
    }

    /// Load a task by id. Missing or mismatched records yield `None`.
    pub fn load_task(&self, uid: &str) -> StoreResult<Option<Task>> {
        self.load_task_with(uid, LoadOptions::tolerant())
    }

    pub fn load_task_with(&self, uid: &str, options: LoadOptions) -> StoreResult<Option<Task>> {
        let request = KeyRequest::key(uid).with_objtype(TASK_OBJTYPE);
        let record = self.load_checked(&request, Some(TASK_OBJTYPE), RecordKind::Task, options)?;
        Ok(record.and_then(|r| r.into_task().ok()))
    }

    pub fn delete_task(&self, uid: &str) -> StoreResult<String> {
        let request = KeyRequest::key(uid).with_objtype(TASK_OBJTYPE);
        let key = self.resolve_key(&request, None, true)?.key;
        self.delete(&key)?;
        Ok(key)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn save_record(&self, key: String, record: Record, options: SaveOptions) -> StoreResult<String> {
        let kind = record.kind();
        if let Some(existing) = self.get(&key)? {
            if existing.kind() != kind {
                return Err(StoreError::TypeMismatch {
                    key,
                    expected: kind,
                    found: existing.kind(),
                });
            }
            if !options.overwrite {
                return self.refuse_overwrite(kind, key, options.die);
            }
        }
        self.set(&key, &record)?;
        info!(key = %key, %kind, "saved record");
        Ok(key)
    }

    fn refuse_overwrite(&self, kind: RecordKind, key: String, die: bool) -> StoreResult<String> {
        if die {
            return Err(StoreError::Duplicate { kind, key });
        }
        warn!(key = %key, %kind, "record exists and overwrite is disabled, not saving");
        Ok(key)
    }

    /// Fetch the record under `request`, turning absence or a kind other
    /// than `expected` into an error naming the resolved key.
    fn load_required<R>(
        &self,
        request: &KeyRequest,
        expected: RecordKind,
        force_type: bool,
        extract: impl FnOnce(Record) -> Result<R, Record>,
    ) -> StoreResult<R> {
        let key = self.resolve_key(request, None, force_type)?.key;
        let record = self
            .get(&key)?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        extract(record).map_err(|other| StoreError::TypeMismatch {
            key,
            expected,
            found: other.kind(),
        })
    }

    fn load_checked(
        &self,
        request: &KeyRequest,
        objtype: Option<&str>,
        expected: RecordKind,
        options: LoadOptions,
    ) -> StoreResult<Option<Record>> {
        let mut request = request.clone();
        if request.objtype.is_none() {
            request.objtype = objtype.map(str::to_string);
        }
        if options.die {
            let same_kind = |r: Record| if r.kind() == expected { Ok(r) } else { Err(r) };
            return self
                .load_required(&request, expected, options.force_type, same_kind)
                .map(Some);
        }
        let key = self.resolve_key(&request, None, options.force_type)?.key;

        match self.get(&key)? {
            None => {
                debug!(key = %key, %expected, "record not found");
                Ok(None)
            }
            Some(record) if record.kind() == expected => Ok(Some(record)),
            Some(record) => {
                warn!(key = %key, %expected, found = %record.kind(), "record has the wrong kind");
                Ok(None)
            }
        }
    }
}

fn decode_payload<T: DeserializeOwned>(blob: Blob) -> StoreResult<T> {
    let key = blob.key.clone();
    serde_json::from_value(blob.into_payload()).map_err(|e| StoreError::Deserialize {
        key,
        reason: e.to_string(),
    })
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("uri", &self.uri)
            .field("backend", &self.backend.describe())
            .field("settings", &self.settings)
            .finish()
    }
}
