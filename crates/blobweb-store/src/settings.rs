//! Persisted store settings and the scratch temp-directory lifecycle.
//!
//! The settings record lives in the keyspace it configures, under
//! [`SETTINGS_KEY`]. Each store construction reads it, merges caller
//! overrides on top, and writes the result back, so every process sharing a
//! physical store converges on the same temp folder and separator.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::key::DEFAULT_SEPARATOR;
use crate::record::Record;
use crate::traits::Backend;

/// Reserved key of the settings record. The leading underscore keeps it out
/// of migrations.
pub const SETTINGS_KEY: &str = "_store_settings";

/// Settings shared by every handle onto one physical store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub tempfolder: PathBuf,
    pub separator: String,
    /// `true` only for the construction that created the record.
    pub is_new: bool,
}

impl StoreSettings {
    /// Merge caller overrides, previously stored values, and defaults, in
    /// that order of precedence.
    pub fn resolve(
        previous: Option<&StoreSettings>,
        tempfolder: Option<&Path>,
        separator: Option<&str>,
    ) -> Self {
        let tempfolder = tempfolder
            .map(Path::to_path_buf)
            .or_else(|| previous.map(|p| p.tempfolder.clone()))
            .unwrap_or_else(default_tempfolder);
        let separator = separator
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                previous
                    .map(|p| p.separator.clone())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string());
        Self {
            tempfolder,
            separator,
            is_new: previous.is_none(),
        }
    }
}

fn default_tempfolder() -> PathBuf {
    std::env::temp_dir().join(format!("blobweb-{}", Uuid::new_v4().simple()))
}

/// Load, merge, and write back the settings record, then make sure the temp
/// folder exists.
///
/// A record that cannot be read is fatal when `die` is set; otherwise it is
/// logged and replaced by defaults.
pub fn resolve_settings(
    backend: &dyn Backend,
    key: &str,
    tempfolder: Option<&Path>,
    separator: Option<&str>,
    die: bool,
) -> StoreResult<StoreSettings> {
    let previous = match read_settings(backend, key) {
        Ok(previous) => previous,
        Err(e) if die => return Err(StoreError::Settings(e.to_string())),
        Err(e) => {
            warn!(key, error = %e, "could not load store settings, using defaults");
            None
        }
    };

    let settings = StoreSettings::resolve(previous.as_ref(), tempfolder, separator);
    let bytes = Record::Settings(settings.clone()).to_bytes()?;
    backend.set(key, &bytes)?;
    ensure_tempfolder(&settings.tempfolder)?;

    debug!(
        tempfolder = %settings.tempfolder.display(),
        separator = %settings.separator,
        is_new = settings.is_new,
        "resolved store settings"
    );
    Ok(settings)
}

fn read_settings(backend: &dyn Backend, key: &str) -> StoreResult<Option<StoreSettings>> {
    let Some(bytes) = backend.get(key)? else {
        return Ok(None);
    };
    match Record::from_bytes(key, &bytes)? {
        Record::Settings(settings) => Ok(Some(settings)),
        other => Err(StoreError::Settings(format!(
            "{key} holds a {} record",
            other.kind()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Temp directories
// ---------------------------------------------------------------------------

fn temp_registry() -> &'static Mutex<HashSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Create `path` if it is missing and register it for removal by
/// [`cleanup_temp_dirs`]. A directory is created and registered at most
/// once per process; pre-existing directories are never registered.
pub fn ensure_tempfolder(path: &Path) -> StoreResult<()> {
    let mut registry = temp_registry().lock().expect("lock poisoned");
    if registry.contains(path) || path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    info!(path = %path.display(), "created temp folder");
    registry.insert(path.to_path_buf());
    Ok(())
}

/// A fresh scratch directory for deployments that run without a store.
pub fn create_scratch_dir() -> StoreResult<PathBuf> {
    let path = default_tempfolder();
    ensure_tempfolder(&path)?;
    Ok(path)
}

/// Remove every temp folder this process created. Best effort: failures
/// are logged. Returns the number of folders removed.
pub fn cleanup_temp_dirs() -> usize {
    let mut registry = temp_registry().lock().expect("lock poisoned");
    let mut removed = 0;
    for path in registry.drain() {
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed temp folder");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove temp folder"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    #[test]
    fn precedence_argument_then_previous_then_default() {
        let previous = StoreSettings {
            tempfolder: PathBuf::from("/tmp/previous"),
            separator: "/".into(),
            is_new: true,
        };

        let merged = StoreSettings::resolve(Some(&previous), None, None);
        assert_eq!(merged.tempfolder, PathBuf::from("/tmp/previous"));
        assert_eq!(merged.separator, "/");
        assert!(!merged.is_new);

        let merged = StoreSettings::resolve(Some(&previous), Some(Path::new("/tmp/arg")), Some("|"));
        assert_eq!(merged.tempfolder, PathBuf::from("/tmp/arg"));
        assert_eq!(merged.separator, "|");

        let fresh = StoreSettings::resolve(None, None, Some(""));
        assert_eq!(fresh.separator, DEFAULT_SEPARATOR);
        assert!(fresh.is_new);
        assert!(fresh.tempfolder.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn settings_are_written_back_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("scratch");
        let backend = InMemoryBackend::new();

        let first = resolve_settings(&backend, SETTINGS_KEY, Some(&temp), None, true).unwrap();
        assert!(first.is_new);
        assert!(temp.is_dir());
        assert!(backend.exists(SETTINGS_KEY).unwrap());

        let second = resolve_settings(&backend, SETTINGS_KEY, None, None, true).unwrap();
        assert!(!second.is_new);
        assert_eq!(second.tempfolder, first.tempfolder);
        assert_eq!(second.separator, first.separator);
    }

    #[test]
    fn unreadable_settings_tolerated_unless_die() {
        let dir = tempfile::tempdir().unwrap();
        let backend = InMemoryBackend::new();
        backend.set(SETTINGS_KEY, b"not json").unwrap();

        let err = resolve_settings(&backend, SETTINGS_KEY, Some(dir.path()), None, true).unwrap_err();
        assert!(matches!(err, StoreError::Settings(_)));

        let settings = resolve_settings(&backend, SETTINGS_KEY, Some(dir.path()), None, false).unwrap();
        assert!(settings.is_new);
        // Written back over the garbage.
        let stored = Record::from_bytes(SETTINGS_KEY, &backend.get(SETTINGS_KEY).unwrap().unwrap());
        assert!(matches!(stored, Ok(Record::Settings(_))));
    }

    #[test]
    fn existing_directories_are_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        ensure_tempfolder(dir.path()).unwrap();
        let registry = temp_registry().lock().unwrap();
        assert!(!registry.contains(dir.path()));
    }

    #[test]
    fn scratch_dirs_are_created_and_cleaned() {
        let path = create_scratch_dir().unwrap();
        assert!(path.is_dir());
        assert!(temp_registry().lock().unwrap().contains(&path));
        cleanup_temp_dirs();
        assert!(!path.exists());
    }
}
