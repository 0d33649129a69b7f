//! Copying a keyspace from one store to another.

use tracing::{debug, info};

use crate::error::StoreResult;
use crate::store::Store;

/// Outcome of a copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Keys written to the destination.
    pub copied: Vec<String>,
    /// Internal keys left behind.
    pub skipped: Vec<String>,
}

/// Keys with a leading underscore are reserved for the store itself.
pub fn is_internal_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Copy every non-internal key from `src` to `dst`, byte for byte.
///
/// Existing destination keys with the same name are replaced. Keys that
/// vanish from `src` mid-copy are skipped silently.
pub fn copy_store(src: &Store, dst: &Store) -> StoreResult<MigrationReport> {
    let mut report = MigrationReport::default();
    for key in src.keys(None)? {
        if is_internal_key(&key) {
            report.skipped.push(key);
            continue;
        }
        if let Some(bytes) = src.get_bytes(&key)? {
            dst.set_bytes(&key, &bytes)?;
            debug!(key = %key, bytes = bytes.len(), "migrated key");
            report.copied.push(key);
        }
    }
    info!(
        from = %src.uri(),
        to = %dst.uri(),
        copied = report.copied.len(),
        skipped = report.skipped.len(),
        "migration complete"
    );
    Ok(report)
}

/// Open both stores by URI and copy `src_uri` into `dst_uri`.
pub fn migrate(src_uri: &str, dst_uri: &str) -> StoreResult<MigrationReport> {
    let src = Store::open(src_uri)?;
    let dst = Store::open(dst_uri)?;
    copy_store(&src, &dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyRequest;
    use crate::record::User;
    use crate::settings::SETTINGS_KEY;
    use crate::store::{SaveOptions, StoreOptions};
    use serde_json::{json, Value};

    fn open(uri: &str, dir: &tempfile::TempDir) -> Store {
        Store::open_with(uri, StoreOptions::default().with_tempfolder(dir.path().join("tmp"))).unwrap()
    }

    #[test]
    fn internal_keys() {
        assert!(is_internal_key("_internal"));
        assert!(is_internal_key(SETTINGS_KEY));
        assert!(!is_internal_key("user::_x"));
    }

    #[test]
    fn copy_excludes_internal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let src = open("memory://", &dir);
        src.save_blob(&json!({"a": 1}), &KeyRequest::key("foo"), SaveOptions::default())
            .unwrap();
        src.save_blob("b", &KeyRequest::key("bar"), SaveOptions::default()).unwrap();
        src.save_blob(&0, &KeyRequest::key("_internal"), SaveOptions::default())
            .unwrap();
        src.save_user(&User::new("gus"), SaveOptions::default()).unwrap();

        let dst_uri = format!("file://{}", dir.path().join("dst").display());
        let dst = open(&dst_uri, &dir);
        let report = copy_store(&src, &dst).unwrap();

        let mut copied = report.copied.clone();
        copied.sort();
        assert_eq!(copied, vec!["bar", "foo", "user::gus"]);
        assert!(report.skipped.contains(&"_internal".to_string()));
        assert!(report.skipped.contains(&SETTINGS_KEY.to_string()));

        assert!(!dst.exists("_internal").unwrap());
        let foo: Value = dst.load_blob(&KeyRequest::key("foo")).unwrap();
        assert_eq!(foo, json!({"a": 1}));
        assert_eq!(dst.load_user("gus").unwrap().username, "gus");
    }

    #[test]
    fn destination_settings_are_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let src = open("memory://", &dir);
        let dst_dir = tempfile::tempdir().unwrap();
        let dst = Store::open_with(
            "memory://",
            StoreOptions::default().with_tempfolder(dst_dir.path()),
        )
        .unwrap();
        copy_store(&src, &dst).unwrap();
        assert_eq!(dst.tempfolder(), dst_dir.path());
    }

    #[test]
    fn migrate_by_uri() {
        let dir = tempfile::tempdir().unwrap();
        let src_uri = format!("sqlite:///{}", dir.path().join("src.db").display());
        let dst_uri = format!("sqlite:///{}", dir.path().join("dst.db").display());
        {
            let src = open(&src_uri, &dir);
            src.save_blob(&[1, 2, 3], &KeyRequest::key("numbers"), SaveOptions::default())
                .unwrap();
        }

        let report = migrate(&src_uri, &dst_uri).unwrap();
        assert_eq!(report.copied, vec!["numbers"]);

        let dst = open(&dst_uri, &dir);
        let numbers: Vec<i32> = dst.load_blob(&KeyRequest::key("numbers")).unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
