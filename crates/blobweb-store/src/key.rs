//! Key derivation for the store keyspace.
//!
//! Every record lives under a string key whose canonical form is
//! `objtype<separator>uid`. Callers may supply any subset of an explicit
//! key, an object type, a uid, or an object carrying those fields; the
//! [`KeyCodec`] merges them in a fixed order of precedence:
//!
//! 1. explicit request fields
//! 2. fields carried by the object ([`Keyed`])
//! 3. fields derived by splitting an explicit key on the separator
//! 4. a freshly generated uid
//!
//! Resolution is pure except for one existence probe against the backend,
//! which lets a caller pass a bare uid where a typed key was expected.

use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Maximum length of a resolved key, in characters.
pub const MAX_KEY_LEN: usize = 255;

/// Separator placed between an object type and a uid.
pub const DEFAULT_SEPARATOR: &str = "::";

/// Anything that can contribute key fields during resolution.
///
/// Fields that return `None` (or an empty string) are treated as missing.
pub trait Keyed {
    fn key(&self) -> Option<&str> {
        None
    }

    fn objtype(&self) -> Option<&str> {
        None
    }

    fn uid(&self) -> Option<&str> {
        None
    }
}

/// Caller-supplied key fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRequest {
    pub key: Option<String>,
    pub objtype: Option<String>,
    pub uid: Option<String>,
}

impl KeyRequest {
    /// An empty request: a uid will be generated.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for an explicit key.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// A request for `objtype<separator>uid`.
    pub fn typed(objtype: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            key: None,
            objtype: Some(objtype.into()),
            uid: Some(uid.into()),
        }
    }

    pub fn with_objtype(mut self, objtype: impl Into<String>) -> Self {
        self.objtype = Some(objtype.into());
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }
}

impl From<&str> for KeyRequest {
    fn from(key: &str) -> Self {
        Self::key(key)
    }
}

impl From<String> for KeyRequest {
    fn from(key: String) -> Self {
        Self::key(key)
    }
}

/// The outcome of key resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub objtype: Option<String>,
    pub uid: Option<String>,
}

/// Builds and resolves keys for one separator.
#[derive(Clone, Copy, Debug)]
pub struct KeyCodec<'a> {
    separator: &'a str,
}

impl<'a> KeyCodec<'a> {
    pub fn new(separator: &'a str) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> &str {
        self.separator
    }

    /// `objtype<separator>uid`, or the bare uid when there is no type.
    pub fn make_key(&self, objtype: Option<&str>, uid: &str) -> String {
        match objtype {
            Some(objtype) => format!("{objtype}{}{uid}", self.separator),
            None => uid.to_string(),
        }
    }

    /// Resolve a key from whatever fields are available.
    ///
    /// `exists` is consulted only when an object type is known and the
    /// resolved key is absent, to check whether `objtype<separator>key`
    /// names an existing record instead.
    pub fn resolve<F>(
        &self,
        request: &KeyRequest,
        obj: Option<&dyn Keyed>,
        force_type: bool,
        mut exists: F,
    ) -> StoreResult<ResolvedKey>
    where
        F: FnMut(&str) -> StoreResult<bool>,
    {
        let mut key = present(request.key.as_deref()).or_else(|| obj.and_then(|o| present(o.key())));
        let mut objtype =
            present(request.objtype.as_deref()).or_else(|| obj.and_then(|o| present(o.objtype())));
        let mut uid = present(request.uid.as_deref()).or_else(|| obj.and_then(|o| present(o.uid())));

        if let Some(key) = key.as_deref() {
            if objtype.is_none() || uid.is_none() {
                let parts: Vec<&str> = key.split(self.separator).collect();
                if let [head, tail] = parts.as_slice() {
                    if objtype.is_none() {
                        objtype = present(Some(*head));
                    }
                    if uid.is_none() {
                        uid = present(Some(*tail));
                    }
                }
            }
        }

        let mut key = match key.take() {
            Some(key) => key,
            None => {
                let uid = uid.get_or_insert_with(|| Uuid::new_v4().to_string());
                self.make_key(objtype.as_deref(), uid)
            }
        };

        if let Some(objtype) = objtype.as_deref() {
            if !exists(&key)? {
                let typed = self.make_key(Some(objtype), &key);
                if exists(&typed)? {
                    key = typed;
                }
            }
        }

        if force_type {
            if let Some(objtype) = objtype.as_deref() {
                let head = key.split(self.separator).next().unwrap_or_default();
                if head != objtype {
                    key = self.make_key(Some(objtype), &key);
                }
            }
        }

        let len = key.chars().count();
        if len > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong {
                len,
                max: MAX_KEY_LEN,
            });
        }

        Ok(ResolvedKey { key, objtype, uid })
    }
}

fn present(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn absent(_: &str) -> StoreResult<bool> {
        Ok(false)
    }

    fn codec() -> KeyCodec<'static> {
        KeyCodec::new(DEFAULT_SEPARATOR)
    }

    struct Named {
        uid: &'static str,
    }

    impl Keyed for Named {
        fn objtype(&self) -> Option<&str> {
            Some("project")
        }

        fn uid(&self) -> Option<&str> {
            Some(self.uid)
        }
    }

    #[test]
    fn explicit_key_is_kept() {
        let resolved = codec()
            .resolve(&KeyRequest::key("testkey"), None, true, absent)
            .unwrap();
        assert_eq!(resolved.key, "testkey");
        assert_eq!(resolved.objtype, None);
        assert_eq!(resolved.uid, None);
    }

    #[test]
    fn typed_request_builds_canonical_key() {
        let resolved = codec()
            .resolve(&KeyRequest::typed("user", "alice"), None, true, absent)
            .unwrap();
        assert_eq!(resolved.key, "user::alice");
        assert_eq!(resolved.uid.as_deref(), Some("alice"));
    }

    #[test]
    fn key_is_split_into_missing_fields() {
        let resolved = codec()
            .resolve(&KeyRequest::key("task::1234"), None, true, absent)
            .unwrap();
        assert_eq!(resolved.key, "task::1234");
        assert_eq!(resolved.objtype.as_deref(), Some("task"));
        assert_eq!(resolved.uid.as_deref(), Some("1234"));
    }

    #[test]
    fn key_with_extra_separators_is_not_split() {
        let resolved = codec()
            .resolve(&KeyRequest::key("a::b::c"), None, true, absent)
            .unwrap();
        assert_eq!(resolved.objtype, None);
        assert_eq!(resolved.uid, None);
    }

    #[test]
    fn missing_everything_generates_uid() {
        let resolved = codec().resolve(&KeyRequest::new(), None, true, absent).unwrap();
        let uid = resolved.uid.expect("uid generated");
        assert_eq!(resolved.key, uid);
        assert!(Uuid::parse_str(&uid).is_ok());
    }

    #[test]
    fn object_fields_fill_gaps() {
        let obj = Named { uid: "p1" };
        let resolved = codec()
            .resolve(&KeyRequest::new(), Some(&obj), true, absent)
            .unwrap();
        assert_eq!(resolved.key, "project::p1");

        let resolved = codec()
            .resolve(&KeyRequest::new().with_uid("p2"), Some(&obj), true, absent)
            .unwrap();
        assert_eq!(resolved.key, "project::p2");
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let request = KeyRequest {
            key: Some(String::new()),
            objtype: Some("user".into()),
            uid: Some("bob".into()),
        };
        let resolved = codec().resolve(&request, None, true, absent).unwrap();
        assert_eq!(resolved.key, "user::bob");
    }

    #[test]
    fn force_type_prefixes_bare_uid() {
        let request = KeyRequest::key("alice").with_objtype("user");
        let resolved = codec().resolve(&request, None, true, absent).unwrap();
        assert_eq!(resolved.key, "user::alice");

        let resolved = codec().resolve(&request, None, false, absent).unwrap();
        assert_eq!(resolved.key, "alice");
    }

    #[test]
    fn probe_prefers_existing_typed_key() {
        let stored: HashSet<&str> = ["task::abc"].into_iter().collect();
        let request = KeyRequest::key("abc").with_objtype("task");
        let resolved = codec()
            .resolve(&request, None, false, |k| Ok(stored.contains(k)))
            .unwrap();
        assert_eq!(resolved.key, "task::abc");
    }

    #[test]
    fn probe_is_skipped_without_objtype() {
        let mut probes = 0;
        codec()
            .resolve(&KeyRequest::key("plain"), None, true, |_| {
                probes += 1;
                Ok(false)
            })
            .unwrap();
        assert_eq!(probes, 0);
    }

    #[test]
    fn probe_errors_propagate() {
        let request = KeyRequest::typed("user", "x");
        let err = codec()
            .resolve(&request, None, true, |_| Err(StoreError::NotFound("boom".into())))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn key_length_bound() {
        let ok = "k".repeat(MAX_KEY_LEN);
        assert!(codec().resolve(&KeyRequest::key(ok), None, true, absent).is_ok());

        let long = "k".repeat(MAX_KEY_LEN + 1);
        let err = codec()
            .resolve(&KeyRequest::key(long), None, true, absent)
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLong { len: 256, max: 255 }));
    }

    #[test]
    fn typed_key_over_bound_is_rejected() {
        let uid = "u".repeat(250);
        let err = codec()
            .resolve(&KeyRequest::typed("project", uid), None, true, absent)
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLong { .. }));
    }

    #[test]
    fn custom_separator() {
        let codec = KeyCodec::new("/");
        let resolved = codec
            .resolve(&KeyRequest::typed("user", "carol"), None, true, absent)
            .unwrap();
        assert_eq!(resolved.key, "user/carol");
        assert_eq!(codec.separator(), "/");
    }

    proptest! {
        #[test]
        fn forced_keys_start_with_objtype(
            objtype in "[a-z]{1,12}",
            uid in "[0-9][a-zA-Z0-9_-]{0,39}",
        ) {
            let request = KeyRequest::key(uid.clone()).with_objtype(objtype.clone());
            let resolved = codec().resolve(&request, None, true, absent).unwrap();
            let prefix = format!("{objtype}::");
            prop_assert!(resolved.key.starts_with(&prefix));
        }

        #[test]
        fn bare_keys_without_separator_are_untouched(key in "[a-zA-Z0-9_.-]{1,80}") {
            let resolved = codec().resolve(&KeyRequest::key(key.clone()), None, true, absent).unwrap();
            prop_assert_eq!(resolved.key, key);
        }
    }
}
