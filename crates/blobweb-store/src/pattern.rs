use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

/// Shell-glob key filter (`*`, `?`, `[...]`).
///
/// Backends with native pattern support receive the raw pattern string;
/// everything else filters its full key listing with [`KeyPattern::matches`].
#[derive(Clone, Debug)]
pub struct KeyPattern {
    raw: String,
    compiled: glob::Pattern,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> StoreResult<Self> {
        let compiled = glob::Pattern::new(pattern).map_err(|e| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, key: &str) -> bool {
        self.compiled.matches(key)
    }
}

impl FromStr for KeyPattern {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        Self::new(s)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_prefix() {
        let p = KeyPattern::new("f*").unwrap();
        assert!(p.matches("foo"));
        assert!(p.matches("f"));
        assert!(!p.matches("bar"));
        assert!(!p.matches("afoo"));
    }

    #[test]
    fn literal_matches_exactly() {
        let p = KeyPattern::new("bar").unwrap();
        assert!(p.matches("bar"));
        assert!(!p.matches("barn"));
        assert!(!p.matches("rebar"));
    }

    #[test]
    fn question_mark_and_classes() {
        let p = KeyPattern::new("user::?o[bx]").unwrap();
        assert!(p.matches("user::bob"));
        assert!(p.matches("user::box"));
        assert!(!p.matches("user::bod"));
    }

    #[test]
    fn separators_are_not_special() {
        let p = KeyPattern::new("task*").unwrap();
        assert!(p.matches("task::a/b"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = KeyPattern::new("[unclosed").unwrap_err();
        assert!(matches!(err, StoreError::InvalidPattern { .. }));
    }

    #[test]
    fn parse_and_display() {
        let p: KeyPattern = "a*".parse().unwrap();
        assert_eq!(p.to_string(), "a*");
        assert_eq!(p.as_str(), "a*");
    }
}
