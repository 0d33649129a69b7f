/// The caller identity a session provider resolved for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub is_anonymous: bool,
    pub is_authenticated: bool,
    pub is_admin: bool,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            username: "anonymous".into(),
            is_anonymous: true,
            is_authenticated: false,
            is_admin: false,
        }
    }

    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_anonymous: false,
            is_authenticated: true,
            is_admin: false,
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::user(username)
        }
    }

    /// A concrete, logged-in, non-anonymous user.
    pub fn is_named(&self) -> bool {
        self.is_authenticated && !self.is_anonymous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_variants() {
        let a = Session::anonymous();
        assert!(a.is_anonymous);
        assert!(!a.is_named());

        let u = Session::user("alice");
        assert_eq!(u.username, "alice");
        assert!(u.is_named());
        assert!(!u.is_admin);

        let root = Session::admin("root");
        assert!(root.is_named());
        assert!(root.is_admin);
    }
}
