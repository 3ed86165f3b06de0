//! Login/secret pairs presented to authenticating backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A login and secret for one authority.
///
/// The secret is never printed: `Debug` redacts it and the locator's
/// normalized form omits it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    login: String,
    secret: String,
}

impl Credential {
    pub fn new(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            secret: secret.into(),
        }
    }

    /// Credential with a login and no secret (anonymous FTP, guest shares).
    pub fn login_only(login: impl Into<String>) -> Self {
        Self::new(login, String::new())
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("alice", "hunter2");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_equality_compares_secret() {
        assert_eq!(Credential::new("a", "x"), Credential::new("a", "x"));
        assert_ne!(Credential::new("a", "x"), Credential::new("a", "y"));
        assert!(!Credential::login_only("guest").has_secret());
    }
}
