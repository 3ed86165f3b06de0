//! # Credential Store
//!
//! Process-wide cache of credentials keyed by server authority
//! (`scheme://host:port`).
//!
//! ## Overview
//!
//! Credentials enter the store when the user types them or when a resolve
//! succeeds with them. They leave it when invalidated explicitly or when the
//! backend rejects them `failures_before_invalidate` times in a row. Nothing
//! is persisted; keeping credentials across restarts is the host's concern.
//!
//! Most callers share [`CredentialStore::global`]; tests and isolated
//! sessions create their own instance.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use core_runtime::config::AuthConfig;
use core_vfs::{Credential, ResourceLocator};

static GLOBAL_STORE: Lazy<Arc<CredentialStore>> = Lazy::new(|| {
    Arc::new(CredentialStore::new(
        AuthConfig::default().failures_before_invalidate,
    ))
});

#[derive(Clone)]
struct CachedCredential {
    credential: Credential,
    consecutive_failures: u32,
    stored_at: DateTime<Utc>,
}

/// Credential cache keyed by server authority.
pub struct CredentialStore {
    entries: RwLock<HashMap<String, CachedCredential>>,
    failures_before_invalidate: u32,
}

impl CredentialStore {
    pub fn new(failures_before_invalidate: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            failures_before_invalidate: failures_before_invalidate.max(1),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.failures_before_invalidate)
    }

    /// Shared, process-wide store.
    pub fn global() -> Arc<CredentialStore> {
        Arc::clone(&GLOBAL_STORE)
    }

    /// Caches `credential` for the server `locator` points at.
    pub fn put(&self, locator: &ResourceLocator, credential: Credential) {
        let key = locator.authority_key();
        debug!(authority = %key, login = %credential.login(), "Caching credential");
        self.entries.write().insert(
            key,
            CachedCredential {
                credential,
                consecutive_failures: 0,
                stored_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, locator: &ResourceLocator) -> Option<Credential> {
        self.entries
            .read()
            .get(&locator.authority_key())
            .map(|cached| cached.credential.clone())
    }

    /// When the credential for `locator`'s server was cached.
    pub fn stored_at(&self, locator: &ResourceLocator) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .get(&locator.authority_key())
            .map(|cached| cached.stored_at)
    }

    /// Returns `locator` with the cached credential embedded, unless it
    /// already carries one.
    pub fn apply(&self, locator: &ResourceLocator) -> ResourceLocator {
        if locator.credential().is_some() {
            return locator.clone();
        }
        match self.get(locator) {
            Some(credential) => locator.with_credential(credential),
            None => locator.clone(),
        }
    }

    /// Drops the cached credential. Returns whether one was present.
    pub fn invalidate(&self, locator: &ResourceLocator) -> bool {
        let removed = self
            .entries
            .write()
            .remove(&locator.authority_key())
            .is_some();
        if removed {
            info!(authority = %locator.authority_key(), "Invalidated cached credential");
        }
        removed
    }

    /// Counts a rejection of the cached credential and invalidates it once
    /// the threshold is reached. Returns whether it was invalidated.
    pub fn record_failure(&self, locator: &ResourceLocator) -> bool {
        let key = locator.authority_key();
        let mut entries = self.entries.write();
        let Some(cached) = entries.get_mut(&key) else {
            return false;
        };

        cached.consecutive_failures += 1;
        if cached.consecutive_failures >= self.failures_before_invalidate {
            entries.remove(&key);
            info!(authority = %key, "Invalidated credential after repeated failures");
            true
        } else {
            false
        }
    }

    pub fn record_success(&self, locator: &ResourceLocator) {
        if let Some(cached) = self.entries.write().get_mut(&locator.authority_key()) {
            cached.consecutive_failures = 0;
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut authorities: Vec<String> = self.entries.read().keys().cloned().collect();
        authorities.sort();
        f.debug_struct("CredentialStore")
            .field("authorities", &authorities)
            .field("failures_before_invalidate", &self.failures_before_invalidate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(path: &str) -> ResourceLocator {
        ResourceLocator::parse(&format!("smb://nas.local{}", path)).unwrap()
    }

    #[test]
    fn test_credentials_keyed_by_authority() {
        let store = CredentialStore::new(1);
        store.put(&share("/music"), Credential::new("carol", "pw"));

        assert_eq!(
            store.get(&share("/photos/2024")),
            Some(Credential::new("carol", "pw"))
        );
        assert!(store.stored_at(&share("/")).is_some());
        assert!(store
            .get(&ResourceLocator::parse("smb://other.local/music").unwrap())
            .is_none());
    }

    #[test]
    fn test_apply_keeps_explicit_credential() {
        let store = CredentialStore::new(1);
        store.put(&share("/"), Credential::new("cached", "pw"));

        let explicit = share("/x").with_credential(Credential::new("typed", "pw2"));
        assert_eq!(
            store.apply(&explicit).credential().unwrap().login(),
            "typed"
        );
        assert_eq!(
            store.apply(&share("/x")).credential().unwrap().login(),
            "cached"
        );
    }

    #[test]
    fn test_record_failure_invalidates_after_threshold() {
        let store = CredentialStore::new(2);
        store.put(&share("/"), Credential::new("carol", "old"));

        assert!(!store.record_failure(&share("/")));
        store.record_success(&share("/"));
        assert!(!store.record_failure(&share("/")));
        assert!(store.record_failure(&share("/")));
        assert!(store.get(&share("/")).is_none());
        assert!(!store.record_failure(&share("/")));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let store = CredentialStore::default();
        store.put(&share("/"), Credential::new("carol", "pw"));
        assert!(store.invalidate(&share("/a")));
        assert!(!store.invalidate(&share("/a")));

        store.put(&share("/"), Credential::new("carol", "pw"));
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_debug_lists_authorities_only() {
        let store = CredentialStore::new(1);
        store.put(&share("/"), Credential::new("carol", "topsecret"));
        let debug = format!("{:?}", store);
        assert!(debug.contains("smb://nas.local:445"));
        assert!(!debug.contains("topsecret"));
    }

    #[test]
    fn test_global_store_is_shared() {
        let first = CredentialStore::global();
        let second = CredentialStore::global();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
