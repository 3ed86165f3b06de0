//! # Authenticating Resolver
//!
//! Wraps any [`Resolver`] with the authentication-failure contract:
//!
//! 1. Embed the cached credential for the server, if any, and resolve.
//! 2. On `AuthenticationFailure`, count the failure against the cached
//!    credential, ask the [`CredentialPrompt`] and rebuild the locator from
//!    the original one plus the new credential. Nothing from the failed
//!    attempt is reused.
//! 3. On success, cache the credential that worked.
//!
//! Attempts are bounded by [`AuthConfig::max_attempts`]. Other errors are
//! returned unchanged.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_runtime::config::AuthConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_vfs::{FileHandle, ResourceLocator, Resolver, VfsError, VfsResult};

use crate::error::{AuthError, Result};
use crate::prompt::{CredentialPrompt, CredentialResponse};
use crate::store::CredentialStore;

pub struct Authenticator {
    resolver: Arc<dyn Resolver>,
    store: Arc<CredentialStore>,
    prompt: Option<Arc<dyn CredentialPrompt>>,
    max_attempts: u32,
    event_bus: Option<EventBus>,
}

impl Authenticator {
    pub fn new(resolver: Arc<dyn Resolver>, store: Arc<CredentialStore>) -> Self {
        Self {
            resolver,
            store,
            prompt: None,
            max_attempts: AuthConfig::default().max_attempts,
            event_bus: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_config(mut self, config: &AuthConfig) -> Self {
        self.max_attempts = config.max_attempts.max(1);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Resolves `locator`, prompting for credentials as needed.
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn authenticate(&self, locator: &ResourceLocator) -> Result<FileHandle> {
        let original = locator.without_credential();
        let mut candidate = self.store.apply(locator);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match self.resolver.resolve(&candidate).await {
                Ok(handle) => {
                    if let Some(credential) = candidate.credential() {
                        self.store.put(&original, credential.clone());
                        self.emit(AuthEvent::Authenticated {
                            locator: original.to_string(),
                            login: credential.login().to_string(),
                        });
                    }
                    debug!(attempt, "Resolved");
                    return Ok(handle);
                }
                Err(error) if error.is_authentication_failure() => error,
                Err(error) => return Err(AuthError::Vfs(error)),
            };

            let reason = match &error {
                VfsError::AuthenticationFailure { reason, .. } => reason.clone(),
                _ => None,
            };
            warn!(attempt, reason = ?reason, "Authentication failed");
            self.emit(AuthEvent::AuthenticationFailed {
                locator: original.to_string(),
                reason: reason.clone(),
                attempt,
            });

            if candidate.credential().is_some()
                && self.store.get(&original).as_ref() == candidate.credential()
                && self.store.record_failure(&original)
            {
                self.emit(AuthEvent::CredentialsInvalidated {
                    authority: original.authority_key(),
                });
            }

            if attempt >= self.max_attempts {
                return Err(AuthError::AttemptsExhausted {
                    locator: original,
                    attempts: attempt,
                });
            }

            let Some(prompt) = &self.prompt else {
                return Err(AuthError::Vfs(error));
            };

            self.emit(AuthEvent::CredentialsRequested {
                locator: original.to_string(),
                reason: reason.clone(),
            });

            match prompt.request_credentials(&original, reason.as_deref()).await {
                CredentialResponse::Provided(credential) => {
                    candidate = original.with_credential(credential);
                }
                CredentialResponse::Cancelled => {
                    info!("Credential prompt cancelled");
                    self.emit(AuthEvent::PromptCancelled {
                        locator: original.to_string(),
                    });
                    return Err(AuthError::Cancelled { locator: original });
                }
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}

#[async_trait]
impl Resolver for Authenticator {
    async fn resolve(&self, locator: &ResourceLocator) -> VfsResult<FileHandle> {
        self.authenticate(locator).await.map_err(VfsError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_vfs::{BackendKind, CapabilitySet, Credential, FileBackend, FileStat};
    use mockall::{mock, predicate};
    use parking_lot::Mutex;

    mock! {
        LocatorResolver {}

        #[async_trait]
        impl Resolver for LocatorResolver {
            async fn resolve(&self, locator: &ResourceLocator) -> VfsResult<FileHandle>;
        }
    }

    struct StubBackend;

    #[async_trait]
    impl FileBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Ftp
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::read_only()
        }

        async fn stat(&self, _locator: &ResourceLocator) -> VfsResult<FileStat> {
            Ok(FileStat::directory(None))
        }
    }

    /// Returns scripted answers and records what it was asked.
    struct ScriptedPrompt {
        answers: Mutex<Vec<CredentialResponse>>,
        asked: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedPrompt {
        fn new(answers: Vec<CredentialResponse>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into_iter().rev().collect()),
                asked: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CredentialPrompt for ScriptedPrompt {
        async fn request_credentials(
            &self,
            locator: &ResourceLocator,
            reason: Option<&str>,
        ) -> CredentialResponse {
            assert!(locator.credential().is_none());
            self.asked
                .lock()
                .push((locator.to_string(), reason.map(str::to_string)));
            self.answers
                .lock()
                .pop()
                .unwrap_or(CredentialResponse::Cancelled)
        }
    }

    fn server() -> ResourceLocator {
        ResourceLocator::parse("ftp://files.example.com/pub").unwrap()
    }

    fn ok_handle(locator: &ResourceLocator) -> VfsResult<FileHandle> {
        Ok(FileHandle::from_parts(
            locator.clone(),
            Arc::new(StubBackend),
            FileStat::directory(None),
        ))
    }

    /// Accepts only `bob:right`.
    fn password_checking_resolver() -> MockLocatorResolver {
        let mut resolver = MockLocatorResolver::new();
        resolver.expect_resolve().returning(|locator| {
            match locator.credential() {
                Some(c) if c.login() == "bob" && c.secret() == "right" => ok_handle(locator),
                Some(_) => Err(VfsError::authentication(
                    locator,
                    Some("530 Login incorrect".to_string()),
                )),
                None => Err(VfsError::authentication(locator, None)),
            }
        });
        resolver
    }

    #[tokio::test]
    async fn test_prompt_then_cache_credential() {
        let store = Arc::new(CredentialStore::new(1));
        let prompt = ScriptedPrompt::new(vec![
            CredentialResponse::Provided(Credential::new("bob", "wrong")),
            CredentialResponse::Provided(Credential::new("bob", "right")),
        ]);
        let authenticator = Authenticator::new(Arc::new(password_checking_resolver()), store.clone())
            .with_prompt(prompt.clone());

        let handle = authenticator.authenticate(&server()).await.unwrap();
        assert_eq!(handle.locator().credential().unwrap().secret(), "right");
        assert_eq!(store.get(&server()), Some(Credential::new("bob", "right")));

        let asked = prompt.asked.lock().clone();
        assert_eq!(asked.len(), 2);
        assert_eq!(asked[0].1, None);
        assert_eq!(asked[1].1.as_deref(), Some("530 Login incorrect"));
    }

    #[tokio::test]
    async fn test_cached_credential_used_without_prompt() {
        let store = Arc::new(CredentialStore::new(1));
        store.put(&server(), Credential::new("bob", "right"));
        let prompt = ScriptedPrompt::new(vec![]);
        let authenticator = Authenticator::new(Arc::new(password_checking_resolver()), store)
            .with_prompt(prompt.clone());

        authenticator.authenticate(&server()).await.unwrap();
        assert!(prompt.asked.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stale_cached_credential_is_invalidated() {
        let bus = EventBus::new(32);
        let mut events = bus.subscribe();
        let store = Arc::new(CredentialStore::new(1));
        store.put(&server(), Credential::new("bob", "stale"));
        let prompt = ScriptedPrompt::new(vec![CredentialResponse::Provided(Credential::new(
            "bob", "right",
        ))]);
        let authenticator = Authenticator::new(Arc::new(password_checking_resolver()), store.clone())
            .with_prompt(prompt)
            .with_event_bus(bus);

        authenticator.authenticate(&server()).await.unwrap();
        assert_eq!(store.get(&server()).unwrap().secret(), "right");

        let mut saw_invalidation = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoreEvent::Auth(AuthEvent::CredentialsInvalidated { .. })) {
                saw_invalidation = true;
            }
        }
        assert!(saw_invalidation);
    }

    #[tokio::test]
    async fn test_cancelled_prompt() {
        let store = Arc::new(CredentialStore::new(1));
        let authenticator = Authenticator::new(Arc::new(password_checking_resolver()), store.clone())
            .with_prompt(ScriptedPrompt::new(vec![CredentialResponse::Cancelled]));

        let err = authenticator.authenticate(&server()).await.unwrap_err();
        assert_eq!(err, AuthError::Cancelled { locator: server() });
        assert!(store.is_empty());

        let as_vfs: VfsError = err.into();
        assert!(as_vfs.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let store = Arc::new(CredentialStore::new(1));
        let prompt = ScriptedPrompt::new(vec![
            CredentialResponse::Provided(Credential::new("bob", "a")),
            CredentialResponse::Provided(Credential::new("bob", "b")),
            CredentialResponse::Provided(Credential::new("bob", "c")),
        ]);
        let authenticator = Authenticator::new(Arc::new(password_checking_resolver()), store)
            .with_prompt(prompt.clone())
            .with_max_attempts(2);

        let err = authenticator.authenticate(&server()).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::AttemptsExhausted {
                locator: server(),
                attempts: 2
            }
        );
        assert_eq!(prompt.asked.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_without_prompt_failure_is_returned() {
        let authenticator = Authenticator::new(
            Arc::new(password_checking_resolver()),
            Arc::new(CredentialStore::new(1)),
        );
        let err = authenticator.authenticate(&server()).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Vfs(VfsError::AuthenticationFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_without_prompt() {
        let mut resolver = MockLocatorResolver::new();
        resolver
            .expect_resolve()
            .with(predicate::eq(server()))
            .times(1)
            .returning(|locator| Err(VfsError::not_found(locator)));
        let prompt = ScriptedPrompt::new(vec![]);
        let authenticator = Authenticator::new(Arc::new(resolver), Arc::new(CredentialStore::new(1)))
            .with_prompt(prompt.clone());

        let err = authenticator.authenticate(&server()).await.unwrap_err();
        assert!(matches!(err, AuthError::Vfs(VfsError::NotFound { .. })));
        assert!(prompt.asked.lock().is_empty());
    }
}
