//! Authenticator against a password-protected in-memory share

use core_auth::{Authenticator, CredentialResponse, CredentialStore, FnPrompt};
use core_vfs::{BackendRegistry, Credential, ResourceLocator, Resolver, VfsError};
use provider_memory::{MemoryBackend, MEMORY_SCHEME};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

fn protected_share() -> (MemoryBackend, Arc<BackendRegistry>) {
    let backend = MemoryBackend::new().with_required_credential(Credential::new("dana", "s3cret"));
    backend.insert_file("/docs/plan.txt", "step one");
    let registry =
        Arc::new(BackendRegistry::new().with_backend(MEMORY_SCHEME, Arc::new(backend.clone())));
    (backend, registry)
}

fn plan() -> ResourceLocator {
    ResourceLocator::parse("mem://share/docs/plan.txt").unwrap()
}

#[tokio::test]
async fn test_plain_resolve_needs_credentials() {
    let (_backend, registry) = protected_share();
    let err = registry.resolve(&plan()).await.unwrap_err();
    assert!(err.is_authentication_failure());
}

#[tokio::test]
async fn test_prompted_credential_is_reused_for_the_same_server() {
    let (_backend, registry) = protected_share();
    let store = Arc::new(CredentialStore::new(1));
    let prompts = Arc::new(AtomicUsize::new(0));
    let counter = prompts.clone();

    let authenticator = Authenticator::new(registry, store.clone()).with_prompt(Arc::new(
        FnPrompt(move |_: &ResourceLocator, _: Option<&str>| {
            counter.fetch_add(1, Ordering::SeqCst);
            CredentialResponse::Provided(Credential::new("dana", "s3cret"))
        }),
    ));

    let handle = authenticator.authenticate(&plan()).await.unwrap();
    let mut contents = String::new();
    handle
        .open_read()
        .await
        .unwrap()
        .read_to_string(&mut contents)
        .await
        .unwrap();
    assert_eq!(contents, "step one");

    let sibling = ResourceLocator::parse("mem://share/docs").unwrap();
    let folder = authenticator.resolve(&sibling).await.unwrap();
    assert!(folder.is_directory());
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_wrong_password_is_reported_to_the_prompt() {
    let (_backend, registry) = protected_share();
    let reasons = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = reasons.clone();

    let authenticator = Authenticator::new(registry, Arc::new(CredentialStore::new(1)))
        .with_max_attempts(3)
        .with_prompt(Arc::new(FnPrompt(
            move |_: &ResourceLocator, reason: Option<&str>| {
                let mut seen = seen.lock();
                seen.push(reason.map(str::to_string));
                let secret = if seen.len() == 1 { "guess" } else { "s3cret" };
                CredentialResponse::Provided(Credential::new("dana", secret))
            },
        )));

    authenticator.authenticate(&plan()).await.unwrap();

    let reasons = reasons.lock().clone();
    assert_eq!(reasons.len(), 2);
    assert_eq!(reasons[0], None);
    assert_eq!(reasons[1].as_deref(), Some("invalid login or password"));
}

#[tokio::test]
async fn test_cancelled_prompt_surfaces_as_authentication_failure() {
    let (_backend, registry) = protected_share();
    let authenticator = Authenticator::new(registry, Arc::new(CredentialStore::new(1)))
        .with_prompt(Arc::new(FnPrompt(|_: &ResourceLocator, _: Option<&str>| {
            CredentialResponse::Cancelled
        })));

    let err = authenticator.resolve(&plan()).await.unwrap_err();
    assert!(matches!(err, VfsError::AuthenticationFailure { .. }));
}
