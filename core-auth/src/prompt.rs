//! Asking the user for credentials.

use async_trait::async_trait;
use core_vfs::{Credential, ResourceLocator};

/// Answer to a credential request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialResponse {
    Provided(Credential),
    Cancelled,
}

/// Host-provided credential dialog.
///
/// `locator` never carries a credential. `reason` is the backend's
/// explanation of the previous failure, when it gave one.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn request_credentials(
        &self,
        locator: &ResourceLocator,
        reason: Option<&str>,
    ) -> CredentialResponse;
}

/// Adapts a synchronous closure into a [`CredentialPrompt`].
pub struct FnPrompt<F>(pub F);

#[async_trait]
impl<F> CredentialPrompt for FnPrompt<F>
where
    F: Fn(&ResourceLocator, Option<&str>) -> CredentialResponse + Send + Sync,
{
    async fn request_credentials(
        &self,
        locator: &ResourceLocator,
        reason: Option<&str>,
    ) -> CredentialResponse {
        (self.0)(locator, reason)
    }
}
