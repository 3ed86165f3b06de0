use core_vfs::{ResourceLocator, VfsError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("Credential prompt cancelled for {locator}")]
    Cancelled { locator: ResourceLocator },

    #[error("Authentication for {locator} failed after {attempts} attempts")]
    AttemptsExhausted {
        locator: ResourceLocator,
        attempts: u32,
    },
}

impl From<AuthError> for VfsError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Vfs(inner) => inner,
            AuthError::Cancelled { locator } => {
                VfsError::authentication(&locator, Some("credential prompt cancelled".to_string()))
            }
            AuthError::AttemptsExhausted { locator, attempts } => VfsError::authentication(
                &locator,
                Some(format!("gave up after {} attempts", attempts)),
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
