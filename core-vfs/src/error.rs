//! Error types for file-handle operations

use crate::capability::CapabilityOperation;
use crate::locator::ResourceLocator;
use std::io;
use thiserror::Error;

/// Errors raised by backends, handles and the backend registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VfsError {
    /// The backend rejected (or needs) credentials.
    ///
    /// The locator never carries the rejected credential; callers rebuild the
    /// locator with fresh credentials and retry from scratch.
    #[error("Authentication required for {locator}{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    AuthenticationFailure {
        locator: ResourceLocator,
        reason: Option<String>,
    },

    /// The handle's backend does not offer the operation.
    #[error("Operation {operation} is not supported for {locator}")]
    UnsupportedOperation {
        operation: CapabilityOperation,
        locator: ResourceLocator,
    },

    #[error("Not found: {locator}")]
    NotFound { locator: ResourceLocator },

    #[error("Permission denied: {locator}")]
    PermissionDenied { locator: ResourceLocator },

    #[error("Already exists: {locator}")]
    AlreadyExists { locator: ResourceLocator },

    /// I/O failure that may succeed when retried.
    #[error("I/O error on {locator}: {message}")]
    TransientIo {
        locator: ResourceLocator,
        message: String,
    },

    /// A server or device the operation depends on is unreachable.
    #[error("{resource} unavailable: {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Data that cannot be written as given, such as a line break inside a
    /// protocol line.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No backend registered for scheme '{scheme}'")]
    UnknownBackend { scheme: String },
}

/// Discriminant of [`VfsError`], used by error resolvers and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationFailure,
    UnsupportedOperation,
    NotFound,
    PermissionDenied,
    AlreadyExists,
    TransientIo,
    ResourceUnavailable,
    InvalidLocator,
    InvalidData,
    UnknownBackend,
}

impl VfsError {
    pub fn authentication(locator: &ResourceLocator, reason: Option<String>) -> Self {
        VfsError::AuthenticationFailure {
            locator: locator.without_credential(),
            reason,
        }
    }

    pub fn unsupported(operation: CapabilityOperation, locator: &ResourceLocator) -> Self {
        VfsError::UnsupportedOperation {
            operation,
            locator: locator.without_credential(),
        }
    }

    pub fn not_found(locator: &ResourceLocator) -> Self {
        VfsError::NotFound {
            locator: locator.without_credential(),
        }
    }

    pub fn transient(locator: &ResourceLocator, message: impl Into<String>) -> Self {
        VfsError::TransientIo {
            locator: locator.without_credential(),
            message: message.into(),
        }
    }

    pub fn unavailable(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        VfsError::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Maps an I/O error raised while operating on `locator`.
    pub fn from_io(locator: &ResourceLocator, error: io::Error) -> Self {
        let locator = locator.without_credential();
        match error.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound { locator },
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied { locator },
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists { locator },
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable => VfsError::ResourceUnavailable {
                resource: locator.authority_key(),
                reason: error.to_string(),
            },
            _ => VfsError::TransientIo {
                locator,
                message: error.to_string(),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::AuthenticationFailure { .. } => ErrorKind::AuthenticationFailure,
            VfsError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            VfsError::NotFound { .. } => ErrorKind::NotFound,
            VfsError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            VfsError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            VfsError::TransientIo { .. } => ErrorKind::TransientIo,
            VfsError::ResourceUnavailable { .. } => ErrorKind::ResourceUnavailable,
            VfsError::InvalidLocator(_) => ErrorKind::InvalidLocator,
            VfsError::InvalidData(_) => ErrorKind::InvalidData,
            VfsError::UnknownBackend { .. } => ErrorKind::UnknownBackend,
        }
    }

    /// Whether retrying the same operation can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VfsError::TransientIo { .. } | VfsError::ResourceUnavailable { .. }
        )
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, VfsError::AuthenticationFailure { .. })
    }

    /// Locator the error refers to, when it names one.
    pub fn locator(&self) -> Option<&ResourceLocator> {
        match self {
            VfsError::AuthenticationFailure { locator, .. }
            | VfsError::UnsupportedOperation { locator, .. }
            | VfsError::NotFound { locator }
            | VfsError::PermissionDenied { locator }
            | VfsError::AlreadyExists { locator }
            | VfsError::TransientIo { locator, .. } => Some(locator),
            _ => None,
        }
    }
}

/// Result type for file-handle operations
pub type VfsResult<T> = std::result::Result<T, VfsError>;
