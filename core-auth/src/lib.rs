//! # Authentication Module
//!
//! Credential caching and the authentication-failure contract shared by all
//! backends.
//!
//! ## Overview
//!
//! Backends that need credentials raise `VfsError::AuthenticationFailure`.
//! This crate turns that signal into a prompt/retry loop:
//!
//! - [`CredentialStore`]: process-wide cache keyed by server authority
//! - [`CredentialPrompt`]: host-provided dialog answering with a credential or cancel
//! - [`Authenticator`]: a [`Resolver`](core_vfs::Resolver) that retries with fresh credentials
//!
//! Credentials are never persisted and secrets are never logged.

pub mod authenticator;
pub mod error;
pub mod prompt;
pub mod store;

pub use authenticator::Authenticator;
pub use error::{AuthError, Result};
pub use prompt::{CredentialPrompt, CredentialResponse, FnPrompt};
pub use store::CredentialStore;
