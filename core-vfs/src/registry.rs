//! # Backend Registry
//!
//! Maps locator schemes to the backend that serves them and resolves
//! locators into [`FileHandle`]s. Resolution errors (unknown scheme, bad
//! credentials, unreachable server) are returned to the caller that asked.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::backend::FileBackend;
use crate::error::{VfsError, VfsResult};
use crate::handle::FileHandle;
use crate::locator::ResourceLocator;

/// Turns locators into handles.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, locator: &ResourceLocator) -> VfsResult<FileHandle>;
}

/// Scheme to backend table.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn FileBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `backend` for `scheme`, replacing any previous registration.
    pub fn register(&self, scheme: &str, backend: Arc<dyn FileBackend>) {
        let scheme = scheme.to_ascii_lowercase();
        debug!(scheme = %scheme, kind = %backend.kind(), "Registered backend");
        self.backends.write().insert(scheme, backend);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_backend(self, scheme: &str, backend: Arc<dyn FileBackend>) -> Self {
        self.register(scheme, backend);
        self
    }

    pub fn backend_for(&self, scheme: &str) -> VfsResult<Arc<dyn FileBackend>> {
        self.backends
            .read()
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| VfsError::UnknownBackend {
                scheme: scheme.to_string(),
            })
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.backends.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Parses `input` and resolves it.
    pub async fn parse_and_resolve(&self, input: &str) -> VfsResult<FileHandle> {
        let locator = ResourceLocator::parse(input)?;
        self.resolve(&locator).await
    }
}

#[async_trait]
impl Resolver for BackendRegistry {
    #[instrument(skip(self), fields(locator = %locator))]
    async fn resolve(&self, locator: &ResourceLocator) -> VfsResult<FileHandle> {
        let backend = self.backend_for(locator.scheme())?;
        FileHandle::resolve(backend, locator.clone()).await
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
