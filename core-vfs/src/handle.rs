//! # File Handles
//!
//! A [`FileHandle`] is the uniform view of a file or folder on any backend.
//!
//! ## Overview
//!
//! A handle pairs a [`ResourceLocator`] with the backend that serves it, the
//! backend's capability set (captured once, at construction) and a metadata
//! snapshot. Every operation first checks the capability set and fails with
//! `UnsupportedOperation` without touching the backend when the operation is
//! not offered, so unsupported operations never partially execute.
//!
//! Handles are cheap to clone. The parent is exposed as a locator only; a
//! handle never owns its parent.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::backend::{
    BackendKind, EntryKind, FileBackend, FileStat, RandomReadStream, RandomWriteStream,
    ReadStream, WriteStream,
};
use crate::capability::{CapabilityOperation, CapabilitySet};
use crate::error::{VfsError, VfsResult};
use crate::locator::ResourceLocator;

/// Lazily produced child handles. Finite and not restartable.
pub type ChildStream = BoxStream<'static, VfsResult<FileHandle>>;

/// Uniform handle to a file or folder on some backend.
#[derive(Clone)]
pub struct FileHandle {
    locator: ResourceLocator,
    backend: Arc<dyn FileBackend>,
    capabilities: CapabilitySet,
    stat: FileStat,
}

impl FileHandle {
    /// Resolves `locator` on `backend`, querying its metadata.
    pub async fn resolve(
        backend: Arc<dyn FileBackend>,
        locator: ResourceLocator,
    ) -> VfsResult<Self> {
        let stat = backend.stat(&locator).await?;
        Ok(Self::from_parts(locator, backend, stat))
    }

    /// Builds a handle from an already known metadata snapshot.
    pub fn from_parts(
        locator: ResourceLocator,
        backend: Arc<dyn FileBackend>,
        stat: FileStat,
    ) -> Self {
        let capabilities = backend.capabilities();
        Self {
            locator,
            backend,
            capabilities,
            stat,
        }
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    pub fn name(&self) -> &str {
        self.locator.name()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    pub fn kind(&self) -> EntryKind {
        self.stat.kind
    }

    pub fn exists(&self) -> bool {
        self.stat.exists
    }

    pub fn is_directory(&self) -> bool {
        self.stat.exists && self.stat.kind == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.stat.exists && self.stat.kind == EntryKind::Symlink
    }

    pub fn size(&self) -> u64 {
        self.stat.size
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.stat.modified
    }

    /// Locator of the containing folder, for navigation only.
    pub fn parent(&self) -> Option<ResourceLocator> {
        self.locator.parent()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn supports(&self, op: CapabilityOperation) -> bool {
        self.capabilities.contains(op)
    }

    /// The backend serving this handle.
    pub fn backend(&self) -> &Arc<dyn FileBackend> {
        &self.backend
    }

    fn require(&self, op: CapabilityOperation) -> VfsResult<()> {
        if self.supports(op) {
            Ok(())
        } else {
            debug!(operation = %op, locator = %self.locator, "Rejected unsupported operation");
            Err(VfsError::unsupported(op, &self.locator))
        }
    }

    /// Re-reads the metadata snapshot.
    pub async fn refresh(&self) -> VfsResult<Self> {
        let stat = self.backend.stat(&self.locator).await?;
        Ok(Self {
            stat,
            ..self.clone()
        })
    }

    /// Handle for the direct child `name`, which need not exist yet.
    pub async fn child(&self, name: &str) -> VfsResult<Self> {
        let locator = self.locator.join(name)?;
        Self::resolve(self.backend.clone(), locator).await
    }

    pub async fn open_read(&self) -> VfsResult<ReadStream> {
        self.require(CapabilityOperation::Read)?;
        self.backend.open_read(&self.locator).await
    }

    pub async fn open_random_read(&self) -> VfsResult<RandomReadStream> {
        self.require(CapabilityOperation::RandomRead)?;
        self.backend.open_random_read(&self.locator).await
    }

    pub async fn open_write(&self) -> VfsResult<WriteStream> {
        self.require(CapabilityOperation::Write)?;
        self.backend.open_write(&self.locator).await
    }

    pub async fn open_append(&self) -> VfsResult<WriteStream> {
        self.require(CapabilityOperation::Append)?;
        self.backend.open_append(&self.locator).await
    }

    pub async fn open_random_write(&self) -> VfsResult<RandomWriteStream> {
        self.require(CapabilityOperation::RandomWrite)?;
        self.backend.open_random_write(&self.locator).await
    }

    #[instrument(skip(self), fields(locator = %self.locator))]
    pub async fn create_directory(&self) -> VfsResult<()> {
        self.require(CapabilityOperation::CreateDirectory)?;
        self.backend.create_directory(&self.locator).await
    }

    /// Lists the folder's children lazily, in backend order.
    pub async fn list_children(&self) -> VfsResult<ChildStream> {
        self.require(CapabilityOperation::ListChildren)?;
        let entries = self.backend.list_children(&self.locator).await?;
        let backend = self.backend.clone();
        Ok(entries
            .map(move |entry| {
                entry.map(|entry| FileHandle::from_parts(entry.locator, backend.clone(), entry.stat))
            })
            .boxed())
    }

    /// Deletes the file or empty folder. Never recursive.
    #[instrument(skip(self), fields(locator = %self.locator))]
    pub async fn delete(&self) -> VfsResult<()> {
        self.require(CapabilityOperation::Delete)?;
        self.backend.delete(&self.locator).await
    }

    pub async fn change_timestamp(&self, modified: DateTime<Utc>) -> VfsResult<()> {
        self.require(CapabilityOperation::ChangeTimestamp)?;
        self.backend.change_timestamp(&self.locator, modified).await
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("locator", &self.locator)
            .field("backend", &self.backend.kind())
            .field("kind", &self.stat.kind)
            .field("exists", &self.stat.exists)
            .field("size", &self.stat.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DirEntry, EntryStream};
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        Backend {}

        #[async_trait]
        impl FileBackend for Backend {
            fn kind(&self) -> BackendKind;
            fn capabilities(&self) -> CapabilitySet;
            async fn stat(&self, locator: &ResourceLocator) -> VfsResult<FileStat>;
            async fn create_directory(&self, locator: &ResourceLocator) -> VfsResult<()>;
            async fn list_children(&self, locator: &ResourceLocator) -> VfsResult<EntryStream>;
            async fn delete(&self, locator: &ResourceLocator) -> VfsResult<()>;
        }
    }

    fn locator(path: &str) -> ResourceLocator {
        ResourceLocator::parse(&format!("ftp://host{}", path)).unwrap()
    }

    #[tokio::test]
    async fn test_unsupported_operation_never_reaches_backend() {
        let mut backend = MockBackend::new();
        backend
            .expect_capabilities()
            .return_const(CapabilitySet::empty().with(CapabilityOperation::Read));
        backend.expect_delete().never();
        backend.expect_create_directory().never();

        let handle = FileHandle::from_parts(
            locator("/pub/a.txt"),
            Arc::new(backend),
            FileStat::file(3, None),
        );

        let err = handle.delete().await.unwrap_err();
        assert_eq!(
            err,
            VfsError::UnsupportedOperation {
                operation: CapabilityOperation::Delete,
                locator: locator("/pub/a.txt"),
            }
        );
        assert!(handle.create_directory().await.is_err());
        assert!(handle.supports(CapabilityOperation::Read));
        assert!(!handle.supports(CapabilityOperation::RandomWrite));
    }

    #[tokio::test]
    async fn test_capabilities_captured_once() {
        let mut backend = MockBackend::new();
        backend
            .expect_capabilities()
            .times(1)
            .return_const(CapabilitySet::all());

        let handle =
            FileHandle::from_parts(locator("/"), Arc::new(backend), FileStat::directory(None));

        for _ in 0..3 {
            assert!(crate::capability::supports(&handle, CapabilityOperation::Delete));
        }
    }

    #[tokio::test]
    async fn test_list_children_wraps_entries() {
        let mut backend = MockBackend::new();
        backend
            .expect_capabilities()
            .return_const(CapabilitySet::all());
        backend.expect_kind().return_const(BackendKind::Ftp);
        backend.expect_list_children().returning(|parent| {
            let parent = parent.clone();
            let entries = vec![
                Ok(DirEntry {
                    locator: parent.join("a.txt").unwrap(),
                    stat: FileStat::file(1, None),
                }),
                Ok(DirEntry {
                    locator: parent.join("sub").unwrap(),
                    stat: FileStat::directory(None),
                }),
            ];
            Ok(futures::stream::iter(entries).boxed())
        });

        let handle = FileHandle::from_parts(
            locator("/pub"),
            Arc::new(backend),
            FileStat::directory(None),
        );

        let children: Vec<FileHandle> = handle
            .list_children()
            .await
            .unwrap()
            .map(|child| child.unwrap())
            .collect()
            .await;

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name(), "a.txt");
        assert!(children[1].is_directory());
        assert_eq!(children[1].backend_kind(), BackendKind::Ftp);
        assert_eq!(children[0].parent(), Some(locator("/pub")));
    }

    #[tokio::test]
    async fn test_child_resolves_missing_entry() {
        let mut backend = MockBackend::new();
        backend
            .expect_capabilities()
            .return_const(CapabilitySet::all());
        backend
            .expect_stat()
            .returning(|_| Ok(FileStat::missing()));

        let handle =
            FileHandle::from_parts(locator("/pub"), Arc::new(backend), FileStat::directory(None));
        let child = handle.child("new.txt").await.unwrap();

        assert!(!child.exists());
        assert_eq!(child.locator(), &locator("/pub/new.txt"));
        assert!(handle.child("../escape").await.is_err());
    }
}
