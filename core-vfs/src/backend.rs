//! # Backend Trait
//!
//! Every storage protocol plugs in by implementing [`FileBackend`]. A backend
//! declares its [`CapabilitySet`] once; the operation methods it does not
//! support keep their default bodies, which fail with `UnsupportedOperation`.
//! Callers never invoke a backend directly: [`FileHandle`](crate::FileHandle)
//! checks the capability set first and only then dispatches.
//!
//! Backends that need credentials read them from the locator's embedded
//! [`Credential`](crate::Credential) and raise
//! [`VfsError::AuthenticationFailure`] when they are missing or rejected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::fmt;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use crate::capability::{CapabilityOperation, CapabilitySet};
use crate::error::{VfsError, VfsResult};
use crate::locator::ResourceLocator;

/// Sequential reader.
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Sequential writer. Callers must `shutdown()` it to flush.
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Seekable reader.
pub trait RandomAccessRead: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> RandomAccessRead for T {}

/// Seekable writer.
pub trait RandomAccessWrite: AsyncWrite + AsyncSeek + Send + Unpin {}
impl<T: AsyncWrite + AsyncSeek + Send + Unpin> RandomAccessWrite for T {}

pub type RandomReadStream = Box<dyn RandomAccessRead>;
pub type RandomWriteStream = Box<dyn RandomAccessWrite>;

/// Lazily produced folder entries, in backend order.
pub type EntryStream = BoxStream<'static, VfsResult<DirEntry>>;

/// Storage protocol family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Ftp,
    Sftp,
    Smb,
    Http,
    Nfs,
    Memory,
    Other(String),
}

impl BackendKind {
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "file" => BackendKind::Local,
            "ftp" => BackendKind::Ftp,
            "sftp" => BackendKind::Sftp,
            "smb" => BackendKind::Smb,
            "http" | "https" => BackendKind::Http,
            "nfs" => BackendKind::Nfs,
            "mem" | "memory" => BackendKind::Memory,
            other => BackendKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Ftp => f.write_str("ftp"),
            BackendKind::Sftp => f.write_str("sftp"),
            BackendKind::Smb => f.write_str("smb"),
            BackendKind::Http => f.write_str("http"),
            BackendKind::Nfs => f.write_str("nfs"),
            BackendKind::Memory => f.write_str("memory"),
            BackendKind::Other(name) => f.write_str(name),
        }
    }
}

/// What kind of entry a locator names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
}

/// Metadata snapshot of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub exists: bool,
    pub kind: EntryKind,
    /// Size in bytes; 0 for folders and missing entries.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileStat {
    /// Stat of an entry that does not exist (yet).
    pub fn missing() -> Self {
        Self {
            exists: false,
            kind: EntryKind::Regular,
            size: 0,
            modified: None,
        }
    }

    pub fn file(size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            exists: true,
            kind: EntryKind::Regular,
            size,
            modified,
        }
    }

    pub fn directory(modified: Option<DateTime<Utc>>) -> Self {
        Self {
            exists: true,
            kind: EntryKind::Directory,
            size: 0,
            modified,
        }
    }
}

/// One folder entry as reported by a backend.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub locator: ResourceLocator,
    pub stat: FileStat,
}

/// A storage protocol implementation.
#[async_trait]
pub trait FileBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Operations this backend offers. Must not change over the backend's lifetime.
    fn capabilities(&self) -> CapabilitySet;

    /// Metadata for `locator`; a missing entry is [`FileStat::missing`], not an error.
    async fn stat(&self, locator: &ResourceLocator) -> VfsResult<FileStat>;

    async fn open_read(&self, locator: &ResourceLocator) -> VfsResult<ReadStream> {
        Err(VfsError::unsupported(CapabilityOperation::Read, locator))
    }

    async fn open_random_read(&self, locator: &ResourceLocator) -> VfsResult<RandomReadStream> {
        Err(VfsError::unsupported(CapabilityOperation::RandomRead, locator))
    }

    /// Creates or truncates the file.
    async fn open_write(&self, locator: &ResourceLocator) -> VfsResult<WriteStream> {
        Err(VfsError::unsupported(CapabilityOperation::Write, locator))
    }

    async fn open_append(&self, locator: &ResourceLocator) -> VfsResult<WriteStream> {
        Err(VfsError::unsupported(CapabilityOperation::Append, locator))
    }

    async fn open_random_write(&self, locator: &ResourceLocator) -> VfsResult<RandomWriteStream> {
        Err(VfsError::unsupported(CapabilityOperation::RandomWrite, locator))
    }

    async fn create_directory(&self, locator: &ResourceLocator) -> VfsResult<()> {
        Err(VfsError::unsupported(CapabilityOperation::CreateDirectory, locator))
    }

    async fn list_children(&self, locator: &ResourceLocator) -> VfsResult<EntryStream> {
        Err(VfsError::unsupported(CapabilityOperation::ListChildren, locator))
    }

    /// Deletes a file or an empty folder.
    async fn delete(&self, locator: &ResourceLocator) -> VfsResult<()> {
        Err(VfsError::unsupported(CapabilityOperation::Delete, locator))
    }

    async fn change_timestamp(
        &self,
        locator: &ResourceLocator,
        modified: DateTime<Utc>,
    ) -> VfsResult<()> {
        let _ = modified;
        Err(VfsError::unsupported(CapabilityOperation::ChangeTimestamp, locator))
    }
}
