//! Local disk backend using Tokio

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

use core_vfs::{
    BackendKind, CapabilitySet, DirEntry, EntryKind, EntryStream, FileBackend, FileStat,
    RandomReadStream, RandomWriteStream, ReadStream, ResourceLocator, VfsError, VfsResult,
    WriteStream,
};

/// Tokio-based local filesystem backend
///
/// Symlinks are reported as [`EntryKind::Symlink`] and never followed when
/// listing or deleting, so recursive jobs do not escape the selected tree.
#[derive(Debug, Default, Clone)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    fn path_of(locator: &ResourceLocator) -> VfsResult<PathBuf> {
        locator.to_path_buf().ok_or_else(|| {
            VfsError::InvalidLocator(format!("not a local locator: {}", locator))
        })
    }

    fn stat_from_metadata(metadata: &std::fs::Metadata) -> FileStat {
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            FileStat {
                exists: true,
                kind: EntryKind::Symlink,
                size: 0,
                modified,
            }
        } else if file_type.is_dir() {
            FileStat::directory(modified)
        } else {
            FileStat::file(metadata.len(), modified)
        }
    }
}

#[async_trait]
impl FileBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    async fn stat(&self, locator: &ResourceLocator) -> VfsResult<FileStat> {
        let path = Self::path_of(locator)?;
        match fs::symlink_metadata(&path).await {
            Ok(metadata) => Ok(Self::stat_from_metadata(&metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileStat::missing()),
            Err(e) => Err(VfsError::from_io(locator, e)),
        }
    }

    async fn open_read(&self, locator: &ResourceLocator) -> VfsResult<ReadStream> {
        let path = Self::path_of(locator)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        debug!(path = ?path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn open_random_read(&self, locator: &ResourceLocator) -> VfsResult<RandomReadStream> {
        let path = Self::path_of(locator)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, locator: &ResourceLocator) -> VfsResult<WriteStream> {
        let path = Self::path_of(locator)?;
        let file = fs::File::create(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        debug!(path = ?path, "Opened file for writing");
        Ok(Box::new(file))
    }

    async fn open_append(&self, locator: &ResourceLocator) -> VfsResult<WriteStream> {
        let path = Self::path_of(locator)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        Ok(Box::new(file))
    }

    async fn open_random_write(&self, locator: &ResourceLocator) -> VfsResult<RandomWriteStream> {
        let path = Self::path_of(locator)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        Ok(Box::new(file))
    }

    async fn create_directory(&self, locator: &ResourceLocator) -> VfsResult<()> {
        let path = Self::path_of(locator)?;
        fs::create_dir(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn list_children(&self, locator: &ResourceLocator) -> VfsResult<EntryStream> {
        let path = Self::path_of(locator)?;
        let read_dir = fs::read_dir(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;
        let parent = locator.clone();

        let entries = stream::unfold(Some(read_dir), move |state| {
            let parent = parent.clone();
            async move {
                let mut read_dir = state?;
                match read_dir.next_entry().await {
                    Ok(Some(entry)) => {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        let item = match parent.join(&name) {
                            Ok(child) => match entry.metadata().await {
                                Ok(metadata) => Ok(DirEntry {
                                    locator: child,
                                    stat: Self::stat_from_metadata(&metadata),
                                }),
                                Err(e) => Err(VfsError::from_io(&child, e)),
                            },
                            Err(e) => Err(e),
                        };
                        Some((item, Some(read_dir)))
                    }
                    Ok(None) => None,
                    // Report the failure once, then end the stream.
                    Err(e) => Some((Err(VfsError::from_io(&parent, e)), None)),
                }
            }
        });

        Ok(entries.boxed())
    }

    async fn delete(&self, locator: &ResourceLocator) -> VfsResult<()> {
        let path = Self::path_of(locator)?;
        let metadata = fs::symlink_metadata(&path)
            .await
            .map_err(|e| VfsError::from_io(locator, e))?;

        let result = if metadata.is_dir() {
            fs::remove_dir(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| VfsError::from_io(locator, e))?;

        debug!(path = ?path, "Deleted");
        Ok(())
    }

    async fn change_timestamp(
        &self,
        locator: &ResourceLocator,
        modified: DateTime<Utc>,
    ) -> VfsResult<()> {
        let path = Self::path_of(locator)?;
        let time = SystemTime::from(modified);

        tokio::task::spawn_blocking(move || {
            std::fs::File::open(&path).and_then(|file| file.set_modified(time))
        })
        .await
        .map_err(|e| VfsError::transient(locator, e.to_string()))?
        .map_err(|e| VfsError::from_io(locator, e))
    }
}
