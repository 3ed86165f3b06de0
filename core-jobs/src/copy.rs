//! Copies files and folders into a destination folder.

use crate::context::JobContext;
use crate::engine::Reauthentication;
use crate::transfer::{transfer, TransferOutcome, WriterSink};
use crate::variant::{FileContext, JobVariant, Traversal};
use crate::{JobError, Result};
use async_trait::async_trait;
use core_vfs::{CapabilityOperation, FileHandle, ResourceLocator, VfsError, VfsResult};
use tracing::{debug, instrument, warn};

/// Recreates every FileSet entry under `destination`, keeping the paths
/// relative to the FileSet's base folder.
pub struct CopyJob {
    destination: FileHandle,
    preserve_timestamps: bool,
}

impl CopyJob {
    pub fn new(destination: FileHandle) -> Self {
        Self {
            destination,
            preserve_timestamps: true,
        }
    }

    /// Copies the modification time onto each copied file when the
    /// destination supports it. On by default.
    pub fn with_preserve_timestamps(mut self, preserve: bool) -> Self {
        self.preserve_timestamps = preserve;
        self
    }

    pub fn destination(&self) -> &FileHandle {
        &self.destination
    }

    async fn target_for(&self, file: &FileContext) -> VfsResult<FileHandle> {
        let mut locator = self.destination.locator().clone();
        for segment in file.relative_path.split('/').filter(|s| !s.is_empty()) {
            locator = locator.join(segment)?;
        }
        FileHandle::resolve(self.destination.backend().clone(), locator).await
    }

    async fn copy_folder(&self, target: &FileHandle) -> VfsResult<bool> {
        if target.is_directory() {
            return Ok(true);
        }
        if target.exists() {
            return Err(VfsError::AlreadyExists {
                locator: target.locator().without_credential(),
            });
        }
        target.create_directory().await?;
        Ok(true)
    }

    async fn copy_file(
        &self,
        ctx: &JobContext,
        source: &FileHandle,
        target: &FileHandle,
    ) -> VfsResult<bool> {
        if target.is_directory() {
            return Err(VfsError::AlreadyExists {
                locator: target.locator().without_credential(),
            });
        }

        ctx.set_current_file_size(source.size());
        let mut reader = source.open_read().await?;
        let writer = target.open_write().await?;
        let mut sink = WriterSink::new(writer, target.locator().clone());

        match transfer(ctx, source.locator(), &mut reader, &mut sink).await? {
            TransferOutcome::Completed(bytes) => {
                debug!(bytes, target = %target.locator(), "Copied file");
                self.preserve_timestamp(source, target).await;
                Ok(true)
            }
            TransferOutcome::Interrupted(bytes) => {
                drop(sink);
                debug!(bytes, target = %target.locator(), "Copy interrupted");
                Self::discard_partial(target).await;
                Ok(false)
            }
        }
    }

    async fn preserve_timestamp(&self, source: &FileHandle, target: &FileHandle) {
        if !self.preserve_timestamps || !target.supports(CapabilityOperation::ChangeTimestamp) {
            return;
        }
        if let Some(modified) = source.modified() {
            if let Err(e) = target.change_timestamp(modified).await {
                warn!(target = %target.locator(), error = %e, "Could not preserve timestamp");
            }
        }
    }

    async fn discard_partial(target: &FileHandle) {
        if !target.supports(CapabilityOperation::Delete) {
            return;
        }
        if let Err(e) = target.delete().await {
            warn!(target = %target.locator(), error = %e, "Could not remove partial copy");
        }
    }
}

#[async_trait]
impl JobVariant for CopyJob {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn traversal(&self) -> Traversal {
        Traversal::ParentFirst
    }

    async fn on_start(&mut self, _ctx: &JobContext) -> Result<()> {
        let destination = self.destination.refresh().await?;
        if !destination.is_directory() {
            return Err(JobError::Vfs(VfsError::not_found(destination.locator())));
        }
        self.destination = destination;
        Ok(())
    }

    #[instrument(skip(self, ctx, handle), fields(file = %file.relative_path))]
    async fn process_file(
        &mut self,
        ctx: &JobContext,
        handle: &FileHandle,
        file: &FileContext,
    ) -> VfsResult<bool> {
        let target = self.target_for(file).await?;
        if handle.is_directory() {
            self.copy_folder(&target).await
        } else {
            self.copy_file(ctx, handle, &target).await
        }
    }

    async fn refresh_credentials(&mut self, reauth: &Reauthentication, failed: &ResourceLocator) {
        if self.destination.locator().authority_key() != failed.authority_key() {
            return;
        }
        match reauth.resolve(self.destination.locator()).await {
            Ok(destination) => {
                debug!(file = %failed, "Destination re-authenticated");
                self.destination = destination;
            }
            Err(e) => warn!(file = %failed, error = %e, "Could not re-authenticate destination"),
        }
    }

    fn status_message(&self, ctx: &JobContext) -> String {
        match ctx.current_file_name() {
            Some(name) => format!("Copying {}", name),
            None => format!("Preparing copy to {}", self.destination.locator()),
        }
    }

    fn affects_folder(&self, folder: &ResourceLocator) -> bool {
        folder == self.destination.locator()
            || folder.relative_to(self.destination.locator()).is_some()
    }
}
