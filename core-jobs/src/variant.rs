//! Hooks a concrete operation plugs into the engine.

use crate::context::JobContext;
use crate::engine::Reauthentication;
use crate::Result;
use async_trait::async_trait;
use core_vfs::{FileHandle, ResourceLocator, VfsError};

/// Order in which folders and their contents are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Only the FileSet entries themselves
    Flat,
    /// A folder before its children (copy: create, then fill)
    ParentFirst,
    /// Children before their folder (delete: empty, then remove)
    ChildrenFirst,
    /// Folders are expanded but never handed to `process_file`
    FilesOnly,
}

/// Where the current file sits in the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    /// `0` for FileSet entries, `n` for their n-th level descendants
    pub depth: usize,
    /// Path relative to the FileSet's base folder, `/`-separated
    pub relative_path: String,
}

/// A job operation such as copy, delete or send-mail.
///
/// The engine calls the hooks from a single worker task, one file at a time:
/// `on_start` once, `process_file` per file in FileSet order, then exactly
/// one of `on_complete` or `on_stop`.
#[async_trait]
pub trait JobVariant: Send {
    /// Short name used in events and logs
    fn name(&self) -> &'static str;

    fn traversal(&self) -> Traversal {
        Traversal::Flat
    }

    /// Acquires what the job needs. A failure interrupts the job before any
    /// file is visited.
    async fn on_start(&mut self, _ctx: &JobContext) -> Result<()> {
        Ok(())
    }

    /// Processes one file. `Ok(false)` means it was not fully processed; the
    /// controller then decides like for any other failure.
    async fn process_file(
        &mut self,
        ctx: &JobContext,
        handle: &FileHandle,
        file: &FileContext,
    ) -> std::result::Result<bool, VfsError>;

    /// Releases what `on_start` acquired. Runs on every interrupted path and
    /// must tolerate being called when nothing was acquired.
    async fn on_stop(&mut self, _ctx: &JobContext) {}

    /// Re-resolves handles the variant keeps for itself after the controller
    /// chose to retry an authentication failure on `failed`. The handle being
    /// processed is refreshed by the engine.
    async fn refresh_credentials(
        &mut self,
        _reauth: &Reauthentication,
        _failed: &ResourceLocator,
    ) {
    }

    /// Closing handshake after the last file. Errors are logged only.
    async fn on_complete(&mut self, _ctx: &JobContext) -> Result<()> {
        Ok(())
    }

    /// One-line status for the progress display.
    fn status_message(&self, ctx: &JobContext) -> String {
        match ctx.current_file_name() {
            Some(name) => format!("Processing {}", name),
            None => "Starting".to_string(),
        }
    }

    /// Whether `folder` must be refreshed once the job is over.
    fn affects_folder(&self, _folder: &ResourceLocator) -> bool {
        true
    }
}
