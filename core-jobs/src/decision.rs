//! Error-recovery handshake between a running job and its controller.
//!
//! When processing a file fails, the worker stops and asks an
//! [`ErrorResolver`] what to do. It never moves past the failed file without
//! an answer.

use async_trait::async_trait;
use core_vfs::{FileHandle, VfsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Answer to a per-file error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Process the same file again
    Retry,
    /// Leave this file and continue
    Skip,
    /// Skip this file and every later failure without asking
    SkipAll,
    /// Interrupt the job
    Cancel,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Retry => "retry",
            Decision::Skip => "skip",
            Decision::SkipAll => "skip_all",
            Decision::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller-side decision point.
///
/// `decide` runs on the worker; the job is blocked until it returns.
#[async_trait]
pub trait ErrorResolver: Send + Sync {
    async fn decide(&self, handle: &FileHandle, error: &VfsError) -> Decision;
}

/// Adapts a synchronous closure into an [`ErrorResolver`].
pub struct FnErrorResolver<F>(pub F);

#[async_trait]
impl<F> ErrorResolver for FnErrorResolver<F>
where
    F: Fn(&FileHandle, &VfsError) -> Decision + Send + Sync,
{
    async fn decide(&self, handle: &FileHandle, error: &VfsError) -> Decision {
        (self.0)(handle, error)
    }
}

// ============================================================================
// Channel-based handshake
// ============================================================================

/// One pending question from a worker.
///
/// Dropping the prompt without answering cancels the job.
pub struct ErrorPrompt {
    pub handle: FileHandle,
    pub error: VfsError,
    reply: oneshot::Sender<Decision>,
}

impl ErrorPrompt {
    /// Sends the decision back to the waiting worker.
    pub fn respond(self, decision: Decision) {
        if self.reply.send(decision).is_err() {
            debug!(file = %self.handle.locator(), "Worker stopped waiting for a decision");
        }
    }
}

impl fmt::Debug for ErrorPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPrompt")
            .field("handle", &self.handle)
            .field("error", &self.error)
            .finish()
    }
}

/// Forwards every error to a controller task as an [`ErrorPrompt`].
#[derive(Clone)]
pub struct ChannelErrorResolver {
    sender: mpsc::Sender<ErrorPrompt>,
}

impl ChannelErrorResolver {
    /// Creates the resolver and the receiving end the controller polls.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ErrorPrompt>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ErrorResolver for ChannelErrorResolver {
    async fn decide(&self, handle: &FileHandle, error: &VfsError) -> Decision {
        let (reply, answer) = oneshot::channel();
        let prompt = ErrorPrompt {
            handle: handle.clone(),
            error: error.clone(),
            reply,
        };

        if self.sender.send(prompt).await.is_err() {
            debug!("Controller is gone, cancelling");
            return Decision::Cancel;
        }
        answer.await.unwrap_or(Decision::Cancel)
    }
}
