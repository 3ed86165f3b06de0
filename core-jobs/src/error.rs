use crate::job::JobState;
use core_vfs::VfsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobState, to: JobState },

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Invalid recipients: {0}")]
    InvalidRecipients(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Mail server rejected the message: {0}")]
    Smtp(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
