//! # Job State Machine
//!
//! Identity, lifecycle state and progress accounting of background jobs.
//!
//! ## State Machine
//!
//! ```text
//! NotStarted → Running ⇄ Paused
//!     ↓           ↓        ↓
//!     └───→ Interrupted ←──┘
//!                 Running → Finished
//! ```
//!
//! `Finished` and `Interrupted` are terminal. `NotStarted → Interrupted`
//! happens when a job is cancelled before it was started.

use crate::{JobError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| JobError::InvalidState(format!("invalid job id '{}': {}", s, e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Built but `start()` not called yet
    NotStarted,
    /// Worker is visiting files
    Running,
    /// Worker is parked at a file boundary
    Paused,
    /// Every file was processed or explicitly skipped
    Finished,
    /// Cancelled, or stopped by a startup failure
    Interrupted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Interrupted)
    }

    /// Check whether `self → to` is a legal transition
    pub fn can_transition_to(&self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (NotStarted, Running)
                | (NotStarted, Interrupted)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Finished)
                | (Running, Interrupted)
                | (Paused, Interrupted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotStarted => "not_started",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Finished => "finished",
            JobState::Interrupted => "interrupted",
        }
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(JobState::NotStarted),
            "running" => Ok(JobState::Running),
            "paused" => Ok(JobState::Paused),
            "finished" => Ok(JobState::Finished),
            "interrupted" => Ok(JobState::Interrupted),
            _ => Err(JobError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Snapshot of a job's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Entries processed successfully
    pub files_done: u64,
    /// Entries known so far; grows while folders are expanded
    pub total_files: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub bytes_done: u64,
    /// Known size of the work, `0` when unknown
    pub total_bytes: u64,
    pub current_file_bytes: u64,
    pub current_file_size: u64,
    pub current_file_name: Option<String>,
}

impl JobProgress {
    /// Completion percentage, `None` while the total size is unknown.
    pub fn percent(&self) -> Option<u8> {
        if self.total_bytes == 0 {
            return None;
        }
        let percent = (self.bytes_done.saturating_mul(100) / self.total_bytes).min(100);
        Some(percent as u8)
    }

    /// Completion percentage of the current file.
    pub fn current_file_percent(&self) -> Option<u8> {
        if self.current_file_size == 0 {
            return None;
        }
        let percent =
            (self.current_file_bytes.saturating_mul(100) / self.current_file_size).min(100);
        Some(percent as u8)
    }

    /// Entries visited so far, whatever their outcome.
    pub fn files_visited(&self) -> u64 {
        self.files_done + self.files_skipped + self.files_failed
    }
}

/// Final outcome of a job, available once it reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: JobProgress,
    /// Why the job was interrupted, `None` for user cancellation.
    pub error: Option<String>,
}

impl JobReport {
    pub fn is_finished(&self) -> bool {
        self.state == JobState::Finished
    }
}
