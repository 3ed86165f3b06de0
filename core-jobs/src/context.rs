//! Worker-side view of a job handed to variant hooks.

use crate::control::JobShared;
use crate::job::{JobId, JobProgress};
use core_runtime::JobConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a variant may observe and report while the job runs.
#[derive(Clone)]
pub struct JobContext {
    shared: Arc<JobShared>,
    config: JobConfig,
}

impl JobContext {
    pub(crate) fn new(shared: Arc<JobShared>, config: JobConfig) -> Self {
        Self { shared, config }
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Token to race long backend calls against.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Interrupts the job with `reason` as its error, without asking the
    /// controller. For failures that leave output no decision can repair.
    pub fn abort(&self, reason: impl Into<String>) {
        self.shared.fail(reason.into());
    }

    /// Counts bytes moved for the current file.
    ///
    /// Emits a progress event every `progress_event_bytes`.
    pub fn add_bytes(&self, bytes: u64) {
        let due = {
            let mut tracker = self.shared.tracker.lock();
            tracker.add_bytes(bytes);
            tracker.event_due(self.config.progress_event_bytes)
        };
        if due {
            self.shared.emit_progress();
        }
    }

    /// Corrects the size of the current file once it is known.
    pub fn set_current_file_size(&self, size: u64) {
        self.shared.tracker.lock().progress.current_file_size = size;
    }

    /// Grows the job's total when more work is discovered, such as the
    /// files found while expanding a folder.
    pub fn add_total_bytes(&self, bytes: u64) {
        self.shared.tracker.lock().progress.total_bytes += bytes;
    }

    pub fn current_file_name(&self) -> Option<String> {
        self.shared.tracker.lock().progress.current_file_name.clone()
    }

    pub fn progress(&self) -> JobProgress {
        self.shared.progress()
    }

    pub(crate) fn shared(&self) -> &Arc<JobShared> {
        &self.shared
    }
}
