//! State shared between a job's worker and its controllers.
//!
//! Flags, counters and the published state are the only things both sides
//! touch. Files and handles live on the worker.

use crate::engine::Job;
use crate::job::{JobId, JobProgress, JobReport, JobState};
use crate::variant::JobVariant;
use crate::{JobError, Result};
use core_runtime::events::{CoreEvent, JobEvent};
use core_runtime::EventBus;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Progress counters plus the bookkeeping that keeps per-file progress
/// monotonic across retries.
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    pub(crate) progress: JobProgress,
    /// Bytes moved by the current attempt on the current file
    attempt_bytes: u64,
    /// Bytes already counted for the current file
    high_water: u64,
    /// `bytes_done` when the last progress event was emitted
    last_event_bytes: u64,
}

impl ProgressTracker {
    pub(crate) fn begin_file(&mut self, name: &str, size: u64) {
        self.progress.current_file_name = Some(name.to_string());
        self.progress.current_file_bytes = 0;
        self.progress.current_file_size = size;
        self.attempt_bytes = 0;
        self.high_water = 0;
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempt_bytes = 0;
    }

    /// Counts `bytes` for the current attempt. Bytes re-sent by a retry are
    /// only counted once they go past what earlier attempts reached.
    pub(crate) fn add_bytes(&mut self, bytes: u64) {
        self.attempt_bytes += bytes;
        if self.attempt_bytes > self.high_water {
            let fresh = self.attempt_bytes - self.high_water;
            self.high_water = self.attempt_bytes;
            self.progress.bytes_done += fresh;
            self.progress.current_file_bytes = self.high_water;
        }
    }

    /// Whether enough bytes went by since the last event.
    pub(crate) fn event_due(&mut self, interval: u64) -> bool {
        if self.progress.bytes_done - self.last_event_bytes >= interval.max(1) {
            self.last_event_bytes = self.progress.bytes_done;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_event(&mut self) {
        self.last_event_bytes = self.progress.bytes_done;
    }
}

pub(crate) struct JobShared {
    pub(crate) id: JobId,
    pub(crate) name: &'static str,
    pub(crate) state: watch::Sender<JobState>,
    pub(crate) pause: watch::Sender<bool>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tracker: Mutex<ProgressTracker>,
    pub(crate) status: Mutex<String>,
    pub(crate) report: Mutex<Option<JobReport>>,
    /// Error that interrupts the job, `None` for user cancellation
    pub(crate) fatal: Mutex<Option<String>>,
    /// The job until `start()` or `cancel()` hands it to a worker
    pub(crate) pending: Mutex<Option<Job>>,
    /// The variant once the worker is done with it
    pub(crate) parked: Mutex<Option<Box<dyn JobVariant>>>,
    pub(crate) event_bus: Option<EventBus>,
}

impl JobShared {
    pub(crate) fn new(job: Job) -> Self {
        let (state, _) = watch::channel(JobState::NotStarted);
        let (pause, _) = watch::channel(false);
        let mut tracker = ProgressTracker::default();
        tracker.progress.total_files = job.files.len() as u64;
        tracker.progress.total_bytes = job.files.total_known_size();

        Self {
            id: JobId::new(),
            name: job.variant.name(),
            state,
            pause,
            cancel: CancellationToken::new(),
            tracker: Mutex::new(tracker),
            status: Mutex::new(String::new()),
            report: Mutex::new(None),
            fatal: Mutex::new(None),
            event_bus: job.event_bus.clone(),
            pending: Mutex::new(Some(job)),
            parked: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Moves to `to` if the state machine allows it.
    pub(crate) fn transition(&self, to: JobState) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(to) {
                debug!(job_id = %self.id, from = %current, to = %to, "Job state change");
                *current = to;
                true
            } else {
                outcome = Err(JobError::InvalidStateTransition { from: *current, to });
                false
            }
        });
        outcome
    }

    pub(crate) fn progress(&self) -> JobProgress {
        self.tracker.lock().progress.clone()
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error for a job.
            let _ = bus.emit(CoreEvent::Job(event));
        }
    }

    pub(crate) fn emit_progress(&self) {
        let progress = {
            let mut tracker = self.tracker.lock();
            tracker.mark_event();
            tracker.progress.clone()
        };
        self.emit(JobEvent::Progress {
            job_id: self.id.to_string(),
            files_done: progress.files_done,
            total_files: progress.total_files,
            bytes_done: progress.bytes_done,
            total_bytes: progress.total_bytes,
            percent: progress.percent(),
            current_file: progress.current_file_name,
        });
    }

    /// Keeps the first reason given and cancels the job.
    pub(crate) fn fail(&self, reason: String) {
        self.fatal.lock().get_or_insert(reason);
        self.cancel.cancel();
    }

    pub(crate) fn set_status(&self, status: String) {
        *self.status.lock() = status;
    }

    /// Stores the final report and then publishes the terminal state, so
    /// whoever observes the state can read the report.
    pub(crate) fn conclude(&self, state: JobState, error: Option<String>) -> JobReport {
        let report = JobReport {
            job_id: self.id,
            state,
            progress: self.progress(),
            error: error.clone(),
        };
        *self.report.lock() = Some(report.clone());

        // Published before the transition so waiters observe it.
        let job_id = self.id.to_string();
        match state {
            JobState::Finished => self.emit(JobEvent::Finished {
                job_id,
                files_done: report.progress.files_done,
                files_skipped: report.progress.files_skipped,
                files_failed: report.progress.files_failed,
                bytes_done: report.progress.bytes_done,
            }),
            _ => self.emit(JobEvent::Interrupted {
                job_id,
                reason: error,
            }),
        }

        if let Err(e) = self.transition(state) {
            debug!(job_id = %self.id, error = %e, "Terminal transition rejected");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_does_not_double_count() {
        let mut tracker = ProgressTracker::default();
        tracker.begin_file("a.bin", 100);
        tracker.add_bytes(40);
        assert_eq!(tracker.progress.bytes_done, 40);

        // Retry re-sends the first 40 bytes.
        tracker.begin_attempt();
        tracker.add_bytes(30);
        assert_eq!(tracker.progress.bytes_done, 40);
        tracker.add_bytes(30);
        assert_eq!(tracker.progress.bytes_done, 60);
        assert_eq!(tracker.progress.current_file_bytes, 60);

        tracker.begin_file("b.bin", 10);
        assert_eq!(tracker.progress.current_file_bytes, 0);
        tracker.add_bytes(10);
        assert_eq!(tracker.progress.bytes_done, 70);
    }

    #[test]
    fn test_event_interval() {
        let mut tracker = ProgressTracker::default();
        tracker.begin_file("a.bin", 100);
        tracker.add_bytes(5);
        assert!(!tracker.event_due(10));
        tracker.add_bytes(5);
        assert!(tracker.event_due(10));
        assert!(!tracker.event_due(10));
    }
}
