//! Controller surface of a job.

use crate::control::JobShared;
use crate::engine::Worker;
use crate::job::{JobId, JobProgress, JobReport, JobState};
use core_vfs::ResourceLocator;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Cheaply clonable control over one job.
///
/// Every control method is idempotent. `pause` and `resume` on a terminal
/// job do nothing.
#[derive(Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
}

impl JobHandle {
    pub(crate) fn from_shared(shared: Arc<JobShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    /// Variant name, such as `"copy"`
    pub fn kind(&self) -> &'static str {
        self.shared.name
    }

    /// Spawns the worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self) {
        let Some(job) = self.shared.pending.lock().take() else {
            debug!(job_id = %self.shared.id, "Job already started or cancelled");
            return;
        };
        info!(job_id = %self.shared.id, kind = self.shared.name, "Starting job");
        let worker = Worker::new(self.shared.clone(), job);
        tokio::spawn(worker.run());
    }

    /// Asks the worker to stop at the next file boundary.
    pub fn pause(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.shared.pause.send_replace(true);
    }

    pub fn resume(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.shared.pause.send_replace(false);
    }

    /// Interrupts the job.
    ///
    /// A job that was never started goes straight to `Interrupted`; its
    /// variant's `on_stop` still runs once, on a spawned task.
    ///
    /// # Panics
    ///
    /// Cancelling a job that was never started panics outside a Tokio
    /// runtime.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.shared.cancel.cancel();

        if let Some(job) = self.shared.pending.lock().take() {
            info!(job_id = %self.shared.id, "Cancelling job before start");
            let worker = Worker::new(self.shared.clone(), job);
            tokio::spawn(worker.run());
        }
    }

    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn is_pause_requested(&self) -> bool {
        *self.shared.pause.borrow()
    }

    pub fn progress(&self) -> JobProgress {
        self.shared.progress()
    }

    /// Latest status line from the variant.
    pub fn status_message(&self) -> String {
        self.shared.status.lock().clone()
    }

    /// Whether `folder` must be refreshed after this job.
    ///
    /// Conservatively `true` while the worker owns the variant.
    pub fn affects_folder(&self, folder: &ResourceLocator) -> bool {
        if let Some(variant) = self.shared.parked.lock().as_ref() {
            return variant.affects_folder(folder);
        }
        if let Some(job) = self.shared.pending.lock().as_ref() {
            return job.variant.affects_folder(folder);
        }
        true
    }

    pub fn subscribe_state(&self) -> watch::Receiver<JobState> {
        self.shared.state.subscribe()
    }

    /// Waits until the job is in `target` or in a terminal state, and
    /// returns the state reached.
    pub async fn wait_for_state(&self, target: JobState) -> JobState {
        let mut states = self.subscribe_state();
        let reached = states
            .wait_for(|state| *state == target || state.is_terminal())
            .await
            .map(|state| *state);
        reached.unwrap_or_else(|_| self.state())
    }

    /// Joins the job. Hooks have completed by the time this returns.
    pub async fn wait(&self) -> JobReport {
        self.wait_for_state(JobState::Finished).await;
        self.report().unwrap_or_else(|| JobReport {
            job_id: self.id(),
            state: self.state(),
            progress: self.progress(),
            error: None,
        })
    }

    /// The final report, once the job is terminal.
    pub fn report(&self) -> Option<JobReport> {
        self.shared.report.lock().clone()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}
