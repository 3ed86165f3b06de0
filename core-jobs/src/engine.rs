//! # Job Engine
//!
//! Runs a [`JobVariant`] over a [`FileSet`] on a dedicated Tokio task.
//!
//! ## Overview
//!
//! ```rust,ignore
//! let job = Job::new(CopyJob::new(destination), files)
//!     .with_error_resolver(Arc::new(resolver))
//!     .with_event_bus(bus.clone())
//!     .build();
//!
//! job.start();
//! let report = job.wait().await;
//! ```
//!
//! ## Worker algorithm
//!
//! 1. Check for cancellation, move to `Running`, run `on_start`
//! 2. Visit every FileSet entry in order, depth-first into folders
//! 3. Route every per-file error through the [`ErrorResolver`]
//! 4. Run `on_complete` and finish, or `on_stop` and interrupt
//!
//! Pause and cancel requests are honoured at file boundaries; cancellation
//! is also observed inside transfers and while waiting for a decision.

use crate::context::JobContext;
use crate::control::JobShared;
use crate::decision::{Decision, ErrorResolver, FnErrorResolver};
use crate::handle::JobHandle;
use crate::job::{JobReport, JobState};
use crate::variant::{FileContext, JobVariant, Traversal};
use core_auth::CredentialStore;
use core_runtime::events::JobEvent;
use core_runtime::{EventBus, JobConfig};
use core_vfs::{FileHandle, FileSet, ResourceLocator, Resolver, VfsError, VfsResult};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Builder
// ============================================================================

/// Re-resolves handles with fresh credentials after an authentication
/// failure the controller chose to retry.
#[derive(Clone)]
pub struct Reauthentication {
    resolver: Arc<dyn Resolver>,
    store: Arc<CredentialStore>,
}

impl Reauthentication {
    /// Resolves `locator` again with the credential currently cached for its
    /// server, dropping whatever credential it carried.
    pub async fn resolve(&self, locator: &ResourceLocator) -> VfsResult<FileHandle> {
        let locator = self.store.apply(&locator.without_credential());
        self.resolver.resolve(&locator).await
    }
}

/// A job being assembled. [`Job::build`] turns it into a controllable
/// [`JobHandle`]; nothing runs until [`JobHandle::start`].
pub struct Job {
    pub(crate) variant: Box<dyn JobVariant>,
    pub(crate) files: FileSet,
    pub(crate) config: JobConfig,
    pub(crate) resolver: Option<Arc<dyn ErrorResolver>>,
    pub(crate) event_bus: Option<EventBus>,
    pub(crate) reauth: Option<Reauthentication>,
}

impl Job {
    /// The job takes ownership of `files`; it cannot change once submitted.
    pub fn new(variant: impl JobVariant + 'static, files: FileSet) -> Self {
        Self {
            variant: Box::new(variant),
            files,
            config: JobConfig::default(),
            resolver: None,
            event_bus: None,
            reauth: None,
        }
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    /// Without a resolver every per-file error cancels the job.
    pub fn with_error_resolver(mut self, resolver: Arc<dyn ErrorResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_decision_fn<F>(self, decide: F) -> Self
    where
        F: Fn(&FileHandle, &VfsError) -> Decision + Send + Sync + 'static,
    {
        self.with_error_resolver(Arc::new(FnErrorResolver(decide)))
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// After `Retry` on an authentication failure, the failed handle is
    /// resolved again through `resolver` with whatever credential `store`
    /// holds by then.
    pub fn with_reauthentication(
        mut self,
        resolver: Arc<dyn Resolver>,
        store: Arc<CredentialStore>,
    ) -> Self {
        self.reauth = Some(Reauthentication { resolver, store });
        self
    }

    pub fn build(self) -> JobHandle {
        JobHandle::from_shared(Arc::new(JobShared::new(self)))
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Whether the traversal goes on after an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Result of listing a folder.
enum Listing {
    Children(Vec<FileHandle>),
    Skipped,
    Stopped,
}

/// Outcome of one entry that did not stop the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Skipped,
}

pub(crate) struct Worker {
    variant: Box<dyn JobVariant>,
    files: FileSet,
    resolver: Option<Arc<dyn ErrorResolver>>,
    reauth: Option<Reauthentication>,
    ctx: JobContext,
    traversal: Traversal,
    skip_all: bool,
}

impl Worker {
    pub(crate) fn new(shared: Arc<JobShared>, job: Job) -> Self {
        let traversal = job.variant.traversal();
        Self {
            variant: job.variant,
            files: job.files,
            resolver: job.resolver,
            reauth: job.reauth,
            ctx: JobContext::new(shared, job.config),
            traversal,
            skip_all: false,
        }
    }

    fn shared(&self) -> &Arc<JobShared> {
        self.ctx.shared()
    }

    #[instrument(skip(self), fields(job_id = %self.ctx.id(), kind = self.variant.name()))]
    pub(crate) async fn run(mut self) -> JobReport {
        if self.ctx.is_cancelled() {
            return self.interrupt().await;
        }
        if let Err(e) = self.shared().transition(JobState::Running) {
            warn!(error = %e, "Job could not start");
            return self.interrupt().await;
        }

        let progress = self.ctx.progress();
        info!(total_files = progress.total_files, "Job started");
        self.shared().emit(JobEvent::Started {
            job_id: self.ctx.id().to_string(),
            kind: self.variant.name().to_string(),
            total_files: progress.total_files,
        });
        self.refresh_status();

        if let Err(e) = self.variant.on_start(&self.ctx).await {
            error!(error = %e, "Job failed to start");
            self.shared().fail(e.to_string());
            return self.interrupt().await;
        }
        self.refresh_status();

        let entries: Vec<FileHandle> = self.files.iter().cloned().collect();
        for handle in entries {
            let relative_path = self.files.relative_path(&handle);
            let file = FileContext {
                depth: 0,
                relative_path,
            };
            if self.visit(handle, file).await == Flow::Stop {
                return self.interrupt().await;
            }
        }

        if self.ctx.is_cancelled() {
            return self.interrupt().await;
        }
        self.complete().await
    }

    async fn complete(mut self) -> JobReport {
        if let Err(e) = self.variant.on_complete(&self.ctx).await {
            warn!(error = %e, "Closing handshake failed");
        }
        let shared = self.park();
        let report = shared.conclude(JobState::Finished, None);
        info!(
            files_done = report.progress.files_done,
            files_skipped = report.progress.files_skipped,
            files_failed = report.progress.files_failed,
            bytes_done = report.progress.bytes_done,
            "Job finished"
        );
        report
    }

    async fn interrupt(mut self) -> JobReport {
        self.variant.on_stop(&self.ctx).await;
        let shared = self.park();
        let reason = shared.fatal.lock().take();
        let report = shared.conclude(JobState::Interrupted, reason);
        info!(reason = ?report.error, "Job interrupted");
        report
    }

    /// Hands the variant back so controllers can still query it. Done before
    /// the terminal state is published.
    fn park(self) -> Arc<JobShared> {
        let shared = self.ctx.shared().clone();
        *shared.parked.lock() = Some(self.variant);
        shared
    }

    fn refresh_status(&self) {
        self.shared()
            .set_status(self.variant.status_message(&self.ctx));
    }

    /// Pause and cancellation point between two files.
    async fn checkpoint(&mut self) -> Flow {
        if self.ctx.is_cancelled() {
            return Flow::Stop;
        }
        if !*self.shared().pause.borrow() {
            return Flow::Continue;
        }

        let shared = self.shared().clone();
        if shared.transition(JobState::Paused).is_err() {
            return Flow::Continue;
        }
        info!("Job paused");
        shared.emit(JobEvent::Paused {
            job_id: shared.id.to_string(),
        });

        let mut pause = shared.pause.subscribe();
        tokio::select! {
            _ = shared.cancel.cancelled() => return Flow::Stop,
            _ = pause.wait_for(|paused| !*paused) => {}
        }

        if shared.transition(JobState::Running).is_err() {
            return Flow::Stop;
        }
        info!("Job resumed");
        shared.emit(JobEvent::Resumed {
            job_id: shared.id.to_string(),
        });
        Flow::Continue
    }

    /// Visits one entry and, for folders, its descendants.
    fn visit(&mut self, handle: FileHandle, file: FileContext) -> BoxFuture<'_, Flow> {
        async move {
            if self.checkpoint().await == Flow::Stop {
                return Flow::Stop;
            }

            if !handle.is_directory() || self.traversal == Traversal::Flat {
                return match self.process(handle, &file).await {
                    Some(_) => Flow::Continue,
                    None => Flow::Stop,
                };
            }

            match self.traversal {
                Traversal::ParentFirst => match self.process(handle.clone(), &file).await {
                    Some(Outcome::Done) => self.descend(&handle, &file, false).await,
                    Some(_) => Flow::Continue,
                    None => Flow::Stop,
                },
                Traversal::ChildrenFirst => {
                    if self.descend(&handle, &file, false).await == Flow::Stop {
                        return Flow::Stop;
                    }
                    if self.checkpoint().await == Flow::Stop {
                        return Flow::Stop;
                    }
                    match self.process(handle, &file).await {
                        Some(_) => Flow::Continue,
                        None => Flow::Stop,
                    }
                }
                Traversal::FilesOnly => self.descend(&handle, &file, true).await,
                Traversal::Flat => Flow::Continue,
            }
        }
        .boxed()
    }

    /// Lists `folder` and visits its children in backend order.
    async fn descend(
        &mut self,
        folder: &FileHandle,
        file: &FileContext,
        replaces_folder: bool,
    ) -> Flow {
        let children = match self.list_children(folder).await {
            Listing::Children(children) => children,
            Listing::Skipped => {
                // A folder never handed to the variant counts as skipped.
                if replaces_folder {
                    self.shared().tracker.lock().progress.files_skipped += 1;
                }
                return Flow::Continue;
            }
            Listing::Stopped => return Flow::Stop,
        };

        {
            let mut tracker = self.shared().tracker.lock();
            let progress = &mut tracker.progress;
            progress.total_files += children.len() as u64;
            if replaces_folder {
                progress.total_files = progress.total_files.saturating_sub(1);
            }
        }
        self.ctx.add_total_bytes(
            children
                .iter()
                .filter(|child| !child.is_directory())
                .map(|child| child.size())
                .sum(),
        );

        for child in children {
            let relative_path = if file.relative_path.is_empty() {
                child.name().to_string()
            } else {
                format!("{}/{}", file.relative_path, child.name())
            };
            let child_file = FileContext {
                depth: file.depth + 1,
                relative_path,
            };
            if self.visit(child, child_file).await == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Collects a folder's children, asking the resolver when listing fails.
    async fn list_children(&mut self, folder: &FileHandle) -> Listing {
        let mut folder = folder.clone();
        loop {
            let listed = match folder.list_children().await {
                Ok(stream) => stream
                    .collect::<Vec<_>>()
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>(),
                Err(e) => Err(e),
            };

            match listed {
                Ok(children) => return Listing::Children(children),
                Err(error) => {
                    if self.ctx.is_cancelled() {
                        return Listing::Stopped;
                    }
                    match self.handle_error(&mut folder, &error).await {
                        Some(Decision::Retry) => continue,
                        Some(Decision::Skip | Decision::SkipAll) => return Listing::Skipped,
                        Some(Decision::Cancel) | None => return Listing::Stopped,
                    }
                }
            }
        }
    }

    /// Runs `process_file` until it succeeds or a decision moves past it.
    ///
    /// `None` stops the job.
    async fn process(&mut self, mut handle: FileHandle, file: &FileContext) -> Option<Outcome> {
        {
            let size = if handle.is_directory() { 0 } else { handle.size() };
            self.shared().tracker.lock().begin_file(handle.name(), size);
        }
        self.refresh_status();

        loop {
            self.shared().tracker.lock().begin_attempt();
            debug!(file = %handle.locator(), depth = file.depth, "Processing");
            let result = self.variant.process_file(&self.ctx, &handle, file).await;

            let error = match result {
                Ok(true) => None,
                Ok(false) => Some(VfsError::transient(handle.locator(), "not fully processed")),
                Err(error) => Some(error),
            };

            let outcome = match error {
                None => Outcome::Done,
                Some(_) if self.ctx.is_cancelled() => return None,
                Some(error) => match self.handle_error(&mut handle, &error).await {
                    Some(Decision::Retry) => continue,
                    Some(Decision::Skip | Decision::SkipAll) => Outcome::Skipped,
                    Some(Decision::Cancel) => {
                        // The file that cancelled the job counts as failed.
                        self.shared().tracker.lock().progress.files_failed += 1;
                        return None;
                    }
                    None => return None,
                },
            };

            {
                let mut tracker = self.shared().tracker.lock();
                match outcome {
                    Outcome::Done => tracker.progress.files_done += 1,
                    Outcome::Skipped => tracker.progress.files_skipped += 1,
                }
            }
            self.shared().emit_progress();
            return Some(outcome);
        }
    }

    /// The handshake. Blocks until the controller decides, the job is
    /// cancelled, or `SkipAll` was chosen earlier.
    ///
    /// `None` when the job was cancelled while the decision was pending.
    async fn handle_error(
        &mut self,
        handle: &mut FileHandle,
        error: &VfsError,
    ) -> Option<Decision> {
        warn!(file = %handle.locator(), error = %error, "File operation failed");

        let decision = if self.skip_all {
            Decision::Skip
        } else if let Some(resolver) = self.resolver.clone() {
            let cancel = self.ctx.cancellation_token();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(file = %handle.locator(), "Cancelled while waiting for a decision");
                    return None;
                }
                decision = resolver.decide(handle, error) => decision,
            }
        } else {
            Decision::Cancel
        };

        self.shared().emit(JobEvent::FileFailed {
            job_id: self.ctx.id().to_string(),
            file: handle.locator().to_string(),
            message: error.to_string(),
            decision: decision.to_string(),
        });
        debug!(file = %handle.locator(), %decision, "Decision taken");

        match decision {
            Decision::SkipAll => self.skip_all = true,
            Decision::Cancel => self.shared().fail(error.to_string()),
            Decision::Retry if error.is_authentication_failure() => {
                if let Some(reauth) = self.reauth.clone() {
                    self.reauthenticate(&reauth, handle, error).await;
                }
            }
            _ => {}
        }
        Some(decision)
    }

    /// Refreshes the credentials of the handle being processed and of the
    /// variant's own handles. A handle that cannot be resolved again is kept;
    /// the retry then fails the same way and comes back to the resolver.
    async fn reauthenticate(
        &mut self,
        reauth: &Reauthentication,
        handle: &mut FileHandle,
        error: &VfsError,
    ) {
        let failed = error
            .locator()
            .cloned()
            .unwrap_or_else(|| handle.locator().without_credential());

        if handle.locator().authority_key() == failed.authority_key() {
            match reauth.resolve(handle.locator()).await {
                Ok(refreshed) => {
                    debug!(file = %failed, "Re-authenticated");
                    *handle = refreshed;
                }
                Err(e) => warn!(file = %failed, error = %e, "Re-authentication failed"),
            }
        }
        self.variant.refresh_credentials(reauth, &failed).await;
    }
}
