//! Sequential job scheduler: at most one job executing at any time.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broadcast::job_events::{JobProgressBroadcaster, JobStatus};
use crate::broadcast::job_store::{Job, JobStore};
use crate::error::{DiscboxError, Result};
use crate::pipeline::progress::BroadcastProgress;
use crate::pipeline::SyncPipeline;
use crate::url::validate_collection_url;

const CANCELLED_MESSAGE: &str = "Job cancelled by user";
const INTERNAL_ERROR_MESSAGE: &str = "Internal error while running job";

/// What the scheduler is doing right now.
///
/// Modeled as an explicit tagged state (never an ambient global) so it can
/// be exercised in isolation: the cancellation handle of the active job
/// lives here and nowhere else.
pub enum RunState {
    Idle,
    Running {
        job_id: String,
        cancel: CancellationToken,
    },
}

/// Owns the run queue and enforces first-submitted-first-run execution of
/// pending jobs, one at a time.
///
/// A single long-lived task claims the earliest pending job under the
/// state lock, runs it to a terminal state, then repeats. Submission and
/// cancellation take the same lock, so a pending job is either cancelled
/// before it is claimed or sees its token signalled after.
pub struct Scheduler {
    store: Arc<JobStore>,
    pipeline: Arc<SyncPipeline>,
    broadcaster: JobProgressBroadcaster,
    state: Mutex<RunState>,
    wake: Notify,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Creates the scheduler and spawns its run loop on the current
    /// runtime.
    pub fn spawn(
        store: Arc<JobStore>,
        pipeline: Arc<SyncPipeline>,
        broadcaster: JobProgressBroadcaster,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            store,
            pipeline,
            broadcaster,
            state: Mutex::new(RunState::Idle),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::run_loop(Arc::clone(&scheduler)));
        scheduler
    }

    /// The job table this scheduler runs against.
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// The broadcast channel for progress events.
    pub fn broadcaster(&self) -> &JobProgressBroadcaster {
        &self.broadcaster
    }

    /// Validates and enqueues a new job.
    ///
    /// Fails with `InvalidUrl` before touching the job table, or with
    /// `JobConflict` when the queue policy rejects the submission.
    pub fn submit(&self, url: &str, audio_format: &str) -> Result<Job> {
        validate_collection_url(url)?;
        let job = self.store.create(url.trim(), audio_format)?;
        info!(job_id = %job.id, url = %job.url, "Job submitted");
        self.wake.notify_one();
        Ok(job)
    }

    /// Requests cancellation of a job.
    ///
    /// The running job gets its token signalled and winds down at its next
    /// checkpoint; a pending job transitions straight to `cancelled`
    /// without ever starting; cancelling an already-terminal job is a
    /// no-op success.
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        let state = self.lock_state();

        if let RunState::Running {
            job_id: active,
            cancel,
        } = &*state
        {
            if active == job_id {
                info!(job_id, "Cancelling active job");
                cancel.cancel();
                return Ok(());
            }
        }

        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| DiscboxError::JobNotFound(job_id.to_string()))?;

        match job.status {
            JobStatus::Pending => {
                info!(job_id, "Cancelling pending job");
                self.store
                    .transition(job_id, JobStatus::Cancelled, CANCELLED_MESSAGE, None);
                self.broadcaster.tracker(job_id).cancelled(CANCELLED_MESSAGE);
                Ok(())
            }
            status if status.is_terminal() => Ok(()),
            _ => {
                // Already winding down after a cancel/terminal race.
                debug!(job_id, "Cancel on job that is already stopping");
                Ok(())
            }
        }
    }

    /// The id of the currently running job, if any.
    pub fn active_job_id(&self) -> Option<String> {
        match &*self.lock_state() {
            RunState::Running { job_id, .. } => Some(job_id.clone()),
            RunState::Idle => None,
        }
    }

    /// Stops the run loop once the active job (if any) finishes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.wake.notify_one();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Scheduler state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    async fn run_loop(self: Arc<Self>) {
        debug!("Scheduler loop started");

        loop {
            // Claim the earliest pending job under the state lock so a
            // concurrent cancel either sees it pending or sees it running.
            let claimed = {
                let mut state = self.lock_state();
                match self.store.pop_next_pending() {
                    Some(job) => {
                        let cancel = CancellationToken::new();
                        *state = RunState::Running {
                            job_id: job.id.clone(),
                            cancel: cancel.clone(),
                        };
                        Some((job, cancel))
                    }
                    None => {
                        *state = RunState::Idle;
                        None
                    }
                }
            };

            match claimed {
                Some((job, cancel)) => {
                    self.execute(job, cancel).await;
                }
                None => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }

        debug!("Scheduler loop stopped");
    }

    /// Runs one job to a terminal state, isolating the loop from anything
    /// the job does.
    async fn execute(&self, job: Job, cancel: CancellationToken) {
        let job_id = job.id.clone();

        let store = Arc::clone(&self.store);
        let broadcaster = self.broadcaster.clone();
        let pipeline = Arc::clone(&self.pipeline);

        let handle = tokio::spawn(async move {
            let reporter = BroadcastProgress::new(&job.id, store, &broadcaster);
            pipeline.run(job, &reporter, &cancel).await;
        });

        if let Err(join_err) = handle.await {
            error!(job_id = %job_id, "Job task aborted: {}", join_err);
        }

        // The pipeline reports a terminal state on every path; if the task
        // died before doing so, force failure here so the queue keeps
        // going and the job cannot be claimed again.
        if let Some(job) = self.store.get(&job_id) {
            if !job.is_finished() {
                self.store
                    .transition(&job_id, JobStatus::Failed, INTERNAL_ERROR_MESSAGE, None);
                self.broadcaster.tracker(&job_id).failed(INTERNAL_ERROR_MESSAGE);
            }
        }
    }
}
