//! In-memory job table and per-job log sink.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::job_events::{JobStatus, LogStep};
use crate::error::DiscboxError;
use crate::fetcher::AlbumInfo;

// ─── Records ────────────────────────────────────────────────────────────────

/// Structured outcome of a successfully completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    /// Resolved collection metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumInfo>,
    /// Where the organized files ended up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Number of tracks imported into the library.
    pub track_count: u32,
}

/// One full run of the pipeline for a single submitted URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier, assigned at creation.
    pub id: String,
    /// Source URL, validated before acceptance.
    pub url: String,
    /// Audio format snapshot taken at creation time. Later configuration
    /// changes do not affect an already-submitted job.
    pub audio_format: String,
    /// Current status.
    pub status: JobStatus,
    /// Completion within the current stage, 0–100. Never regresses within
    /// a stage; resets on stage change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Resolved collection metadata, set once pre-flight resolution succeeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumInfo>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job left `pending`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Human-readable failure reason, set only in terminal failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured outcome, set only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutcome>,
}

impl Job {
    fn new(url: &str, audio_format: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            audio_format: audio_format.to_string(),
            status: JobStatus::Pending,
            progress: None,
            album: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        }
    }

    /// Returns true once the job is in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// An immutable, append-only log line belonging to one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Owning job.
    pub job_id: String,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Stage tag, or `log`/`error` for free-text lines.
    pub step: LogStep,
    /// Human-readable text.
    pub message: String,
    /// Completion within the current step, 0–100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Stage ordering used to refuse backwards transitions. Late progress
/// callbacks from a previous stage must never revisit it.
fn rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::FetchingInfo => 1,
        JobStatus::Downloading => 2,
        JobStatus::Importing => 3,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 4,
    }
}

#[derive(Default)]
struct StoreInner {
    /// Jobs in insertion (submission) order.
    jobs: Vec<Job>,
    /// Log entries in append order, across all jobs.
    logs: Vec<LogEntry>,
}

/// In-memory table of jobs and their logs.
///
/// All reads and writes go through a single `RwLock` held only for the
/// duration of the in-memory mutation, never across a collaborator call.
/// The store guarantees consistent reads/writes of the table and never
/// transitions status on its own initiative.
pub struct JobStore {
    inner: RwLock<StoreInner>,
    /// Maximum number of non-terminal jobs accepted at once. 1 means a
    /// submission is rejected while any job is pending or running.
    queue_capacity: usize,
}

impl JobStore {
    /// Creates a new store accepting at most `queue_capacity` non-terminal
    /// jobs at a time.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Creates a job in `pending` state, enforcing the queue policy.
    ///
    /// Fails with [`DiscboxError::JobConflict`] carrying the active job's
    /// id when the non-terminal job count is already at capacity.
    pub fn create(&self, url: &str, audio_format: &str) -> Result<Job, DiscboxError> {
        let mut inner = self.write();

        let non_terminal: Vec<&Job> = inner.jobs.iter().filter(|j| !j.is_finished()).collect();
        if non_terminal.len() >= self.queue_capacity {
            return Err(DiscboxError::JobConflict {
                active_job_id: non_terminal.first().map(|j| j.id.clone()),
            });
        }

        let job = Job::new(url, audio_format);
        inner.jobs.push(job.clone());
        Ok(job)
    }

    /// Returns a job by id.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.read().jobs.iter().find(|j| j.id == job_id).cloned()
    }

    /// Returns all jobs in insertion order.
    pub fn list(&self) -> Vec<Job> {
        self.read().jobs.clone()
    }

    /// Returns all log entries in append order.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.read().logs.clone()
    }

    /// Returns the log entries for one job, in append order.
    pub fn logs_for(&self, job_id: &str) -> Vec<LogEntry> {
        self.read()
            .logs
            .iter()
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Applies a mutation to one job under the store lock.
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.write();
        let job = inner.jobs.iter_mut().find(|j| j.id == job_id)?;
        mutate(job);
        Some(job.clone())
    }

    /// Atomically updates a job's status and appends a log entry.
    ///
    /// Bookkeeping: `started_at` is set when the job first leaves
    /// `pending`, `finished_at` and (for failures) `error` when it reaches
    /// a terminal state. Progress is clamped so the displayed value never
    /// regresses within a stage and resets on stage change. A transition
    /// on an already-terminal job, or backwards to an earlier stage, is
    /// refused.
    pub fn transition(
        &self,
        job_id: &str,
        status: JobStatus,
        message: &str,
        progress: Option<f64>,
    ) -> Option<Job> {
        let now = Utc::now();
        let mut inner = self.write();
        let job = inner.jobs.iter_mut().find(|j| j.id == job_id)?;

        if job.status.is_terminal() {
            log::debug!(
                "Ignoring transition of finished job {} to {:?}",
                job_id,
                status
            );
            return None;
        }
        if rank(status) < rank(job.status) {
            log::debug!(
                "Ignoring backwards transition of job {} from {:?} to {:?}",
                job_id,
                job.status,
                status
            );
            return None;
        }

        let stage_changed = status != job.status;
        if stage_changed {
            job.status = status;
            // A job cancelled while still pending never started.
            if job.started_at.is_none() && !status.is_terminal() && status != JobStatus::Pending {
                job.started_at = Some(now);
            }
            if status.is_terminal() {
                job.finished_at = Some(now);
                if status == JobStatus::Failed {
                    job.error = Some(message.to_string());
                }
            }
            job.progress = progress.map(|p| p.clamp(0.0, 100.0));
        } else if let Some(p) = progress {
            let p = p.clamp(0.0, 100.0);
            job.progress = Some(match job.progress {
                Some(current) if current > p => current,
                _ => p,
            });
        }

        let entry = LogEntry {
            job_id: job_id.to_string(),
            timestamp: now,
            step: status.into(),
            message: message.to_string(),
            progress: job.progress,
        };
        let updated = job.clone();
        inner.logs.push(entry);
        Some(updated)
    }

    /// Records resolved collection metadata on a job.
    pub fn set_album(&self, job_id: &str, album: AlbumInfo) -> Option<Job> {
        self.update(job_id, |job| job.album = Some(album))
    }

    /// Transitions a job to `completed` and records its outcome.
    pub fn complete(&self, job_id: &str, outcome: JobOutcome, message: &str) -> Option<Job> {
        self.transition(job_id, JobStatus::Completed, message, Some(100.0))?;
        self.update(job_id, |job| job.result = Some(outcome))
    }

    /// Appends a free-text log line without touching job state.
    pub fn add_log(&self, job_id: &str, step: LogStep, message: &str, progress: Option<f64>) {
        let mut inner = self.write();
        inner.logs.push(LogEntry {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
            step,
            message: message.to_string(),
            progress,
        });
    }

    /// Returns the earliest-submitted `pending` job, if any.
    pub fn pop_next_pending(&self) -> Option<Job> {
        self.read()
            .jobs
            .iter()
            .find(|j| j.status == JobStatus::Pending)
            .cloned()
    }

    /// Deletes a terminal job and its logs.
    ///
    /// Fails with `JobNotFound` for unknown ids and `JobNotFinished` for
    /// jobs that are still pending or running.
    pub fn delete(&self, job_id: &str) -> Result<(), DiscboxError> {
        let mut inner = self.write();
        let index = inner
            .jobs
            .iter()
            .position(|j| j.id == job_id)
            .ok_or_else(|| DiscboxError::JobNotFound(job_id.to_string()))?;

        if !inner.jobs[index].is_finished() {
            return Err(DiscboxError::JobNotFinished(job_id.to_string()));
        }

        inner.jobs.remove(index);
        inner.logs.retain(|l| l.job_id != job_id);
        Ok(())
    }

    /// Removes all terminal jobs and their logs, returning the count removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.write();
        let before = inner.jobs.len();
        let removed_ids: Vec<String> = inner
            .jobs
            .iter()
            .filter(|j| j.is_finished())
            .map(|j| j.id.clone())
            .collect();
        inner.jobs.retain(|j| !j.is_finished());
        inner.logs.retain(|l| !removed_ids.contains(&l.job_id));
        before - inner.jobs.len()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(1)
    }
}
