//! Job progress broadcasting for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::broadcast::job_store::JobOutcome;
use crate::fetcher::AlbumInfo;

/// Status of a job in the queue.
///
/// Transitions are one-directional:
/// `pending → fetching_info → downloading → importing → {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    FetchingInfo,
    Downloading,
    Importing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns true once no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::FetchingInfo => write!(f, "Fetching info"),
            JobStatus::Downloading => write!(f, "Downloading"),
            JobStatus::Importing => write!(f, "Importing"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Coarse tag on a log entry: the stage it belongs to, or a generic
/// `log`/`error` tag for free-text lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStep {
    FetchingInfo,
    Downloading,
    Importing,
    Completed,
    Failed,
    Cancelled,
    Log,
    Error,
}

impl From<JobStatus> for LogStep {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending | JobStatus::FetchingInfo => LogStep::FetchingInfo,
            JobStatus::Downloading => LogStep::Downloading,
            JobStatus::Importing => LogStep::Importing,
            JobStatus::Completed => LogStep::Completed,
            JobStatus::Failed => LogStep::Failed,
            JobStatus::Cancelled => LogStep::Cancelled,
        }
    }
}

impl std::fmt::Display for LogStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStep::FetchingInfo => write!(f, "fetching_info"),
            LogStep::Downloading => write!(f, "downloading"),
            LogStep::Importing => write!(f, "importing"),
            LogStep::Completed => write!(f, "completed"),
            LogStep::Failed => write!(f, "failed"),
            LogStep::Cancelled => write!(f, "cancelled"),
            LogStep::Log => write!(f, "log"),
            LogStep::Error => write!(f, "error"),
        }
    }
}

/// Progress event for a job, broadcast to all subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    /// Overall job status at the time of the event.
    pub status: JobStatus,
    /// Stage tag for this event.
    pub step: LogStep,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Completion within the current step, 0–100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Resolved collection metadata (set once pre-flight resolution succeeds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumInfo>,
    /// Structured outcome (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// Creates a new progress event for a stage transition or log line.
    pub fn new(job_id: &str, status: JobStatus, step: LogStep, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            step,
            message: message.to_string(),
            progress: None,
            timestamp: Utc::now(),
            album: None,
            outcome: None,
            error: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Broadcasts job progress events for streaming.
///
/// Slow subscribers lag and drop events; sending never blocks job
/// execution.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a per-job tracker bound to this broadcaster.
    pub fn tracker(&self, job_id: &str) -> JobProgressTracker {
        JobProgressTracker::new(job_id, Arc::clone(&self.sender))
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Emits progress events for a single job.
pub struct JobProgressTracker {
    job_id: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(job_id: &str, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            sender,
        }
    }

    /// Announces a stage transition.
    pub fn stage(&self, status: JobStatus, message: &str, progress: Option<f64>) {
        let mut event = JobProgressEvent::new(&self.job_id, status, status.into(), message);
        event.progress = progress;
        let _ = self.sender.send(event);
    }

    /// Emits a free-text log line within the current stage.
    pub fn detail(&self, status: JobStatus, step: LogStep, message: &str, progress: Option<f64>) {
        let mut event = JobProgressEvent::new(&self.job_id, status, step, message);
        event.progress = progress;
        let _ = self.sender.send(event);
    }

    /// Announces resolved collection metadata.
    pub fn album_resolved(&self, album: &AlbumInfo, message: &str) {
        let mut event = JobProgressEvent::new(
            &self.job_id,
            JobStatus::FetchingInfo,
            LogStep::FetchingInfo,
            message,
        );
        event.progress = Some(100.0);
        event.album = Some(album.clone());
        let _ = self.sender.send(event);
    }

    /// Marks the job as completed with its outcome.
    pub fn completed(&self, outcome: &JobOutcome, message: &str) {
        let mut event = JobProgressEvent::new(
            &self.job_id,
            JobStatus::Completed,
            LogStep::Completed,
            message,
        );
        event.progress = Some(100.0);
        event.outcome = Some(outcome.clone());
        let _ = self.sender.send(event);
    }

    /// Marks the job as failed with an error message.
    pub fn failed(&self, error: &str) {
        let mut event =
            JobProgressEvent::new(&self.job_id, JobStatus::Failed, LogStep::Failed, error);
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }

    /// Marks the job as cancelled.
    pub fn cancelled(&self, message: &str) {
        let event = JobProgressEvent::new(
            &self.job_id,
            JobStatus::Cancelled,
            LogStep::Cancelled,
            message,
        );
        let _ = self.sender.send(event);
    }
}
