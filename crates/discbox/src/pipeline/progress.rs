use std::sync::{Arc, Mutex};

use crate::broadcast::job_events::{JobProgressBroadcaster, JobProgressTracker, JobStatus, LogStep};
use crate::broadcast::job_store::{JobOutcome, JobStore};
use crate::fetcher::AlbumInfo;

/// Events emitted by the pipeline and collaborators during a run.
pub enum ProgressEvent {
    /// Stage transition in the status machine.
    Stage {
        status: JobStatus,
        message: String,
        progress: Option<f64>,
    },
    /// Progress or free-text line within the current stage.
    Detail {
        step: LogStep,
        message: String,
        progress: Option<f64>,
    },
    /// Pre-flight resolution succeeded.
    AlbumResolved { album: AlbumInfo, message: String },
    /// Both stages succeeded.
    Completed { outcome: JobOutcome, message: String },
    /// Terminal failure; `error` is the human-readable reason.
    Failed { error: String },
    /// Cooperative cancellation was observed.
    Cancelled { message: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the job store and the broadcast channel.
///
/// The store stays authoritative; subscribers observe the same ordering as
/// pollers because both writes happen under one `report` call.
pub struct BroadcastProgress {
    job_id: String,
    store: Arc<JobStore>,
    tracker: JobProgressTracker,
    /// Current stage, so `Detail` events know which status they belong to.
    status: Mutex<JobStatus>,
}

impl BroadcastProgress {
    pub fn new(job_id: &str, store: Arc<JobStore>, broadcaster: &JobProgressBroadcaster) -> Self {
        Self {
            job_id: job_id.to_string(),
            store,
            tracker: broadcaster.tracker(job_id),
            status: Mutex::new(JobStatus::Pending),
        }
    }

    fn current_status(&self) -> JobStatus {
        *self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_status(&self, status: JobStatus) {
        *self.status.lock().unwrap_or_else(|p| p.into_inner()) = status;
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage {
                status,
                message,
                progress,
            } => {
                self.set_status(status);
                self.store
                    .transition(&self.job_id, status, &message, progress);
                self.tracker.stage(status, &message, progress);
            }
            ProgressEvent::Detail {
                step,
                message,
                progress,
            } => {
                let status = self.current_status();
                match step {
                    LogStep::Log | LogStep::Error => {
                        self.store.add_log(&self.job_id, step, &message, progress);
                    }
                    _ => {
                        // Stage-tagged details update the job's progress too.
                        self.store
                            .transition(&self.job_id, status, &message, progress);
                    }
                }
                self.tracker.detail(status, step, &message, progress);
            }
            ProgressEvent::AlbumResolved { album, message } => {
                self.store.set_album(&self.job_id, album.clone());
                self.store.transition(
                    &self.job_id,
                    JobStatus::FetchingInfo,
                    &message,
                    Some(100.0),
                );
                self.tracker.album_resolved(&album, &message);
            }
            ProgressEvent::Completed { outcome, message } => {
                self.set_status(JobStatus::Completed);
                self.store.complete(&self.job_id, outcome.clone(), &message);
                self.tracker.completed(&outcome, &message);
            }
            ProgressEvent::Failed { error } => {
                self.set_status(JobStatus::Failed);
                self.store
                    .transition(&self.job_id, JobStatus::Failed, &error, None);
                self.tracker.failed(&error);
            }
            ProgressEvent::Cancelled { message } => {
                self.set_status(JobStatus::Cancelled);
                self.store
                    .transition(&self.job_id, JobStatus::Cancelled, &message, None);
                self.tracker.cancelled(&message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Arc<JobStore>, JobProgressBroadcaster, String) {
        let store = Arc::new(JobStore::new(1));
        let broadcaster = JobProgressBroadcaster::new(16);
        let job = store.create("https://music.youtube.com/playlist?list=1", "opus").unwrap();
        (store, broadcaster, job.id)
    }

    #[test]
    fn test_stage_event_updates_store_and_broadcast() {
        let (store, broadcaster, job_id) = fixture();
        let mut rx = broadcaster.subscribe();
        let reporter = BroadcastProgress::new(&job_id, Arc::clone(&store), &broadcaster);

        reporter.report(ProgressEvent::Stage {
            status: JobStatus::Downloading,
            message: "Downloading 10 tracks...".to_string(),
            progress: Some(0.0),
        });

        assert_eq!(store.get(&job_id).unwrap().status, JobStatus::Downloading);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.status, JobStatus::Downloading);
    }

    #[test]
    fn test_detail_event_carries_current_stage() {
        let (store, broadcaster, job_id) = fixture();
        let reporter = BroadcastProgress::new(&job_id, Arc::clone(&store), &broadcaster);

        reporter.report(ProgressEvent::Stage {
            status: JobStatus::Downloading,
            message: "start".to_string(),
            progress: None,
        });
        reporter.report(ProgressEvent::Detail {
            step: LogStep::Downloading,
            message: "Downloading: 55.0% at 1.2MiB/s".to_string(),
            progress: Some(55.0),
        });

        let job = store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, Some(55.0));
    }

    #[test]
    fn test_free_text_detail_does_not_touch_job_state() {
        let (store, broadcaster, job_id) = fixture();
        let reporter = BroadcastProgress::new(&job_id, Arc::clone(&store), &broadcaster);

        reporter.report(ProgressEvent::Detail {
            step: LogStep::Log,
            message: "resolved 12 entries".to_string(),
            progress: None,
        });

        let job = store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(store.logs_for(&job_id).len(), 1);
    }

    #[test]
    fn test_failed_event_sets_error() {
        let (store, broadcaster, job_id) = fixture();
        let reporter = BroadcastProgress::new(&job_id, Arc::clone(&store), &broadcaster);

        reporter.report(ProgressEvent::Failed {
            error: "Download failed: 403".to_string(),
        });

        let job = store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Download failed: 403"));
    }
}
