use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broadcast::job_events::JobStatus;
use crate::broadcast::job_store::{Job, JobOutcome};
use crate::fetcher::Fetcher;
use crate::importer::Importer;

use super::progress::{ProgressEvent, ProgressReporter};

const CANCELLED_MESSAGE: &str = "Job cancelled by user";

/// Drives exactly one job through the status machine to a terminal state.
///
/// `run` never returns an error: every failure is reported as the `failed`
/// terminal event, cancellation as `cancelled`. The scheduler relies on
/// this to keep its loop alive no matter what a job does.
pub struct SyncPipeline {
    fetcher: Arc<dyn Fetcher>,
    importer: Arc<dyn Importer>,
    download_dir: PathBuf,
}

impl SyncPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, importer: Arc<dyn Importer>, download_dir: PathBuf) -> Self {
        Self {
            fetcher,
            importer,
            download_dir,
        }
    }

    /// Runs the fetch → import pipeline for one job.
    ///
    /// Cancellation is checked before each stage; within a stage the
    /// collaborators honor the token themselves. Partially downloaded
    /// files are left in place on cancellation; on success and failure the
    /// job's working directory is removed best-effort.
    pub async fn run(&self, job: Job, reporter: &dyn ProgressReporter, cancel: &CancellationToken) {
        debug!(job_id = %job.id, url = %job.url, "Pipeline starting");

        if self.check_cancelled(reporter, cancel) {
            return;
        }

        // Stage 1: pre-flight resolution
        reporter.report(ProgressEvent::Stage {
            status: JobStatus::FetchingInfo,
            message: format!("Starting sync from: {}", job.url),
            progress: Some(0.0),
        });

        let album = match self.fetcher.resolve(&job.url).await {
            Ok(album) => album,
            Err(e) if e.is_cancelled() => {
                self.report_cancelled(reporter);
                return;
            }
            Err(e) => {
                reporter.report(ProgressEvent::Failed {
                    error: format!("Failed to fetch album info: {e}"),
                });
                return;
            }
        };

        reporter.report(ProgressEvent::AlbumResolved {
            message: format!("Found {} tracks: {}", album.track_count, album.title),
            album: album.clone(),
        });

        if self.check_cancelled(reporter, cancel) {
            return;
        }

        // Stage 2: download
        reporter.report(ProgressEvent::Stage {
            status: JobStatus::Downloading,
            message: format!("Downloading {} tracks...", album.track_count),
            progress: Some(0.0),
        });

        let work_dir = self.download_dir.join(&job.id);
        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            reporter.report(ProgressEvent::Failed {
                error: format!("Failed to create working directory: {e}"),
            });
            return;
        }

        let fetched = match self
            .fetcher
            .download(&job.url, &album, &work_dir, reporter, cancel)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) if e.is_cancelled() => {
                // Partial downloads are left in place for the caller.
                self.report_cancelled(reporter);
                return;
            }
            Err(e) => {
                reporter.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
                self.cleanup(&work_dir);
                return;
            }
        };

        if cancel.is_cancelled() {
            self.report_cancelled(reporter);
            return;
        }

        // Stage 3: import
        reporter.report(ProgressEvent::Stage {
            status: JobStatus::Importing,
            message: "Importing into library...".to_string(),
            progress: Some(0.0),
        });

        let imported = match self.importer.import(&fetched, reporter, cancel).await {
            Ok(imported) => imported,
            Err(e) if e.is_cancelled() => {
                self.report_cancelled(reporter);
                return;
            }
            Err(e) => {
                reporter.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
                self.cleanup(&work_dir);
                return;
            }
        };

        let destination = imported.destination.map(|p| p.display().to_string());
        let message = match &destination {
            Some(dest) => format!("Sync complete: {dest}"),
            None => format!("Sync complete: {}", album.title),
        };

        reporter.report(ProgressEvent::Completed {
            outcome: JobOutcome {
                album: Some(album),
                destination,
                track_count: imported.track_count,
            },
            message,
        });

        self.cleanup(&work_dir);
    }

    fn check_cancelled(&self, reporter: &dyn ProgressReporter, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            self.report_cancelled(reporter);
            true
        } else {
            false
        }
    }

    fn report_cancelled(&self, reporter: &dyn ProgressReporter) {
        reporter.report(ProgressEvent::Cancelled {
            message: CANCELLED_MESSAGE.to_string(),
        });
    }

    fn cleanup(&self, work_dir: &std::path::Path) {
        if work_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(work_dir) {
                warn!(path = %work_dir.display(), "Failed to remove working directory: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::broadcast::job_store::JobStore;
    use crate::error::{FetchError, ImportError};
    use crate::fetcher::{AlbumInfo, FetchOutput};
    use crate::importer::ImportOutcome;

    fn album(track_count: u32) -> AlbumInfo {
        AlbumInfo {
            title: "Test Album".to_string(),
            artist: "Test Artist".to_string(),
            year: Some(2020),
            track_count,
            tracks: vec![],
            playlist_id: Some("OLAK5uy_x".to_string()),
            url: "https://music.youtube.com/playlist?list=OLAK5uy_x".to_string(),
        }
    }

    /// Records a compact (kind, message) trace of reported events.
    #[derive(Default)]
    struct CollectingProgress {
        events: Mutex<Vec<(String, String)>>,
    }

    impl CollectingProgress {
        fn kinds(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(k, _)| k.clone())
                .collect()
        }

        fn last_message(&self) -> String {
            self.events
                .lock()
                .unwrap()
                .last()
                .map(|(_, m)| m.clone())
                .unwrap_or_default()
        }
    }

    impl ProgressReporter for CollectingProgress {
        fn report(&self, event: ProgressEvent) {
            let record = match event {
                ProgressEvent::Stage { status, message, .. } => {
                    (format!("stage:{status:?}"), message)
                }
                ProgressEvent::Detail { message, .. } => ("detail".to_string(), message),
                ProgressEvent::AlbumResolved { message, .. } => ("album".to_string(), message),
                ProgressEvent::Completed { message, .. } => ("completed".to_string(), message),
                ProgressEvent::Failed { error } => ("failed".to_string(), error),
                ProgressEvent::Cancelled { message } => ("cancelled".to_string(), message),
            };
            self.events.lock().unwrap().push(record);
        }
    }

    enum StubBehavior {
        Succeed,
        FailResolve,
        FailDownload,
    }

    struct StubFetcher {
        behavior: StubBehavior,
    }

    #[async_trait]
    impl crate::fetcher::Fetcher for StubFetcher {
        async fn resolve(&self, url: &str) -> Result<AlbumInfo, FetchError> {
            match self.behavior {
                StubBehavior::FailResolve => {
                    Err(FetchError::InvalidUrl(format!("'{url}' is not a valid URL")))
                }
                _ => Ok(album(3)),
            }
        }

        async fn download(
            &self,
            _url: &str,
            album: &AlbumInfo,
            dest: &Path,
            reporter: &dyn ProgressReporter,
            _cancel: &tokio_util::sync::CancellationToken,
        ) -> Result<FetchOutput, FetchError> {
            if matches!(self.behavior, StubBehavior::FailDownload) {
                return Err(FetchError::Download("HTTP 403".to_string()));
            }
            reporter.report(ProgressEvent::Detail {
                step: crate::broadcast::job_events::LogStep::Downloading,
                message: "Downloading: 50.0%".to_string(),
                progress: Some(50.0),
            });
            let file = dest.join("01 - track.opus");
            std::fs::write(&file, b"audio").ok();
            Ok(FetchOutput {
                output_dir: dest.to_path_buf(),
                files: vec![file],
                album: album.clone(),
            })
        }
    }

    struct StubImporter {
        fail: bool,
    }

    #[async_trait]
    impl crate::importer::Importer for StubImporter {
        async fn import(
            &self,
            fetched: &FetchOutput,
            _reporter: &dyn ProgressReporter,
            _cancel: &tokio_util::sync::CancellationToken,
        ) -> Result<ImportOutcome, ImportError> {
            if self.fail {
                return Err(ImportError::Failed("no match found".to_string()));
            }
            Ok(ImportOutcome {
                destination: Some(PathBuf::from("/library/Test Artist/Test Album")),
                album_name: Some("Test Album".to_string()),
                artist_name: Some("Test Artist".to_string()),
                track_count: fetched.files.len() as u32,
            })
        }
    }

    fn pipeline(behavior: StubBehavior, import_fails: bool, dir: &Path) -> SyncPipeline {
        SyncPipeline::new(
            Arc::new(StubFetcher { behavior }),
            Arc::new(StubImporter { fail: import_fails }),
            dir.to_path_buf(),
        )
    }

    fn test_job() -> Job {
        let store = JobStore::new(1);
        store
            .create("https://music.youtube.com/playlist?list=OLAK5uy_x", "opus")
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_run_reports_all_stages() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = pipeline(StubBehavior::Succeed, false, tmp.path());
        let reporter = CollectingProgress::default();
        let job = test_job();
        let job_id = job.id.clone();

        pipeline.run(job, &reporter, &CancellationToken::new()).await;

        let kinds = reporter.kinds();
        assert_eq!(
            kinds,
            vec![
                "stage:FetchingInfo",
                "album",
                "stage:Downloading",
                "detail",
                "stage:Importing",
                "completed",
            ]
        );
        assert!(reporter.last_message().contains("Sync complete"));
        // Working directory cleaned up on success.
        assert!(!tmp.path().join(&job_id).exists());
    }

    #[tokio::test]
    async fn test_resolve_failure_ends_failed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = pipeline(StubBehavior::FailResolve, false, tmp.path());
        let reporter = CollectingProgress::default();

        pipeline
            .run(test_job(), &reporter, &CancellationToken::new())
            .await;

        let kinds = reporter.kinds();
        assert_eq!(kinds.last().unwrap(), "failed");
        assert!(reporter.last_message().contains("Failed to fetch album info"));
    }

    #[tokio::test]
    async fn test_download_failure_ends_failed_and_cleans_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = pipeline(StubBehavior::FailDownload, false, tmp.path());
        let reporter = CollectingProgress::default();
        let job = test_job();
        let job_id = job.id.clone();

        pipeline.run(job, &reporter, &CancellationToken::new()).await;

        assert_eq!(reporter.kinds().last().unwrap(), "failed");
        assert!(!tmp.path().join(&job_id).exists());
    }

    #[tokio::test]
    async fn test_import_failure_ends_failed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = pipeline(StubBehavior::Succeed, true, tmp.path());
        let reporter = CollectingProgress::default();

        pipeline
            .run(test_job(), &reporter, &CancellationToken::new())
            .await;

        assert_eq!(reporter.kinds().last().unwrap(), "failed");
        assert!(reporter.last_message().contains("no match found"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pipeline = pipeline(StubBehavior::Succeed, false, tmp.path());
        let reporter = CollectingProgress::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        pipeline.run(test_job(), &reporter, &cancel).await;

        assert_eq!(reporter.kinds(), vec!["cancelled"]);
    }
}
