//! Shared harness for queue integration tests.
//!
//! Provides scripted Fetcher/Importer collaborators whose behavior is keyed
//! off the submitted URL (`fail-resolve`, `fail-download`, `fail-import`
//! markers), plus instrumentation for asserting the single-flight and FIFO
//! properties: a gauge counting concurrently-executing collaborator calls
//! and a record of the order in which downloads started.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use discbox::broadcast::job_events::LogStep;
use discbox::pipeline::progress::{ProgressEvent, ProgressReporter};
use discbox::{
    AlbumInfo, FetchError, FetchOutput, Fetcher, ImportError, ImportOutcome, Importer, Job,
    JobProgressBroadcaster, JobStatus, JobStore, Scheduler, SyncPipeline,
};

/// Counts how many collaborator calls are in flight, remembering the peak.
#[derive(Default)]
pub struct FlightGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FlightGauge {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct ScriptedFetcher {
    pub gauge: Arc<FlightGauge>,
    pub started: Arc<Mutex<Vec<String>>>,
    pub steps: u32,
    pub step_delay: Duration,
}

impl ScriptedFetcher {
    fn album(url: &str, track_count: u32) -> AlbumInfo {
        AlbumInfo {
            title: "Scripted Album".to_string(),
            artist: "Scripted Artist".to_string(),
            year: Some(2023),
            track_count,
            tracks: vec![],
            playlist_id: None,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn resolve(&self, url: &str) -> Result<AlbumInfo, FetchError> {
        if url.contains("fail-resolve") {
            return Err(FetchError::InvalidUrl(format!(
                "'{url}' is not a valid URL"
            )));
        }
        Ok(Self::album(url, 3))
    }

    async fn download(
        &self,
        url: &str,
        album: &AlbumInfo,
        dest: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        self.started.lock().unwrap().push(url.to_string());
        self.gauge.enter();
        let result = self.download_inner(url, album, dest, reporter, cancel).await;
        self.gauge.exit();
        result
    }
}

impl ScriptedFetcher {
    async fn download_inner(
        &self,
        url: &str,
        album: &AlbumInfo,
        dest: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        for step in 0..self.steps {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(self.step_delay) => {}
            }

            let progress = f64::from(step + 1) / f64::from(self.steps) * 100.0;
            reporter.report(ProgressEvent::Detail {
                step: LogStep::Downloading,
                message: format!("Downloading: {progress:.1}%"),
                progress: Some(progress),
            });
        }

        if url.contains("fail-download") {
            return Err(FetchError::Download("simulated download failure".to_string()));
        }

        Ok(FetchOutput {
            output_dir: dest.to_path_buf(),
            files: vec![dest.join("01 - track.opus")],
            album: album.clone(),
        })
    }
}

pub struct ScriptedImporter {
    pub gauge: Arc<FlightGauge>,
}

#[async_trait]
impl Importer for ScriptedImporter {
    async fn import(
        &self,
        fetched: &FetchOutput,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, ImportError> {
        self.gauge.enter();
        let result = self.import_inner(fetched, reporter, cancel).await;
        self.gauge.exit();
        result
    }
}

impl ScriptedImporter {
    async fn import_inner(
        &self,
        fetched: &FetchOutput,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, ImportError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ImportError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }

        if fetched.album.url.contains("fail-import") {
            return Err(ImportError::Failed("simulated import failure".to_string()));
        }

        reporter.report(ProgressEvent::Detail {
            step: LogStep::Importing,
            message: "Tagged album".to_string(),
            progress: Some(100.0),
        });

        Ok(ImportOutcome {
            destination: Some(fetched.output_dir.join("library")),
            album_name: Some(fetched.album.title.clone()),
            artist_name: Some(fetched.album.artist.clone()),
            track_count: fetched.files.len() as u32,
        })
    }
}

pub struct QueueHarness {
    pub scheduler: Arc<Scheduler>,
    pub gauge: Arc<FlightGauge>,
    pub started: Arc<Mutex<Vec<String>>>,
    _tmp: TempDir,
}

impl QueueHarness {
    /// Builds a scheduler over scripted collaborators. `steps` × 10 ms is
    /// roughly how long each download takes.
    pub fn new(queue_capacity: usize, steps: u32) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let gauge = Arc::new(FlightGauge::default());
        let started = Arc::new(Mutex::new(Vec::new()));

        let fetcher = ScriptedFetcher {
            gauge: Arc::clone(&gauge),
            started: Arc::clone(&started),
            steps,
            step_delay: Duration::from_millis(10),
        };
        let importer = ScriptedImporter {
            gauge: Arc::clone(&gauge),
        };

        let store = Arc::new(JobStore::new(queue_capacity));
        let pipeline = Arc::new(SyncPipeline::new(
            Arc::new(fetcher),
            Arc::new(importer),
            tmp.path().to_path_buf(),
        ));
        let scheduler = Scheduler::spawn(store, pipeline, JobProgressBroadcaster::new(512));

        Self {
            scheduler,
            gauge,
            started,
            _tmp: tmp,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        self.scheduler.store()
    }

    pub fn submit(&self, url: &str) -> discbox::Result<Job> {
        self.scheduler.submit(url, "opus")
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_terminal(&self, job_id: &str) -> Job {
        for _ in 0..500 {
            if let Some(job) = self.store().get(job_id) {
                if job.is_finished() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} did not reach a terminal state");
    }

    /// Polls until the job reaches the given status.
    pub async fn wait_status(&self, job_id: &str, status: JobStatus) {
        for _ in 0..500 {
            if let Some(job) = self.store().get(job_id) {
                if job.status == status {
                    return;
                }
                if job.is_finished() {
                    panic!(
                        "job {job_id} finished as {:?} before reaching {status:?}",
                        job.status
                    );
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached {status:?}");
    }

    pub fn started_urls(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

pub fn url(tag: &str) -> String {
    format!("https://music.youtube.com/playlist?list=OLAK5uy_{tag}")
}
