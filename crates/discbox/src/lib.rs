pub mod broadcast;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod importer;
pub mod pipeline;
pub mod url;
pub mod worker;

pub use broadcast::{
    Job, JobOutcome, JobProgressBroadcaster, JobProgressEvent, JobStatus, JobStore, LogEntry,
    LogStep,
};
pub use config::Config;
pub use error::{ConfigError, DiscboxError, FetchError, ImportError, Result};
pub use fetcher::{AlbumInfo, FetchOutput, Fetcher, TrackInfo, YtdlpFetcher};
pub use importer::{BeetsImporter, ImportOutcome, Importer};
pub use pipeline::SyncPipeline;
pub use worker::Scheduler;
