//! The fetch collaborator: resolves a collection URL and retrieves its
//! media files.

pub mod ytdlp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::pipeline::progress::ProgressReporter;

pub use ytdlp::YtdlpFetcher;

/// File extensions treated as audio output of a fetch.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg", "oga", "flac", "wav", "aac"];

/// A single track within a resolved collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub track_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Resolved collection metadata, known before any download starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumInfo {
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub track_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<TrackInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    pub url: String,
}

/// What a successful download leaves on disk.
#[derive(Debug, Clone)]
pub struct FetchOutput {
    /// Directory the files were written to.
    pub output_dir: PathBuf,
    /// The retrieved audio files.
    pub files: Vec<PathBuf>,
    /// The collection they belong to.
    pub album: AlbumInfo,
}

/// Turns a URL into media files plus metadata.
///
/// Both operations may take minutes; `download` must honor the
/// cancellation token mid-flight (killing any underlying subprocess), not
/// merely check a flag between calls.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Pre-flight resolution: collection metadata without downloading.
    async fn resolve(&self, url: &str) -> Result<AlbumInfo, FetchError>;

    /// Retrieves the collection into `dest`, reporting progress as it goes.
    async fn download(
        &self,
        url: &str,
        album: &AlbumInfo,
        dest: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError>;
}

/// Lists the audio files directly inside `dir`, sorted by name.
pub fn collect_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_audio_extension(p))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
