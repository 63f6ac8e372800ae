//! The import collaborator: tags retrieved files and moves them into the
//! organized library.

pub mod beets;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ImportError;
use crate::fetcher::FetchOutput;
use crate::pipeline::progress::ProgressReporter;

pub use beets::BeetsImporter;

/// Result of a tagging/organization run.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// Final location of the album inside the library, when discoverable.
    pub destination: Option<PathBuf>,
    /// Album name as decided by the tagger.
    pub album_name: Option<String>,
    /// Artist name as decided by the tagger.
    pub artist_name: Option<String>,
    /// Number of tracks imported.
    pub track_count: u32,
}

/// Classifies, tags, and moves fetched files into the library layout.
///
/// Like the fetcher, an import may take minutes and must honor the
/// cancellation token mid-flight.
#[async_trait]
pub trait Importer: Send + Sync {
    async fn import(
        &self,
        fetched: &FetchOutput,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, ImportError>;
}
