use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscboxError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("A job is already active")]
    JobConflict { active_job_id: Option<String> },

    #[error("Job {0} not found")]
    JobNotFound(String),

    #[error("Job {0} is not finished")]
    JobNotFinished(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Not a valid media collection URL: {0}")]
    InvalidUrl(String),

    #[error("Source unreachable: {0}")]
    Unreachable(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Failed to run fetch tool '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Fetch cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No audio files found in {0}")]
    NoAudioFiles(std::path::PathBuf),

    #[error("Import tool not found: {0}")]
    NotInstalled(String),

    #[error("Import failed: {0}")]
    Failed(String),

    #[error("I/O error during import: {0}")]
    Io(#[from] std::io::Error),

    #[error("Import cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if this error is the cooperative-cancellation signal
    /// rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl ImportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImportError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, DiscboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_cancelled_detection() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert!(!FetchError::Download("network reset".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = DiscboxError::JobNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Job abc not found");

        let err = DiscboxError::Fetch(FetchError::Unreachable("timed out".to_string()));
        assert!(err.to_string().contains("timed out"));
    }
}
