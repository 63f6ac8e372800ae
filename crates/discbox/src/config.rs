//! Runtime configuration, loaded from environment variables at startup.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Runtime configuration for discbox.
///
/// Every field has a sensible default so the service works out-of-the-box
/// without any environment variables set. All variables carry the
/// `DISCBOX_` prefix.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the organized music library (default: `./data/library`).
    pub library_dir: PathBuf,

    /// Root for per-job download working directories (default: a
    /// `discbox` subdirectory of the system temp dir).
    pub download_dir: PathBuf,

    /// Path to the beets configuration file (default: `./beets/config.yaml`).
    /// The file itself points at the beets database.
    pub beets_config: PathBuf,

    /// Audio format for downloads. `opus` keeps the source codec for most
    /// YouTube Music content so no transcoding happens.
    pub audio_format: String,

    /// Audio quality passed to the fetch tool (`0` = best).
    pub audio_quality: String,

    /// Maximum number of non-terminal jobs the store accepts. With the
    /// default of 1, submitting while any job is pending or running is
    /// rejected with a conflict; larger values queue pending jobs behind
    /// the single running one.
    pub queue_capacity: usize,

    /// TCP host to bind (default: `127.0.0.1`).
    pub host: String,

    /// TCP port to bind (default: `8337`).
    pub port: u16,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let temp_download = std::env::temp_dir().join("discbox");

        Self {
            library_dir: path_env("DISCBOX_LIBRARY_DIR", "data/library"),
            download_dir: std::env::var("DISCBOX_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(temp_download),
            beets_config: path_env("DISCBOX_BEETS_CONFIG", "beets/config.yaml"),
            audio_format: env_or("DISCBOX_AUDIO_FORMAT", "opus"),
            audio_quality: env_or("DISCBOX_AUDIO_QUALITY", "0"),
            queue_capacity: parse_env("DISCBOX_QUEUE_CAPACITY", 1),
            host: env_or("DISCBOX_HOST", "127.0.0.1"),
            port: parse_env("DISCBOX_PORT", 8337),
        }
    }

    /// Validates the configuration and creates the working directories.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DISCBOX_QUEUE_CAPACITY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        for dir in [&self.library_dir, &self.download_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDirectory {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

// ── private helpers ─────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn path_env(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_env();
        assert_eq!(config.audio_quality, "0");
        assert!(config.queue_capacity >= 1);
        assert!(config.port > 0);
    }

    #[test]
    fn test_prepare_rejects_zero_capacity() {
        let mut config = Config::from_env();
        config.queue_capacity = 0;
        assert!(matches!(
            config.prepare(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_prepare_creates_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::from_env();
        config.library_dir = tmp.path().join("library");
        config.download_dir = tmp.path().join("downloads");
        config.queue_capacity = 1;

        config.prepare().unwrap();

        assert!(config.library_dir.is_dir());
        assert!(config.download_dir.is_dir());
    }
}
