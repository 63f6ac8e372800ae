//! Importer implementation backed by the beets CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::broadcast::job_events::LogStep;
use crate::error::ImportError;
use crate::fetcher::FetchOutput;
use crate::pipeline::progress::{ProgressEvent, ProgressReporter};

use super::{ImportOutcome, Importer};

/// Tags and organizes albums via `beet import -q` (quiet, non-interactive).
pub struct BeetsImporter {
    beets_config: PathBuf,
    library_dir: PathBuf,
    tool: String,
}

impl BeetsImporter {
    pub fn new(beets_config: &Path, library_dir: &Path) -> Self {
        Self {
            beets_config: beets_config.to_path_buf(),
            library_dir: library_dir.to_path_buf(),
            tool: "beet".to_string(),
        }
    }

    /// Override the tool binary (tests point this at a stub script).
    pub fn with_tool(mut self, tool: &str) -> Self {
        self.tool = tool.to_string();
        self
    }
}

#[async_trait]
impl Importer for BeetsImporter {
    async fn import(
        &self,
        fetched: &FetchOutput,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, ImportError> {
        if fetched.files.is_empty() {
            return Err(ImportError::NoAudioFiles(fetched.output_dir.clone()));
        }

        reporter.report(ProgressEvent::Detail {
            step: LogStep::Importing,
            message: format!("Importing {} tracks with beets...", fetched.files.len()),
            progress: Some(0.0),
        });

        let mut cmd = Command::new(&self.tool);
        cmd.arg("--config")
            .arg(&self.beets_config)
            .args(["import", "-q"])
            .arg(&fetched.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(beets_dir) = self.beets_config.parent() {
            cmd.env("BEETSDIR", beets_dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImportError::NotInstalled(self.tool.clone())
            } else {
                ImportError::Io(e)
            }
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task = async {
            let mut lines_seen = Vec::new();
            if let Some(stdout) = stdout_pipe {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        reporter.report(ProgressEvent::Detail {
                            step: LogStep::Log,
                            message: trimmed.to_string(),
                            progress: None,
                        });
                        lines_seen.push(trimmed.to_string());
                    }
                }
            }
            lines_seen
        };

        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("beets: {}", line);
                    collected.push(line);
                }
            }
            collected
        };

        let (stdout_lines, stderr_lines) = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(ImportError::Cancelled);
            }
            lines = async { tokio::join!(stdout_task, stderr_task) } => lines,
        };

        let waited = {
            let wait = child.wait();
            tokio::pin!(wait);
            tokio::select! {
                _ = cancel.cancelled() => None,
                status = &mut wait => Some(status),
            }
        };
        let status = match waited {
            Some(status) => status.map_err(ImportError::Io)?,
            None => {
                let _ = child.kill().await;
                return Err(ImportError::Cancelled);
            }
        };

        if !status.success() {
            let detail = stderr_lines
                .last()
                .or(stdout_lines.last())
                .cloned()
                .unwrap_or_else(|| format!("beets exited with {status}"));
            return Err(ImportError::Failed(detail));
        }

        let (artist_name, album_name) = parse_tagged_album(&stdout_lines)
            .map(|(a, b)| (Some(a), Some(b)))
            .unwrap_or((None, None));

        Ok(ImportOutcome {
            destination: find_imported_album(&self.library_dir),
            album_name,
            artist_name,
            track_count: fetched.files.len() as u32,
        })
    }
}

/// Extracts "Artist - Album" from beets output. Quiet-mode imports print a
/// `Tagging:` line followed by the indented pair.
fn parse_tagged_album(lines: &[String]) -> Option<(String, String)> {
    let mut after_tagging = false;
    for line in lines {
        if after_tagging {
            if let Some((artist, album)) = line.split_once(" - ") {
                return Some((artist.trim().to_string(), album.trim().to_string()));
            }
            after_tagging = false;
        }
        if line.trim() == "Tagging:" {
            after_tagging = true;
        } else if let Some(rest) = line.trim().strip_prefix("Tagging: ") {
            if let Some((artist, album)) = rest.split_once(" - ") {
                return Some((artist.trim().to_string(), album.trim().to_string()));
            }
        }
    }
    None
}

/// Finds the album directory most recently modified under the library
/// (artist/album layout). Best-effort; `None` when the layout is empty.
fn find_imported_album(library_dir: &Path) -> Option<PathBuf> {
    WalkDir::new(library_dir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.into_path(), modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}
