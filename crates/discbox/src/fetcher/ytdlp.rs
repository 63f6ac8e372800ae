//! Fetcher implementation backed by the yt-dlp CLI.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broadcast::job_events::LogStep;
use crate::error::FetchError;
use crate::pipeline::progress::{ProgressEvent, ProgressReporter};

use super::{collect_audio_files, AlbumInfo, FetchOutput, Fetcher, TrackInfo};

// Pre-compiled regexes for parsing yt-dlp progress output
static RE_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[download\]\s+([\d.]+)%").unwrap());
static RE_SPEED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"at\s+([\d.]+\S*B/s)").unwrap());
static RE_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[download\] Downloading item (\d+) of (\d+)").unwrap());

/// Retrieves collections via the `yt-dlp` command-line tool.
pub struct YtdlpFetcher {
    audio_format: String,
    audio_quality: String,
    tool: String,
}

impl YtdlpFetcher {
    pub fn new(audio_format: &str, audio_quality: &str) -> Self {
        Self {
            audio_format: audio_format.to_string(),
            audio_quality: audio_quality.to_string(),
            tool: "yt-dlp".to_string(),
        }
    }

    /// Override the tool binary (tests point this at a stub script).
    pub fn with_tool(mut self, tool: &str) -> Self {
        self.tool = tool.to_string();
        self
    }

    fn spawn_error(&self, source: std::io::Error) -> FetchError {
        FetchError::Spawn {
            tool: self.tool.clone(),
            source,
        }
    }
}

#[async_trait]
impl Fetcher for YtdlpFetcher {
    async fn resolve(&self, url: &str) -> Result<AlbumInfo, FetchError> {
        let output = Command::new(&self.tool)
            .args(["--dump-single-json", "--no-warnings", "--flat-playlist", url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_resolve_failure(&stderr));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::Unreachable(format!("unparseable metadata: {e}")))?;
        Ok(parse_album_info(&info, url))
    }

    async fn download(
        &self,
        url: &str,
        album: &AlbumInfo,
        dest: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        let template = dest.join("%(playlist_index|0)02d - %(title)s.%(ext)s");

        let mut cmd = Command::new(&self.tool);
        cmd.args(["-f", "bestaudio/best"])
            .args(["-x", "--audio-format", self.audio_format.as_str()])
            .args(["--audio-quality", self.audio_quality.as_str()])
            .args(["--embed-metadata", "--embed-thumbnail"])
            .args(["--newline", "--no-warnings", "--ignore-errors"])
            .arg("-o")
            .arg(&template)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let total_tracks = album.track_count.max(1);
        let mut scaler = StageProgress::new(total_tracks);

        let stdout_task = async {
            if let Some(stdout) = stdout_pipe {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some((message, progress)) = scaler.observe(&line) {
                        reporter.report(ProgressEvent::Detail {
                            step: LogStep::Downloading,
                            message,
                            progress: Some(progress),
                        });
                    }
                }
            }
        };

        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {}", line);
                    collected.push(line);
                }
            }
            collected
        };

        let stderr_lines = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(FetchError::Cancelled);
            }
            ((), stderr_lines) = async { tokio::join!(stdout_task, stderr_task) } => stderr_lines,
        };

        // The wait future borrows the child mutably, so scope it before
        // killing on cancellation.
        let waited = {
            let wait = child.wait();
            tokio::pin!(wait);
            tokio::select! {
                _ = cancel.cancelled() => None,
                status = &mut wait => Some(status),
            }
        };
        let status = match waited {
            Some(status) => status.map_err(|e| self.spawn_error(e))?,
            None => {
                let _ = child.kill().await;
                return Err(FetchError::Cancelled);
            }
        };

        let files = collect_audio_files(dest);

        if !status.success() && files.is_empty() {
            let tail = stderr_lines
                .iter()
                .rev()
                .find(|l| l.starts_with("ERROR"))
                .cloned()
                .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
            return Err(FetchError::Download(tail));
        }
        if files.is_empty() {
            return Err(FetchError::Download(
                "No files were downloaded".to_string(),
            ));
        }

        Ok(FetchOutput {
            output_dir: dest.to_path_buf(),
            files,
            album: album.clone(),
        })
    }
}

/// Maps per-track yt-dlp progress onto a monotonic 0–100 value for the
/// whole downloading stage.
struct StageProgress {
    total_tracks: u32,
    current_item: u32,
}

impl StageProgress {
    fn new(total_tracks: u32) -> Self {
        Self {
            total_tracks,
            current_item: 1,
        }
    }

    /// Returns a (message, stage-progress) pair for lines worth reporting.
    fn observe(&mut self, line: &str) -> Option<(String, f64)> {
        if let Some(caps) = RE_ITEM.captures(line) {
            self.current_item = caps[1].parse().unwrap_or(self.current_item);
            if let Some(total) = caps[2].parse::<u32>().ok().filter(|t| *t > 0) {
                self.total_tracks = total;
            }
            let progress = self.stage_progress(0.0);
            return Some((
                format!(
                    "Downloading track {} of {}",
                    self.current_item, self.total_tracks
                ),
                progress,
            ));
        }

        if let Some(caps) = RE_PERCENT.captures(line) {
            let track_percent: f64 = caps[1].parse().ok()?;
            let progress = self.stage_progress(track_percent);
            let message = match RE_SPEED.captures(line) {
                Some(speed) => format!("Downloading: {:.1}% at {}", track_percent, &speed[1]),
                None => format!("Downloading: {track_percent:.1}%"),
            };
            return Some((message, progress));
        }

        None
    }

    fn stage_progress(&self, track_percent: f64) -> f64 {
        let done = f64::from(self.current_item.saturating_sub(1));
        let total = f64::from(self.total_tracks.max(1));
        ((done + track_percent / 100.0) / total * 100.0).clamp(0.0, 100.0)
    }
}

fn classify_resolve_failure(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    if lower.contains("is not a valid url")
        || lower.contains("unsupported url")
        || lower.contains("incomplete youtube id")
    {
        FetchError::InvalidUrl(first_error_line(stderr))
    } else {
        FetchError::Unreachable(first_error_line(stderr))
    }
}

fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .find(|l| l.starts_with("ERROR"))
        .unwrap_or_else(|| stderr.lines().next().unwrap_or("unknown error"))
        .to_string()
}

/// Builds [`AlbumInfo`] from a yt-dlp JSON dump.
fn parse_album_info(info: &serde_json::Value, url: &str) -> AlbumInfo {
    let str_of = |v: &serde_json::Value, key: &str| -> Option<String> {
        v.get(key).and_then(|x| x.as_str()).map(|s| s.to_string())
    };

    if let Some(entries) = info.get("entries").and_then(|e| e.as_array()) {
        let tracks: Vec<TrackInfo> = entries
            .iter()
            .filter(|e| !e.is_null())
            .enumerate()
            .map(|(i, entry)| TrackInfo {
                title: str_of(entry, "title").unwrap_or_else(|| format!("Track {}", i + 1)),
                artist: str_of(entry, "artist")
                    .or_else(|| str_of(entry, "uploader"))
                    .unwrap_or_else(|| "Unknown".to_string()),
                track_number: (i + 1) as u32,
                duration: entry.get("duration").and_then(|d| d.as_f64()).map(|d| d as u32),
            })
            .collect();

        return AlbumInfo {
            title: str_of(info, "title").unwrap_or_else(|| "Unknown Album".to_string()),
            artist: str_of(info, "uploader")
                .or_else(|| str_of(info, "channel"))
                .unwrap_or_else(|| "Unknown".to_string()),
            year: extract_year(info),
            track_count: tracks.len() as u32,
            tracks,
            playlist_id: str_of(info, "id"),
            url: url.to_string(),
        };
    }

    // Single track
    AlbumInfo {
        title: str_of(info, "album")
            .or_else(|| str_of(info, "title"))
            .unwrap_or_else(|| "Unknown".to_string()),
        artist: str_of(info, "artist")
            .or_else(|| str_of(info, "uploader"))
            .unwrap_or_else(|| "Unknown".to_string()),
        year: extract_year(info),
        track_count: 1,
        tracks: vec![TrackInfo {
            title: str_of(info, "title").unwrap_or_else(|| "Unknown".to_string()),
            artist: str_of(info, "artist").unwrap_or_else(|| "Unknown".to_string()),
            track_number: 1,
            duration: info.get("duration").and_then(|d| d.as_f64()).map(|d| d as u32),
        }],
        playlist_id: str_of(info, "id"),
        url: url.to_string(),
    }
}

/// Year from `release_year`, falling back to the first four digits of
/// `upload_date`.
fn extract_year(info: &serde_json::Value) -> Option<i32> {
    if let Some(year) = info.get("release_year").and_then(|y| y.as_i64()) {
        return Some(year as i32);
    }
    info.get("upload_date")
        .and_then(|d| d.as_str())
        .filter(|d| d.len() >= 4)
        .and_then(|d| d[..4].parse().ok())
}
