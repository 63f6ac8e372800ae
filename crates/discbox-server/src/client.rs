//! Client for the streaming sync flow, used by the `sync` subcommand.

use anyhow::{bail, Context};
use futures_util::StreamExt;
use serde_json::json;

use crate::sse::{decode, SseParser, StreamEvent};

/// Submits a sync job to a running server and prints progress lines until
/// the terminal event arrives. Returns whether the sync succeeded.
pub async fn run_sync(server: &str, url: &str, audio_format: Option<&str>) -> anyhow::Result<bool> {
    let endpoint = format!("{}/api/sync", server.trim_end_matches('/'));

    let mut body = json!({ "url": url });
    if let Some(format) = audio_format {
        body["audioFormat"] = json!(format);
    }

    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("failed to reach {endpoint}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        bail!("server rejected sync request ({status}): {text}");
    }

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("stream read failed")?;
        for raw in parser.push(&String::from_utf8_lossy(&chunk)) {
            // Malformed bodies are dropped by decode(), not stream-fatal.
            match decode(&raw) {
                Some(StreamEvent::Progress(progress)) => match progress.progress {
                    Some(percent) => println!("[{:>5.1}%] {}", percent, progress.message),
                    None => println!("        {}", progress.message),
                },
                Some(StreamEvent::Complete(complete)) => {
                    if complete.success {
                        println!("Sync complete ({} tracks)", complete.track_count);
                        if let Some(destination) = &complete.destination {
                            println!("Library location: {destination}");
                        }
                    } else {
                        eprintln!(
                            "Sync failed: {}",
                            complete.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    return Ok(complete.success);
                }
                None => {}
            }
        }
    }

    bail!("stream ended without a complete event")
}
