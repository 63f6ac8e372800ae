//! Wire contract for the streaming sync flow.
//!
//! The server emits `progress` events while a job runs and one terminal
//! `complete` event that ends the stream. [`SseParser`] is the consumer
//! side: an incremental line parser that tolerates partial reads, skips
//! keepalive comments and `id:` lines, and drops malformed event bodies
//! instead of failing the stream.

use serde::{Deserialize, Serialize};
use serde_json::json;

use discbox::{AlbumInfo, JobProgressEvent, JobStatus, LogStep};

/// Payload of a `progress` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub step: LogStep,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Payload of the terminal `complete` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub track_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A decoded event from the sync stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Progress(ProgressPayload),
    Complete(CompletePayload),
}

/// Maps a broadcast job event onto the stream contract. Terminal events
/// become `complete`; everything else becomes `progress`.
pub fn stream_event_for(event: &JobProgressEvent) -> StreamEvent {
    if event.status.is_terminal() {
        let outcome = event.outcome.as_ref();
        StreamEvent::Complete(CompletePayload {
            success: event.status == JobStatus::Completed,
            album: outcome
                .and_then(|o| o.album.clone())
                .or_else(|| event.album.clone()),
            destination: outcome.and_then(|o| o.destination.clone()),
            track_count: outcome.map(|o| o.track_count).unwrap_or(0),
            error: match event.status {
                JobStatus::Completed => None,
                _ => Some(
                    event
                        .error
                        .clone()
                        .unwrap_or_else(|| event.message.clone()),
                ),
            },
        })
    } else {
        StreamEvent::Progress(ProgressPayload {
            step: event.step,
            message: event.message.clone(),
            progress: event.progress,
            details: event
                .album
                .as_ref()
                .map(|album| json!({ "album": album })),
        })
    }
}

impl StreamEvent {
    /// The SSE event name for this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Complete(_) => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete(_))
    }
}

// ─── Consumer-side parser ───────────────────────────────────────────────────

/// One framed (but not yet decoded) server-sent event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser.
///
/// Feed it chunks as they arrive off the socket; it returns the events
/// completed by each chunk. A partial line at a read boundary is buffered
/// and finished by the next chunk. Comment lines (leading `:`, used for
/// keepalive) and `id:` lines are skipped.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk of stream text, returning any events it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<RawEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.take_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn take_line(&mut self, line: &str) -> Option<RawEvent> {
        if line.is_empty() {
            // Blank line dispatches the pending event, if it has data.
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            let event = RawEvent {
                event: self.event.take(),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(event);
        }

        if line.starts_with(':') {
            // Keepalive comment.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and anything unknown is ignored.
            _ => {}
        }
        None
    }
}

/// Decodes a framed event into the stream contract.
///
/// Returns `None` for unknown event names and for malformed JSON bodies -
/// both are dropped by consumers, never treated as stream-fatal.
pub fn decode(raw: &RawEvent) -> Option<StreamEvent> {
    match raw.event.as_deref() {
        Some("progress") => serde_json::from_str(&raw.data)
            .ok()
            .map(StreamEvent::Progress),
        Some("complete") => serde_json::from_str(&raw.data)
            .ok()
            .map(StreamEvent::Complete),
        _ => None,
    }
}
