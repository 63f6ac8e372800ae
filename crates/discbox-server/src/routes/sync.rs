//! The single-job streaming sync flow.
//!
//! Submits through the scheduler like any other job - the single-flight
//! invariant holds across both bindings - then streams that job's events
//! until the terminal `complete` event ends the stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::error::ServerError;
use crate::schemas::CreateJobRequest;
use crate::sse::{stream_event_for, StreamEvent};
use crate::state::AppState;

/// `POST /api/sync` — submit a job and stream its progress.
pub async fn sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateJobRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    // Subscribe before submitting so no event can be missed.
    let rx = state.scheduler.broadcaster().subscribe();

    let audio_format = request
        .audio_format
        .as_deref()
        .unwrap_or(&state.config.audio_format);
    let job = state.scheduler.submit(&request.url, audio_format)?;

    let stream = futures_util::stream::unfold(
        (rx, job.id, false),
        |(mut rx, job_id, finished)| async move {
            if finished {
                return None;
            }
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                };
                if event.job_id != job_id {
                    continue;
                }

                let stream_event = stream_event_for(&event);
                let terminal = stream_event.is_terminal();
                let data = match &stream_event {
                    StreamEvent::Progress(p) => serde_json::to_string(p),
                    StreamEvent::Complete(c) => serde_json::to_string(c),
                };
                let Ok(data) = data else { continue };

                let event = Event::default()
                    .event(stream_event.event_name())
                    .data(data);
                return Some((Ok(event), (rx, job_id, terminal)));
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
