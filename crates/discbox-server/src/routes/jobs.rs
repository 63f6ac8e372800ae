//! Queue control surface: submit, list, cancel, delete, clear, and the
//! push event feed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::error::ServerError;
use crate::schemas::{
    CancelJobResponse, ClearJobsResponse, CreateJobRequest, JobCreatedResponse, JobListResponse,
};
use crate::state::AppState;

/// `POST /api/jobs` — validate and enqueue a job.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobCreatedResponse>), ServerError> {
    let audio_format = request
        .audio_format
        .as_deref()
        .unwrap_or(&state.config.audio_format);

    let job = state.scheduler.submit(&request.url, audio_format)?;
    Ok((StatusCode::ACCEPTED, Json(JobCreatedResponse::new(job.id))))
}

/// `GET /api/jobs` — the full table plus all logs, insertion order.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    let store = state.scheduler.store();
    Json(JobListResponse {
        jobs: store.list(),
        logs: store.logs(),
    })
}

/// `POST /api/jobs/{id}/cancel`.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelJobResponse>, ServerError> {
    state.scheduler.cancel(&job_id)?;
    Ok(Json(CancelJobResponse::default()))
}

/// `DELETE /api/jobs/{id}` — terminal jobs only.
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.scheduler.store().delete(&job_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/jobs` — remove all terminal jobs.
pub async fn clear_jobs(State(state): State<Arc<AppState>>) -> Json<ClearJobsResponse> {
    Json(ClearJobsResponse {
        cleared: state.scheduler.store().clear(),
    })
}

/// `GET /api/jobs/stream` — push feed of progress events for all jobs.
///
/// Slow consumers lag and miss events rather than ever blocking job
/// execution; pollers can always re-read the full state from the list
/// endpoint.
pub async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.scheduler.broadcaster().subscribe();

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => {
                        return Some((
                            Ok(Event::default().event("progress").data(data)),
                            rx,
                        ))
                    }
                    Err(_) => continue,
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
