//! Request and response bodies for the jobs API.

use serde::{Deserialize, Serialize};

use discbox::{Job, LogEntry};

/// Request to create a new sync job.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub url: String,
    /// Overrides the configured audio format for this job.
    #[serde(default)]
    pub audio_format: Option<String>,
}

/// Response when a job is created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreatedResponse {
    pub id: String,
    pub message: &'static str,
}

impl JobCreatedResponse {
    pub fn new(id: String) -> Self {
        Self {
            id,
            message: "Job created",
        }
    }
}

/// Response for listing jobs: the full table plus all logs, for polling
/// clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub logs: Vec<LogEntry>,
}

/// Response when a job is cancelled.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub message: &'static str,
}

impl Default for CancelJobResponse {
    fn default() -> Self {
        Self {
            message: "Job cancelled",
        }
    }
}

/// Response when terminal jobs are cleared.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearJobsResponse {
    pub cleared: usize,
}
