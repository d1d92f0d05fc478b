use serde::Serialize;

use tq_core::domain::error::ErrorCode;
use tq_core::domain::job::{JobInfo, JobState};

/// POST /transcribe のレスポンス
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobState,
}

/// GET /jobs のレスポンス
#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobInfo>,
}

/// GET /health のレスポンス
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub jobs: usize,
}

/// エラーレスポンス
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}
