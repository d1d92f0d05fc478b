use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tq_core::domain::error::{ErrorCode, PipelineError};
use tq_core::domain::job::{JobInfo, JobState, UploadedAudio};
use tq_core::infra::metrics::MetricsSummary;

use crate::responses::{ErrorPayload, HealthResponse, JobListResponse, SubmitResponse};
use crate::AppState;

/// アップロードを受け取るフォームフィールド名
pub const AUDIO_FIELD: &str = "audio";

/// ハンドラのエラー型（JSON の ErrorPayload として返す）
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Pipeline(PipelineError::Upload(_)) => StatusCode::BAD_REQUEST,
            Self::Pipeline(PipelineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Multipart(e) => e.status(),
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            Self::Pipeline(e) => e.code(),
            Self::Multipart(_) => ErrorCode::Upload,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = ErrorPayload {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(payload)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `audio` フィールドを優先し、なければ最初のファイルフィールドを使う。
async fn read_upload(multipart: &mut Multipart) -> ApiResult<UploadedAudio> {
    let mut fallback: Option<UploadedAudio> = None;
    while let Some(field) = multipart.next_field().await? {
        let is_audio = field.name() == Some(AUDIO_FIELD);
        let file_name = field.file_name().map(str::to_string);
        if !is_audio && (file_name.is_none() || fallback.is_some()) {
            continue;
        }

        let bytes = field.bytes().await?;
        let mut upload = UploadedAudio::new(bytes.to_vec());
        if let Some(name) = file_name {
            upload = upload.with_file_name(name);
        }
        if is_audio {
            return Ok(upload);
        }
        fallback = Some(upload);
    }
    fallback.ok_or_else(|| PipelineError::Upload(format!("missing `{AUDIO_FIELD}` field")).into())
}

pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let upload = read_upload(&mut multipart).await.inspect_err(|e| {
        log::warn!("Rejected upload: {e}");
    })?;
    let job_id = state.manager.submit(upload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobState::Running,
        }),
    ))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobInfo>> {
    Ok(Json(state.manager.status(&job_id).await?))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.manager.list().await,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        jobs: state.manager.store().len().await,
    })
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.manager.metrics())
}
