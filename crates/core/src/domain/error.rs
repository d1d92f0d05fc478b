use serde::Serialize;

use super::engine::ProcessFailure;

/// ジョブ失敗の分類コード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_UPLOAD")]
    Upload,
    #[serde(rename = "E_CONVERSION")]
    Conversion,
    #[serde(rename = "E_PROBE")]
    Probe,
    #[serde(rename = "E_SEGMENTATION")]
    Segmentation,
    #[serde(rename = "E_ENGINE")]
    Engine,
    #[serde(rename = "E_RESOURCE_EXHAUSTED")]
    ResourceExhausted,
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "E_UPLOAD",
            Self::Conversion => "E_CONVERSION",
            Self::Probe => "E_PROBE",
            Self::Segmentation => "E_SEGMENTATION",
            Self::Engine => "E_ENGINE",
            Self::ResourceExhausted => "E_RESOURCE_EXHAUSTED",
            Self::NotFound => "E_NOT_FOUND",
            Self::Internal => "E_INTERNAL",
        }
    }
}

/// パイプライン全体のエラー
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("upload rejected: {0}")]
    Upload(String),
    #[error("audio conversion failed: {0}")]
    Conversion(ProcessFailure),
    /// 長さ取得の失敗。ジョブは失敗させず、ログに出して単一パスで続行する。
    #[error("duration probe failed: {0}")]
    Probe(ProcessFailure),
    #[error("segmentation failed: {message}")]
    Segmentation {
        message: String,
        failure: Option<ProcessFailure>,
    },
    #[error("segment {segment_index} transcription failed: {failure}")]
    Engine {
        segment_index: usize,
        failure: ProcessFailure,
    },
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn segmentation(message: impl Into<String>) -> Self {
        Self::Segmentation {
            message: message.into(),
            failure: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Upload(_) => ErrorCode::Upload,
            Self::Conversion(_) => ErrorCode::Conversion,
            Self::Probe(_) => ErrorCode::Probe,
            Self::Segmentation { .. } => ErrorCode::Segmentation,
            Self::Engine { failure, .. } if failure.resource_exhausted => {
                ErrorCode::ResourceExhausted
            }
            Self::Engine { .. } => ErrorCode::Engine,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    fn process_failure(&self) -> Option<&ProcessFailure> {
        match self {
            Self::Conversion(f) | Self::Probe(f) => Some(f),
            Self::Segmentation { failure, .. } => failure.as_ref(),
            Self::Engine { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// ステータス照会で返す構造化エラーに変換する。
    pub fn to_failure(&self) -> JobFailure {
        let process = self.process_failure();
        JobFailure {
            code: self.code(),
            message: self.to_string(),
            segment_index: match self {
                Self::Engine { segment_index, .. } => Some(*segment_index),
                _ => None,
            },
            exit_code: process.and_then(|f| f.exit_code),
            stderr: process.map(|f| f.stderr.clone()).filter(|s| !s.is_empty()),
            resource_exhausted: process.is_some_and(|f| f.resource_exhausted),
        }
    }
}

/// ジョブの失敗内容（ステータスレスポンス兼用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub resource_exhausted: bool,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}
