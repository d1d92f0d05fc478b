use serde::Serialize;

use super::error::JobFailure;

/// ジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed / Failed からは遷移しない
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// ジョブメタデータ（ステータス照会のスナップショット兼用）
///
/// `result` は Completed のときだけ、`error` は Failed のときだけ設定される。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_count: Option<usize>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobInfo {
    pub fn new(job_id: String, now: String) -> Self {
        Self {
            job_id,
            state: JobState::Pending,
            result: None,
            error: None,
            segment_count: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// アップロードされた音声（コンテナ/コーデックは任意）
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    /// クライアントが送ったファイル名（拡張子のヒントにのみ使う）
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedAudio {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            bytes,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// ファイル名から安全な拡張子だけを取り出す（英数字のみ、8文字まで）。
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}
