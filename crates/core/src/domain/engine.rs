use std::path::{Path, PathBuf};

use serde::Serialize;

// ─── ProcessFailure ──────────────────────────────────────────────

/// 外部プロセス (ffmpeg / ffprobe / whisper-cli) の失敗情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessFailure {
    /// 実行したプログラム名
    pub program: String,
    /// 終了コード。シグナル終了の場合は `-signal`、起動できなかった場合は None。
    pub exit_code: Option<i32>,
    /// 捕捉した stderr (末尾のみ保持)
    pub stderr: String,
    /// kill シグナルによる終了 (OOM killer 等) と推定されるか
    pub resource_exhausted: bool,
}

impl ProcessFailure {
    pub fn exited(
        program: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
        resource_exhausted: bool,
    ) -> Self {
        Self {
            program: program.into(),
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            resource_exhausted,
        }
    }

    /// プロセスを起動できなかった (バイナリ未検出、権限不足など)。
    pub fn not_started(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            exit_code: None,
            stderr: detail.into(),
            resource_exhausted: false,
        }
    }

    /// 正常終了したが出力が解釈できなかった。
    pub fn invalid_output(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            exit_code: Some(0),
            stderr: detail.into(),
            resource_exhausted: false,
        }
    }
}

impl std::fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) if self.resource_exhausted => write!(
                f,
                "{} was killed (exit code {code}, likely resource exhaustion): {}",
                self.program, self.stderr
            ),
            Some(code) => write!(f, "{} exited with code {code}: {}", self.program, self.stderr),
            None => write!(f, "{} could not be started: {}", self.program, self.stderr),
        }
    }
}

impl std::error::Error for ProcessFailure {}

// ─── EngineAdapter trait ─────────────────────────────────────────

/// 外部ツール呼び出しの境界。各メソッドは外部プロセスを1つ起動し、終了まで待つ。
///
/// 生成したファイルの削除は呼び出し側 (ジョブのワークスペース) の責務。
#[async_trait::async_trait]
pub trait EngineAdapter: Send + Sync {
    /// 任意の音声を 16kHz / mono / 16bit PCM の WAV に正規化する。
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ProcessFailure>;

    /// 総再生時間 (秒) を取得する。
    async fn probe_duration(&self, asset: &Path) -> Result<f64, ProcessFailure>;

    /// `max_segment_secs` ごとに分割し、`out_dir` に生成したファイルを再生順で返す。
    async fn segment_audio(
        &self,
        asset: &Path,
        max_segment_secs: f64,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProcessFailure>;

    /// 1ファイルを文字起こしし、エンジンの stdout をそのまま返す。
    async fn transcribe(&self, asset: &Path, threads: usize) -> Result<String, ProcessFailure>;

    /// エンジン名 (例: "ffmpeg+whisper.cpp")。
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_exit_code() {
        let f = ProcessFailure::exited("whisper-cli", 1, "model not found", false);
        let msg = f.to_string();
        assert!(msg.contains("whisper-cli"));
        assert!(msg.contains("code 1"));
        assert!(msg.contains("model not found"));
    }

    #[test]
    fn display_killed_mentions_resource_exhaustion() {
        let f = ProcessFailure::exited("whisper-cli", -9, "", true);
        assert!(f.to_string().contains("resource exhaustion"));
    }

    #[test]
    fn not_started_has_no_exit_code() {
        let f = ProcessFailure::not_started("ffmpeg", "No such file or directory");
        assert_eq!(f.exit_code, None);
        assert!(!f.resource_exhausted);
        assert!(f.to_string().contains("could not be started"));
    }
}
