pub mod command;
pub mod ffmpeg;
pub mod whisper;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::engine::{EngineAdapter, ProcessFailure};
use crate::domain::settings::EngineConfig;

use ffmpeg::FfmpegTools;
use whisper::WhisperCli;

/// ffmpeg/ffprobe + whisper.cpp CLI をサブプロセスとして呼ぶ EngineAdapter 実装。
pub struct SubprocessEngine {
    tools: FfmpegTools,
    whisper: WhisperCli,
}

impl SubprocessEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tools: FfmpegTools::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone()),
            whisper: WhisperCli::new(config),
        }
    }

    /// whisper バイナリとモデルの存在を検証する。
    pub fn validate(&self) -> Result<(), ProcessFailure> {
        self.whisper.validate()
    }
}

#[async_trait]
impl EngineAdapter for SubprocessEngine {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ProcessFailure> {
        self.tools.convert(input, output).await
    }

    async fn probe_duration(&self, asset: &Path) -> Result<f64, ProcessFailure> {
        self.tools.probe_duration(asset).await
    }

    async fn segment_audio(
        &self,
        asset: &Path,
        max_segment_secs: f64,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProcessFailure> {
        self.tools.segment(asset, max_segment_secs, out_dir).await
    }

    async fn transcribe(&self, asset: &Path, threads: usize) -> Result<String, ProcessFailure> {
        self.whisper.transcribe(asset, threads).await
    }

    fn name(&self) -> &str {
        "ffmpeg+whisper.cpp"
    }
}
