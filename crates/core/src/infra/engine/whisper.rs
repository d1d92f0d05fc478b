use std::path::{Path, PathBuf};

use crate::domain::engine::ProcessFailure;
use crate::domain::settings::EngineConfig;

use super::command::run_tool;

/// whisper.cpp CLI の呼び出し
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary_path: PathBuf,
    model_path: PathBuf,
    language: Option<String>,
    extra_args: Vec<String>,
}

impl WhisperCli {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            binary_path: config.whisper_binary.clone(),
            model_path: config.model_path.clone(),
            language: config.language.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    /// whisper バイナリとモデルの存在を検証する。
    pub fn validate(&self) -> Result<(), ProcessFailure> {
        if !self.binary_path.exists() && which_binary(&self.binary_path).is_none() {
            return Err(ProcessFailure::not_started(
                "whisper-cli",
                format!("Whisper binary not found: {:?}", self.binary_path),
            ));
        }
        if !self.model_path.exists() {
            return Err(ProcessFailure::not_started(
                "whisper-cli",
                format!("Whisper model not found: {:?}", self.model_path),
            ));
        }
        Ok(())
    }

    /// whisper-cli 用の引数。タイムスタンプと進捗表示を抑止し、stdout を本文のみにする。
    fn build_args(&self, wav_path: &Path, threads: usize) -> Vec<String> {
        let mut args = vec![
            "-m".into(),
            self.model_path.to_string_lossy().into(),
            "-f".into(),
            wav_path.to_string_lossy().into(),
            "-t".into(),
            threads.max(1).to_string(),
            "-nt".into(),
            "-np".into(),
        ];

        if let Some(language) = self.language.as_deref() {
            if !language.is_empty() {
                args.push("-l".into());
                args.push(language.into());
            }
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// 1ファイルを文字起こしする。stdout は加工せずに返す。
    pub async fn transcribe(&self, wav_path: &Path, threads: usize) -> Result<String, ProcessFailure> {
        run_tool(&self.binary_path, &self.build_args(wav_path, threads)).await
    }
}

/// PATH 上でバイナリを検索する簡易ヘルパー。
fn which_binary(name: &Path) -> Option<PathBuf> {
    let name_str = name.to_string_lossy();
    if name_str.contains('/') || name_str.contains('\\') {
        return name.exists().then(|| name.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}
