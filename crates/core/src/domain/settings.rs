use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 設定エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 待ち受けアドレス
    pub bind: SocketAddr,
    /// アップロード上限 (バイト)
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// 分割・並列実行の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 単一パスで処理する最大長 (秒)。これを超えるとこの長さで分割する。
    pub max_segment_secs: f64,
    /// 1ジョブあたりの同時エンジン起動数 (P)
    pub max_parallel_segments: usize,
    /// エンジン1回あたりのスレッド数ヒント (T)
    pub engine_threads: usize,
    /// 全ジョブ合計の同時エンジン起動数。None ならジョブごとの P のみ。
    pub global_max_concurrency: Option<usize>,
    /// ジョブごとの一時ディレクトリを置くルート
    pub work_root: PathBuf,
    /// 終了済みジョブのレコードを保持する秒数
    pub finished_job_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_segment_secs: 35.0,
            max_parallel_segments: 2,
            engine_threads: 4,
            global_max_concurrency: None,
            work_root: default_work_root(),
            finished_job_ttl_secs: 3600,
        }
    }
}

/// 外部ツールのパス設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// whisper.cpp CLI バイナリのパス
    pub whisper_binary: PathBuf,
    /// GGML モデルファイルのパス
    pub model_path: PathBuf,
    /// 言語指定 (例: "ja", "en")。None ならエンジン既定。
    pub language: Option<String>,
    /// whisper-cli に追加で渡す引数
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            whisper_binary: PathBuf::from("whisper-cli"),
            model_path: PathBuf::from("models/ggml-medium.bin"),
            language: None,
            extra_args: Vec::new(),
        }
    }
}

fn default_work_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("transcribe-queue")
        .join("jobs")
}

impl AppConfig {
    /// JSON ファイルから読み込む。存在しないキーは既定値。
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 既定値 → 設定ファイル → 環境変数 の順で組み立てる。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// `TQ_*` 環境変数で上書きする。`lookup` はテスト用に差し替え可能。
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TQ_BIND") {
            self.server.bind = parse_env("TQ_BIND", &v)?;
        }
        if let Some(v) = lookup("TQ_WORK_ROOT") {
            self.pipeline.work_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("TQ_FFMPEG") {
            self.engine.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TQ_FFPROBE") {
            self.engine.ffprobe_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TQ_WHISPER_BIN") {
            self.engine.whisper_binary = PathBuf::from(v);
        }
        if let Some(v) = lookup("TQ_WHISPER_MODEL") {
            self.engine.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TQ_LANGUAGE") {
            self.engine.language = Some(v).filter(|l| !l.is_empty());
        }
        if let Some(v) = lookup("TQ_MAX_SEGMENT_SECS") {
            self.pipeline.max_segment_secs = parse_env("TQ_MAX_SEGMENT_SECS", &v)?;
        }
        if let Some(v) = lookup("TQ_PARALLELISM") {
            self.pipeline.max_parallel_segments = parse_env("TQ_PARALLELISM", &v)?;
        }
        if let Some(v) = lookup("TQ_ENGINE_THREADS") {
            self.pipeline.engine_threads = parse_env("TQ_ENGINE_THREADS", &v)?;
        }
        if let Some(v) = lookup("TQ_GLOBAL_CONCURRENCY") {
            self.pipeline.global_max_concurrency = if v.is_empty() {
                None
            } else {
                Some(parse_env("TQ_GLOBAL_CONCURRENCY", &v)?)
            };
        }
        if let Some(v) = lookup("TQ_JOB_TTL_SECS") {
            self.pipeline.finished_job_ttl_secs = parse_env("TQ_JOB_TTL_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if !(p.max_segment_secs.is_finite() && p.max_segment_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_segment_secs must be positive, got {}",
                p.max_segment_secs
            )));
        }
        if p.max_parallel_segments == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_segments must be at least 1".into(),
            ));
        }
        if p.engine_threads == 0 {
            return Err(ConfigError::Invalid("engine_threads must be at least 1".into()));
        }
        if p.global_max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "global_max_concurrency must be at least 1 when set".into(),
            ));
        }

        let host = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let demand = p.max_parallel_segments * p.engine_threads;
        if demand > host {
            log::warn!(
                "max_parallel_segments ({}) x engine_threads ({}) = {demand} exceeds available parallelism ({host})",
                p.max_parallel_segments,
                p.engine_threads
            );
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
