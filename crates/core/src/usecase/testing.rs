//! usecase テスト用のスクリプト化エンジン。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::domain::engine::{EngineAdapter, ProcessFailure};
use crate::domain::segment::planned_segment_count;

pub const SINGLE_PASS_TEXT: &str = " single pass transcript\n";

type DelayFn = Box<dyn Fn(usize) -> u64 + Send + Sync>;

pub struct ScriptedEngine {
    duration: Option<f64>,
    fail_convert: bool,
    no_segments: bool,
    fail_segment: Option<usize>,
    fail_all: bool,
    kill_segment: Option<usize>,
    panic_on_probe: bool,
    delay_ms: DelayFn,
    pub convert_calls: AtomicUsize,
    pub segment_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    pub started: Mutex<Vec<usize>>,
    current: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl ScriptedEngine {
    /// `duration` は probe 結果。None なら probe が失敗する。
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            fail_convert: false,
            no_segments: false,
            fail_segment: None,
            fail_all: false,
            kill_segment: None,
            panic_on_probe: false,
            delay_ms: Box::new(|_| 1),
            convert_calls: AtomicUsize::new(0),
            segment_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn failing_convert(mut self) -> Self {
        self.fail_convert = true;
        self
    }

    pub fn producing_no_segments(mut self) -> Self {
        self.no_segments = true;
        self
    }

    pub fn failing_segment(mut self, index: usize) -> Self {
        self.fail_segment = Some(index);
        self
    }

    pub fn failing_every_segment(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn killed_segment(mut self, index: usize) -> Self {
        self.kill_segment = Some(index);
        self
    }

    pub fn panicking_probe(mut self) -> Self {
        self.panic_on_probe = true;
        self
    }

    pub fn with_delay<F>(mut self, delay_ms: F) -> Self
    where
        F: Fn(usize) -> u64 + Send + Sync + 'static,
    {
        self.delay_ms = Box::new(delay_ms);
        self
    }

    pub fn transcribe_count(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn segment_count(&self) -> usize {
        self.segment_calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

/// "segment_00002.wav" → 2。分割していないファイルは 0 とみなす。
pub fn index_of(path: &Path) -> usize {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("segment_"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

pub fn segment_text(index: usize) -> String {
    format!("text {index}")
}

#[async_trait::async_trait]
impl EngineAdapter for ScriptedEngine {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ProcessFailure> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_convert {
            return Err(ProcessFailure::exited(
                "ffmpeg",
                1,
                "Invalid data found when processing input",
                false,
            ));
        }
        std::fs::copy(input, output)
            .map(|_| ())
            .map_err(|e| ProcessFailure::not_started("ffmpeg", e.to_string()))
    }

    async fn probe_duration(&self, _asset: &Path) -> Result<f64, ProcessFailure> {
        if self.panic_on_probe {
            panic!("probe exploded");
        }
        self.duration
            .ok_or_else(|| ProcessFailure::invalid_output("ffprobe", "N/A"))
    }

    async fn segment_audio(
        &self,
        _asset: &Path,
        max_segment_secs: f64,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProcessFailure> {
        self.segment_calls.fetch_add(1, Ordering::SeqCst);
        if self.no_segments {
            return Ok(Vec::new());
        }
        let count = planned_segment_count(self.duration.unwrap_or(0.0), max_segment_secs);
        std::fs::create_dir_all(out_dir)
            .map_err(|e| ProcessFailure::not_started("ffmpeg", e.to_string()))?;
        let mut paths = Vec::new();
        for i in 0..count {
            let path = out_dir.join(format!("segment_{i:05}.wav"));
            std::fs::write(&path, b"RIFF")
                .map_err(|e| ProcessFailure::not_started("ffmpeg", e.to_string()))?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn transcribe(&self, asset: &Path, _threads: usize) -> Result<String, ProcessFailure> {
        let index = index_of(asset);
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push(index);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis((self.delay_ms)(index))).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.fail_segment == Some(index) {
            return Err(ProcessFailure::exited(
                "whisper-cli",
                1,
                format!("failed to decode segment {index}"),
                false,
            ));
        }
        if self.kill_segment == Some(index) {
            return Err(ProcessFailure::exited("whisper-cli", -9, "", true));
        }
        if asset.file_name().and_then(|n| n.to_str()) == Some("normalized.wav") {
            return Ok(SINGLE_PASS_TEXT.to_string());
        }
        Ok(segment_text(index))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
