use std::path::{Path, PathBuf};

use crate::domain::engine::ProcessFailure;

use super::command::run_tool;

/// 正規化後のサンプルレート (whisper.cpp の要求値)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// 分割ファイルの命名パターン。連番でソートすると再生順になる。
const SEGMENT_PATTERN: &str = "segment_%05d.wav";
const SEGMENT_PREFIX: &str = "segment_";

/// ffmpeg / ffprobe による変換・長さ取得・分割
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTools {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// 単一チャンネル・固定レート・16bit PCM に揃える引数
    fn pcm_output_args() -> Vec<String> {
        vec![
            "-ar".into(),
            TARGET_SAMPLE_RATE.to_string(),
            "-ac".into(),
            "1".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
        ]
    }

    fn build_convert_args(input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().into(),
            "-vn".into(),
        ];
        args.extend(Self::pcm_output_args());
        args.push(output.to_string_lossy().into());
        args
    }

    fn build_probe_args(asset: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            asset.to_string_lossy().into(),
        ]
    }

    /// `-c copy` ではなく再エンコードするので、各セグメントは単独でデコードできる。
    fn build_segment_args(asset: &Path, max_segment_secs: f64, out_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            asset.to_string_lossy().into(),
            "-f".into(),
            "segment".into(),
            "-segment_time".into(),
            format_secs(max_segment_secs),
            "-reset_timestamps".into(),
            "1".into(),
        ];
        args.extend(Self::pcm_output_args());
        args.push(out_dir.join(SEGMENT_PATTERN).to_string_lossy().into());
        args
    }

    pub async fn convert(&self, input: &Path, output: &Path) -> Result<(), ProcessFailure> {
        run_tool(&self.ffmpeg, &Self::build_convert_args(input, output)).await?;
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ProcessFailure::invalid_output(
                "ffmpeg",
                format!("conversion produced no output file at {:?}", output),
            ));
        }
        Ok(())
    }

    pub async fn probe_duration(&self, asset: &Path) -> Result<f64, ProcessFailure> {
        let stdout = run_tool(&self.ffprobe, &Self::build_probe_args(asset)).await?;
        parse_duration(&stdout).ok_or_else(|| {
            ProcessFailure::invalid_output(
                "ffprobe",
                format!("unparseable duration output: {:?}", stdout.trim()),
            )
        })
    }

    pub async fn segment(
        &self,
        asset: &Path,
        max_segment_secs: f64,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProcessFailure> {
        tokio::fs::create_dir_all(out_dir).await.map_err(|e| {
            ProcessFailure::not_started(
                "ffmpeg",
                format!("cannot create segment directory {:?}: {e}", out_dir),
            )
        })?;
        run_tool(
            &self.ffmpeg,
            &Self::build_segment_args(asset, max_segment_secs, out_dir),
        )
        .await?;
        list_segments(out_dir).await.map_err(|e| {
            ProcessFailure::invalid_output(
                "ffmpeg",
                format!("cannot list segment directory {:?}: {e}", out_dir),
            )
        })
    }
}

/// ffprobe の出力 (秒の10進文字列) を解釈する。空・不正値・非有限値は None。
pub fn parse_duration(stdout: &str) -> Option<f64> {
    let value: f64 = stdout.lines().next()?.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn format_secs(secs: f64) -> String {
    let formatted = format!("{secs:.3}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// 分割ディレクトリ内のセグメントをファイル名順 (= 連番順) で列挙する。
pub async fn list_segments(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(SEGMENT_PREFIX) && name.ends_with(".wav") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}
