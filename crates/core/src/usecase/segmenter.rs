use std::sync::Arc;
use std::time::Instant;

use crate::domain::engine::EngineAdapter;
use crate::domain::error::PipelineError;
use crate::domain::segment::{planned_durations, Segment, SegmentPlan};
use crate::infra::metrics::Metrics;
use crate::infra::workspace::JobWorkspace;

/// アップロードを正規化し、必要ならしきい値ごとに分割する。
pub struct Segmenter {
    engine: Arc<dyn EngineAdapter>,
    max_segment_secs: f64,
    metrics: Arc<Metrics>,
}

impl Segmenter {
    pub fn new(engine: Arc<dyn EngineAdapter>, max_segment_secs: f64, metrics: Arc<Metrics>) -> Self {
        Self {
            engine,
            max_segment_secs,
            metrics,
        }
    }

    pub async fn plan(&self, workspace: &JobWorkspace) -> Result<SegmentPlan, PipelineError> {
        let job_id = workspace.job_id();
        let normalized = workspace.normalized_path();

        let start = Instant::now();
        self.engine
            .convert(workspace.input_path(), &normalized)
            .await
            .map_err(PipelineError::Conversion)?;
        self.metrics
            .record_latency("convert", start.elapsed().as_millis() as u64);

        let duration = self.probe(workspace).await;
        let total = match duration {
            Some(d) if d > self.max_segment_secs => d,
            _ => {
                log::info!("job {job_id}: single pass (duration {duration:?})");
                return Ok(SegmentPlan::single(&normalized, duration));
            }
        };

        let start = Instant::now();
        let paths = self
            .engine
            .segment_audio(&normalized, self.max_segment_secs, &workspace.segments_dir())
            .await
            .map_err(|failure| PipelineError::Segmentation {
                message: "audio segmenter failed".into(),
                failure: Some(failure),
            })?;
        self.metrics
            .record_latency("segment", start.elapsed().as_millis() as u64);

        if paths.is_empty() {
            return Err(PipelineError::segmentation(format!(
                "no segments produced for {total:.3}s of audio"
            )));
        }

        let planned = planned_durations(total, self.max_segment_secs);
        if planned.len() != paths.len() {
            log::warn!(
                "job {job_id}: planned {} segments but segmenter produced {}",
                planned.len(),
                paths.len()
            );
        }

        let segments: Vec<Segment> = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| Segment::new(index, path, planned.get(index).copied()))
            .collect();
        log::info!(
            "job {job_id}: split {total:.3}s into {} segments of <= {}s",
            segments.len(),
            self.max_segment_secs
        );
        Ok(SegmentPlan::Split(segments))
    }

    /// 取得できない・不正な長さは None (単一パスで処理する)
    async fn probe(&self, workspace: &JobWorkspace) -> Option<f64> {
        let job_id = workspace.job_id();
        match self.engine.probe_duration(&workspace.normalized_path()).await {
            Ok(d) if d.is_finite() && d > 0.0 => Some(d),
            Ok(d) => {
                log::warn!("job {job_id}: unusable duration {d}, falling back to single pass");
                None
            }
            Err(failure) => {
                let absorbed = PipelineError::Probe(failure);
                log::warn!("job {job_id}: {absorbed}, falling back to single pass");
                None
            }
        }
    }
}
