use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::domain::engine::{EngineAdapter, ProcessFailure};
use crate::domain::error::PipelineError;
use crate::domain::segment::Segment;

use super::aggregator::TranscriptAssembler;
use super::worker_pool::WorkerPool;

/// セグメントをエンジンに投入し、結果を集める。
///
/// 同時実行は `max_parallel` まで。最初の失敗で残りの投入を止め、
/// 実行中のものが終わるのを待ってからエラーを返す。
pub struct SegmentDispatcher {
    engine: Arc<dyn EngineAdapter>,
    max_parallel: usize,
    engine_threads: usize,
    gate: Option<Arc<Semaphore>>,
}

impl SegmentDispatcher {
    pub fn new(engine: Arc<dyn EngineAdapter>, max_parallel: usize, engine_threads: usize) -> Self {
        Self {
            engine,
            max_parallel: max_parallel.max(1),
            engine_threads: engine_threads.max(1),
            gate: None,
        }
    }

    /// 全ジョブ共通の同時実行上限
    pub fn with_global_gate(mut self, gate: Option<Arc<Semaphore>>) -> Self {
        self.gate = gate;
        self
    }

    pub async fn dispatch(
        &self,
        job_id: &str,
        segments: &[Segment],
    ) -> Result<TranscriptAssembler, PipelineError> {
        if segments.is_empty() {
            return Err(PipelineError::segmentation("no segments to transcribe"));
        }

        let mut pool: WorkerPool<Result<String, ProcessFailure>> =
            WorkerPool::new(self.max_parallel).with_gate(self.gate.clone());
        let mut assembler = TranscriptAssembler::new(segments.len());

        for segment in segments {
            let engine = Arc::clone(&self.engine);
            let path = segment.path.clone();
            let threads = self.engine_threads;
            pool.submit(segment.index, async move {
                engine.transcribe(&path, threads).await
            });
        }
        log::debug!(
            "job {job_id}: dispatched {} segments (parallel={}, threads={})",
            segments.len(),
            self.max_parallel,
            self.engine_threads
        );

        while let Some(completion) = pool.next_completion().await {
            let index = completion.key;
            let error = match completion.outcome {
                Ok(Ok(text)) => match assembler.insert(index, text) {
                    Ok(()) => {
                        log::debug!("job {job_id}: segment {index} transcribed");
                        continue;
                    }
                    Err(e) => e,
                },
                Ok(Err(failure)) => PipelineError::Engine {
                    segment_index: index,
                    failure,
                },
                Err(panic) => PipelineError::internal(format!(
                    "segment {index} worker aborted: {}",
                    panic.detail
                )),
            };

            let skipped = pool.stop_accepting();
            log::warn!(
                "job {job_id}: segment {index} failed, skipping {skipped} queued segments: {error}"
            );
            let drained = pool.drain().await;
            if drained > 0 {
                log::debug!("job {job_id}: waited for {drained} in-flight segments");
            }
            return Err(error);
        }

        Ok(assembler)
    }
}
