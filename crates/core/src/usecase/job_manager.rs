use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::domain::engine::EngineAdapter;
use crate::domain::error::PipelineError;
use crate::domain::job::{JobInfo, UploadedAudio};
use crate::domain::settings::PipelineConfig;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::infra::workspace::{JobWorkspace, WorkRoot};

use super::dispatcher::SegmentDispatcher;
use super::job_store::JobStore;
use super::segmenter::Segmenter;

/// ジョブの受付・バックグラウンド処理・状態照会
///
/// `submit` は処理をバックグラウンドタスクに渡してすぐに返る。
/// 結果は `status` でポーリングする。
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: JobStore,
    work_root: WorkRoot,
    segmenter: Segmenter,
    dispatcher: SegmentDispatcher,
    metrics: Arc<Metrics>,
    retention: Duration,
}

impl JobManager {
    pub fn new(engine: Arc<dyn EngineAdapter>, store: JobStore, config: &PipelineConfig) -> Self {
        let metrics = Arc::new(Metrics::new());
        let gate = config
            .global_max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let segmenter = Segmenter::new(
            Arc::clone(&engine),
            config.max_segment_secs,
            Arc::clone(&metrics),
        );
        let dispatcher = SegmentDispatcher::new(
            engine,
            config.max_parallel_segments,
            config.engine_threads,
        )
        .with_global_gate(gate);

        Self {
            inner: Arc::new(Inner {
                store,
                work_root: WorkRoot::new(&config.work_root),
                segmenter,
                dispatcher,
                metrics,
                retention: Duration::from_secs(config.finished_job_ttl_secs),
            }),
        }
    }

    /// アップロードを保存し、処理を開始してジョブ id を返す。
    ///
    /// ここで失敗するのは不正なアップロードだけ。処理中のエラーは `status` に出る。
    pub async fn submit(&self, upload: UploadedAudio) -> Result<String, PipelineError> {
        if upload.bytes.is_empty() {
            return Err(PipelineError::Upload("audio payload is empty".into()));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let workspace = self
            .inner
            .work_root
            .create_job(&job_id, &upload)
            .await
            .map_err(|e| PipelineError::Upload(format!("failed to store upload: {e}")))?;

        let store = &self.inner.store;
        if !store.insert(&job_id).await {
            return Err(PipelineError::internal(format!("job id {job_id} already registered")));
        }
        store.mark_running(&job_id).await;
        self.inner.metrics.inc_jobs_submitted();
        log::info!(
            "job {job_id}: accepted {} bytes ({})",
            upload.bytes.len(),
            upload.file_name.as_deref().unwrap_or("unnamed")
        );

        let inner = Arc::clone(&self.inner);
        let id = job_id.clone();
        let handle = tokio::spawn(async move { inner.run_job(&id, workspace).await });
        tokio::spawn(supervise(Arc::clone(&self.inner), job_id.clone(), handle));

        Ok(job_id)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobInfo, PipelineError> {
        self.inner
            .store
            .get(job_id)
            .await
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))
    }

    pub async fn list(&self) -> Vec<JobInfo> {
        self.inner.store.list().await
    }

    /// 保持期間を過ぎた終了済みジョブを削除する
    pub async fn purge_finished(&self) -> usize {
        let purged = self.inner.store.purge_finished(self.inner.retention).await;
        if purged > 0 {
            log::info!("Purged {purged} finished jobs");
        }
        purged
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.inner.metrics.summary()
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn work_root(&self) -> &WorkRoot {
        &self.inner.work_root
    }

    pub fn retention(&self) -> Duration {
        self.inner.retention
    }
}

impl Inner {
    async fn run_job(&self, job_id: &str, workspace: JobWorkspace) {
        let start = Instant::now();
        let outcome = self.process(job_id, &workspace).await;

        // 終端状態を公開する前に片付ける
        if let Err(e) = workspace.release().await {
            log::warn!("job {job_id}: failed to remove workspace: {e}");
        }
        self.metrics
            .record_latency("job", start.elapsed().as_millis() as u64);

        match outcome {
            Ok((text, segments)) => {
                self.metrics.inc_jobs_completed();
                self.metrics.inc_segments_transcribed(segments as u64);
                log::info!(
                    "job {job_id}: completed {segments} segments in {}ms",
                    start.elapsed().as_millis()
                );
                self.store.mark_completed(job_id, text).await;
            }
            Err(e) => {
                self.metrics.inc_job_failed(e.code());
                log::warn!("job {job_id}: failed [{}]: {e}", e.code().as_str());
                self.store.mark_failed(job_id, e.to_failure()).await;
            }
        }
    }

    async fn process(
        &self,
        job_id: &str,
        workspace: &JobWorkspace,
    ) -> Result<(String, usize), PipelineError> {
        let plan = self.segmenter.plan(workspace).await?;
        self.store.set_segment_count(job_id, plan.len()).await;

        let assembler = self.dispatcher.dispatch(job_id, plan.segments()).await?;
        let text = assembler.assemble()?;
        Ok((text, plan.len()))
    }
}

/// 処理タスクがパニック・キャンセルで終わった場合に Failed にする
async fn supervise(inner: Arc<Inner>, job_id: String, handle: JoinHandle<()>) {
    let Err(join_error) = handle.await else {
        return;
    };
    let err = PipelineError::internal(format!("job task aborted: {join_error}"));
    log::error!("job {job_id}: {err}");
    inner.metrics.inc_job_failed(err.code());
    inner.store.mark_failed(&job_id, err.to_failure()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use crate::domain::job::JobState;
    use crate::usecase::testing::{ScriptedEngine, SINGLE_PASS_TEXT};

    fn config(root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            work_root: root.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    fn upload() -> UploadedAudio {
        UploadedAudio::new(b"fake audio".to_vec()).with_file_name("clip.ogg")
    }

    async fn wait_terminal(manager: &JobManager, job_id: &str) -> JobInfo {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let info = manager.status(job_id).await.unwrap();
                if info.state.is_terminal() {
                    return info;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn submit_returns_running_job() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(20.0)).with_delay(|_| 50));
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let job_id = manager.submit(upload()).await.unwrap();
        let info = manager.status(&job_id).await.unwrap();
        assert_eq!(info.state, JobState::Running);
        assert!(info.result.is_none() && info.error.is_none());

        let done = wait_terminal(&manager, &job_id).await;
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.result.as_deref(), Some(SINGLE_PASS_TEXT));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_at_submit() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(20.0)));
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let err = manager.submit(UploadedAudio::new(Vec::new())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Upload);
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(20.0)));
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let err = manager.status("does-not-exist").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn failure_is_recorded_and_workspace_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(100.0)).failing_segment(2));
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let job_id = manager.submit(upload()).await.unwrap();
        let info = wait_terminal(&manager, &job_id).await;
        assert_eq!(info.state, JobState::Failed);
        assert!(info.result.is_none());
        let error = info.error.unwrap();
        assert_eq!(error.code, ErrorCode::Engine);
        assert_eq!(error.segment_index, Some(2));
        assert_eq!(info.segment_count, Some(3));

        assert!(!manager.work_root().job_dir(&job_id).exists());
        let metrics = manager.metrics();
        assert_eq!(metrics.jobs_failed, 1);
        assert_eq!(metrics.error_counts.engine, 1);
    }

    #[tokio::test]
    async fn panicking_job_task_is_marked_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(100.0)).panicking_probe());
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let job_id = manager.submit(upload()).await.unwrap();
        let info = wait_terminal(&manager, &job_id).await;
        assert_eq!(info.state, JobState::Failed);
        assert_eq!(info.error.unwrap().code, ErrorCode::Internal);
        assert!(!manager.work_root().job_dir(&job_id).exists());
    }

    #[tokio::test]
    async fn concurrent_jobs_do_not_interfere() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(100.0)).with_delay(|i| 5 * (3 - i as u64)));
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let a = manager.submit(upload()).await.unwrap();
        let b = manager.submit(upload()).await.unwrap();
        assert_ne!(a, b);

        let (ia, ib) = tokio::join!(wait_terminal(&manager, &a), wait_terminal(&manager, &b));
        assert_eq!(ia.result, ib.result);
        assert_eq!(ia.result.as_deref(), Some("text 0\ntext 1\ntext 2"));
        assert_eq!(manager.list().await.len(), 2);
        assert_eq!(manager.metrics().segments_transcribed, 6);
    }

    #[tokio::test]
    async fn purge_keeps_records_within_retention() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::new(Some(20.0)));
        let manager = JobManager::new(engine, JobStore::new(), &config(tmp.path()));

        let job_id = manager.submit(upload()).await.unwrap();
        wait_terminal(&manager, &job_id).await;
        assert_eq!(manager.purge_finished().await, 0);
        assert!(manager.status(&job_id).await.is_ok());
    }
}
