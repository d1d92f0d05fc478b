use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::error::JobFailure;
use crate::domain::job::{JobInfo, JobState};

/// ジョブストア: ジョブ状態の登録・遷移・照会
///
/// 1ジョブにつき書き手は処理タスク1つ、読み手は任意。
/// 遷移メソッドは適用できたかどうかを返し、終端状態からは遷移しない。
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
}

struct JobEntry {
    info: JobInfo,
    finished_at: Option<Instant>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending のジョブを登録する。同じ id がすでにあれば false。
    pub async fn insert(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return false;
        }
        let entry = JobEntry {
            info: JobInfo::new(job_id.to_string(), now()),
            finished_at: None,
        };
        jobs.insert(job_id.to_string(), entry);
        true
    }

    /// Pending → Running
    pub async fn mark_running(&self, job_id: &str) -> bool {
        self.update(job_id, |info| {
            if info.state != JobState::Pending {
                return false;
            }
            info.state = JobState::Running;
            true
        })
        .await
    }

    pub async fn set_segment_count(&self, job_id: &str, count: usize) -> bool {
        self.update(job_id, |info| {
            if info.state.is_terminal() {
                return false;
            }
            info.segment_count = Some(count);
            true
        })
        .await
    }

    /// Running → Completed
    pub async fn mark_completed(&self, job_id: &str, result: String) -> bool {
        self.update(job_id, |info| {
            if info.state != JobState::Running {
                return false;
            }
            info.state = JobState::Completed;
            info.result = Some(result);
            true
        })
        .await
    }

    /// 終端でない状態 → Failed
    pub async fn mark_failed(&self, job_id: &str, error: JobFailure) -> bool {
        self.update(job_id, |info| {
            if info.state.is_terminal() {
                return false;
            }
            info.state = JobState::Failed;
            info.result = None;
            info.error = Some(error);
            true
        })
        .await
    }

    async fn update<F>(&self, job_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut JobInfo) -> bool,
    {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(job_id) else {
            return false;
        };
        if !apply(&mut entry.info) {
            log::debug!(
                "job {job_id}: transition ignored in state {}",
                entry.info.state.as_str()
            );
            return false;
        }
        entry.info.updated_at = now();
        if entry.info.state.is_terminal() {
            entry.finished_at = Some(Instant::now());
        }
        true
    }

    pub async fn get(&self, job_id: &str) -> Option<JobInfo> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|e| e.info.clone())
    }

    /// 作成日時順のスナップショット
    pub async fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.read().await;
        let mut infos: Vec<JobInfo> = jobs.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// 終端に達してから `older_than` 以上経ったジョブを削除（メモリ解放）
    pub async fn purge_finished(&self, older_than: Duration) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.finished_at {
            Some(at) => at.elapsed() < older_than,
            None => true,
        });
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
