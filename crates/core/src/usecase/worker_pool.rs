use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

type Task<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// ゲートの許可。ラッパーと内側タスクの両方が手放すまで返却されない。
type SharedPermit = Arc<OwnedSemaphorePermit>;

/// タスクがパニック（またはキャンセル）した
#[derive(Debug, Clone, thiserror::Error)]
#[error("task {key} did not complete: {detail}")]
pub struct TaskPanic {
    pub key: usize,
    pub detail: String,
}

/// 完了したタスク1件
#[derive(Debug)]
pub struct Completion<T> {
    pub key: usize,
    pub outcome: Result<T, TaskPanic>,
}

/// ラッパーの戻り値。`outcome` が None なら停止済みで本体は起動していない。
struct Finished<T> {
    key: usize,
    outcome: Option<Result<T, JoinError>>,
    permit: Option<SharedPermit>,
}

/// ドロップ時に内側タスクを中断する JoinHandle
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 停止が通知されるまで待つ。送信側が消えた場合も戻る。
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// 同時実行数に上限を持つワーカープール。
///
/// `submit` したタスクは上限に空きがあれば即座に起動し、なければ待ち行列に入る。
/// 空いた枠は呼び出し側が完了を受け取った後、次の `next_completion` で埋める
/// （バッチ単位では待たない）。完了したタスクのゲート許可も同じ時点まで保持する。
///
/// `stop_accepting` 以降は新規受付をせず、未起動のタスクは破棄される。
/// ゲート待ちのタスクも許可を得た時点で停止を確認し、本体を起動しない。
/// 実行中のタスクは中断しないが、プールをドロップすると中断される。
pub struct WorkerPool<T> {
    limit: usize,
    queue: VecDeque<(usize, Task<T>)>,
    running: JoinSet<Finished<T>>,
    accepting: bool,
    stop: watch::Sender<bool>,
    gate: Option<Arc<Semaphore>>,
    held: Vec<SharedPermit>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(limit: usize) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            limit: limit.max(1),
            queue: VecDeque::new(),
            running: JoinSet::new(),
            accepting: true,
            stop,
            gate: None,
            held: Vec::new(),
        }
    }

    /// 複数プールで共有する上限（全ジョブ合計の同時実行数）を設定する。
    pub fn with_gate(mut self, gate: Option<Arc<Semaphore>>) -> Self {
        self.gate = gate;
        self
    }

    /// タスクを登録する。受付停止後は false を返し、タスクは実行されない。
    pub fn submit<F>(&mut self, key: usize, task: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        if !self.accepting {
            return false;
        }
        self.queue.push_back((key, Box::pin(task)));
        self.fill();
        true
    }

    fn fill(&mut self) {
        while self.accepting && self.running.len() < self.limit {
            let Some((key, task)) = self.queue.pop_front() else {
                break;
            };
            let gate = self.gate.clone();
            let mut stop = self.stop.subscribe();
            self.running.spawn(async move {
                let permit = match gate {
                    Some(gate) => tokio::select! {
                        permit = gate.acquire_owned() => permit.ok().map(Arc::new),
                        _ = stopped(&mut stop) => None,
                    },
                    None => None,
                };
                if *stop.borrow() {
                    return Finished {
                        key,
                        outcome: None,
                        permit: None,
                    };
                }

                // 内側で spawn してパニックを JoinError として受け取る
                let held = permit.clone();
                let mut inner = AbortOnDrop(tokio::spawn(async move {
                    let _held = held;
                    task.await
                }));
                let outcome = (&mut inner.0).await;
                Finished {
                    key,
                    outcome: Some(outcome),
                    permit,
                }
            });
        }
    }

    /// 次に完了したタスクを返す。実行中も待機中もなければ None。
    pub async fn next_completion(&mut self) -> Option<Completion<T>> {
        self.held.clear();
        self.fill();
        while let Some(joined) = self.running.join_next().await {
            let finished = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    log::error!("worker pool wrapper task failed: {e}");
                    continue;
                }
            };
            let Some(outcome) = finished.outcome else {
                continue;
            };
            self.held.extend(finished.permit);
            let key = finished.key;
            return Some(Completion {
                key,
                outcome: outcome.map_err(|e| TaskPanic {
                    key,
                    detail: e.to_string(),
                }),
            });
        }
        None
    }

    /// 新規受付を止め、未起動のタスクを破棄する。破棄した件数を返す。
    pub fn stop_accepting(&mut self) -> usize {
        self.accepting = false;
        self.stop.send_replace(true);
        self.held.clear();
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    /// 実行中のタスクがすべて終わるまで待ち、結果は捨てる。
    /// 本体が実際に動いていた件数を返す。
    pub async fn drain(&mut self) -> usize {
        let mut finished = 0;
        while let Some(joined) = self.running.join_next().await {
            if matches!(joined, Ok(Finished { outcome: Some(_), .. })) {
                finished += 1;
            }
        }
        self.held.clear();
        finished
    }

    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
