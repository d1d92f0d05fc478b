pub mod handlers;
pub mod responses;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use tq_core::domain::engine::EngineAdapter;
use tq_core::domain::settings::{AppConfig, ConfigError};
use tq_core::infra::engine::SubprocessEngine;
use tq_core::infra::workspace::WorkRoot;
use tq_core::usecase::{JobManager, JobStore};

/// ハンドラ間で共有する状態
#[derive(Clone)]
pub struct AppState {
    pub manager: JobManager,
}

impl AppState {
    pub fn new(manager: JobManager) -> Self {
        Self { manager }
    }
}

/// サーバー起動時のエラー
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to prepare work root {path}: {source}")]
    WorkRoot {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/transcribe", post(handlers::transcribe))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/{job_id}", get(handlers::job_status))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// 既定の外部ツール構成でエンジンを作る。未設定なら警告だけ出して起動は続ける。
pub fn create_engine(config: &AppConfig) -> Arc<dyn EngineAdapter> {
    let engine = SubprocessEngine::new(&config.engine);
    match engine.validate() {
        Ok(()) => log::info!(
            "Engine {} ready: whisper={:?} model={:?}",
            engine.name(),
            config.engine.whisper_binary,
            config.engine.model_path
        ),
        Err(e) => log::warn!("Engine not fully configured, jobs will fail until fixed: {e}"),
    }
    Arc::new(engine)
}

pub async fn run(config: AppConfig) -> Result<(), ServerError> {
    config.validate()?;
    let engine = create_engine(&config);
    let manager = JobManager::new(engine, JobStore::new(), &config.pipeline);

    let work_root = manager.work_root();
    prepare_work_root(work_root)
        .await
        .map_err(|source| ServerError::WorkRoot {
            path: work_root.path().display().to_string(),
            source,
        })?;

    spawn_reaper(manager.clone());

    let addr = config.server.bind;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    log::info!(
        "Listening on {addr} (max_segment_secs={}, parallel={}, threads={})",
        config.pipeline.max_segment_secs,
        config.pipeline.max_parallel_segments,
        config.pipeline.engine_threads
    );

    let app = router(AppState::new(manager), config.server.max_upload_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

/// 前回プロセスが残したジョブディレクトリを片付ける
async fn prepare_work_root(work_root: &WorkRoot) -> std::io::Result<usize> {
    work_root.prepare().await?;
    work_root.sweep_stale().await
}

/// 保持期間を過ぎた終了済みジョブを定期的に削除する
fn spawn_reaper(manager: JobManager) {
    let period = manager.retention().clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            manager.purge_finished().await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
