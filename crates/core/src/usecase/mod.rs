pub mod aggregator;
pub mod dispatcher;
pub mod job_manager;
pub mod job_store;
pub mod segmenter;
pub mod worker_pool;

#[cfg(test)]
mod testing;

pub use job_manager::JobManager;
pub use job_store::JobStore;
