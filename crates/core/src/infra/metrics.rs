use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::error::ErrorCode;

/// 保持するレイテンシ記録の上限
const MAX_LATENCY_RECORDS: usize = 1000;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    jobs_submitted: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    segments_transcribed: u64,
    errors_conversion: u64,
    errors_segmentation: u64,
    errors_engine: u64,
    errors_resource_exhausted: u64,
    errors_internal: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（/metrics で返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub segments_transcribed: u64,
    pub error_counts: ErrorCounts,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorCounts {
    pub conversion: u64,
    pub segmentation: u64,
    pub engine: u64,
    pub resource_exhausted: u64,
    pub internal: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub convert: Option<f64>,
    pub segment: Option<f64>,
    pub job: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_jobs_submitted(&self) {
        self.counters.lock().jobs_submitted += 1;
    }

    pub fn inc_jobs_completed(&self) {
        self.counters.lock().jobs_completed += 1;
    }

    pub fn inc_segments_transcribed(&self, count: u64) {
        self.counters.lock().segments_transcribed += count;
    }

    /// 失敗したジョブを分類コードごとに数える
    pub fn inc_job_failed(&self, code: ErrorCode) {
        let mut c = self.counters.lock();
        c.jobs_failed += 1;
        match code {
            ErrorCode::Conversion => c.errors_conversion += 1,
            ErrorCode::Segmentation => c.errors_segmentation += 1,
            ErrorCode::Engine => c.errors_engine += 1,
            ErrorCode::ResourceExhausted => c.errors_resource_exhausted += 1,
            _ => c.errors_internal += 1,
        }
    }

    pub fn record_latency(&self, phase: &str, duration_ms: u64) {
        let record = LatencyRecord {
            phase: phase.to_string(),
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock();
        latencies.push(record);
        if latencies.len() > MAX_LATENCY_RECORDS {
            let excess = latencies.len() - MAX_LATENCY_RECORDS;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock();
        let latencies = self.latencies.lock();

        let avg = |phase: &str| -> Option<f64> {
            let vals: Vec<f64> = latencies
                .iter()
                .filter(|r| r.phase == phase)
                .map(|r| r.duration_ms as f64)
                .collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };

        let recent: Vec<LatencyRecord> = latencies.iter().rev().take(20).cloned().collect();

        MetricsSummary {
            jobs_submitted: c.jobs_submitted,
            jobs_completed: c.jobs_completed,
            jobs_failed: c.jobs_failed,
            segments_transcribed: c.segments_transcribed,
            error_counts: ErrorCounts {
                conversion: c.errors_conversion,
                segmentation: c.errors_segmentation,
                engine: c.errors_engine,
                resource_exhausted: c.errors_resource_exhausted,
                internal: c.errors_internal,
            },
            avg_latency_ms: AvgLatency {
                convert: avg("convert"),
                segment: avg("segment"),
                job: avg("job"),
            },
            recent_latencies: recent,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
