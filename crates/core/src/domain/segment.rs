use std::path::{Path, PathBuf};

/// 正規化済み音声の一区間。`index` が再生順を表す。
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub path: PathBuf,
    /// 秒数（診断用）。不明な場合は None。
    pub duration_secs: Option<f64>,
}

impl Segment {
    pub fn new(index: usize, path: PathBuf, duration_secs: Option<f64>) -> Self {
        Self {
            index,
            path,
            duration_secs,
        }
    }
}

/// 処理計画: 単一パス or 分割
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentPlan {
    /// 正規化済み音声全体を1セグメントとして扱う（物理分割なし）
    SinglePass(Segment),
    /// `threshold` 秒ごとに分割したセグメント列（index 順）
    Split(Vec<Segment>),
}

impl SegmentPlan {
    pub fn single(path: &Path, duration_secs: Option<f64>) -> Self {
        Self::SinglePass(Segment::new(0, path.to_path_buf(), duration_secs))
    }

    pub fn segments(&self) -> &[Segment] {
        match self {
            Self::SinglePass(segment) => std::slice::from_ref(segment),
            Self::Split(segments) => segments,
        }
    }

    pub fn len(&self) -> usize {
        self.segments().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments().is_empty()
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Self::Split(_))
    }
}

/// `total_secs` を `max_segment_secs` ごとに区切ったときのセグメント数 (ceil)。
pub fn planned_segment_count(total_secs: f64, max_segment_secs: f64) -> usize {
    if total_secs <= 0.0 || max_segment_secs <= 0.0 {
        return 0;
    }
    (total_secs / max_segment_secs).ceil() as usize
}

/// 各セグメントの予定長。最後のセグメントのみ短くなり得る。
pub fn planned_durations(total_secs: f64, max_segment_secs: f64) -> Vec<f64> {
    let count = planned_segment_count(total_secs, max_segment_secs);
    (0..count)
        .map(|i| {
            if i + 1 < count {
                max_segment_secs
            } else {
                total_secs - max_segment_secs * (count - 1) as f64
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_seconds_at_35_is_three_segments() {
        assert_eq!(planned_segment_count(100.0, 35.0), 3);
        let durations = planned_durations(100.0, 35.0);
        assert_eq!(durations.len(), 3);
        assert!((durations[0] - 35.0).abs() < 1e-9);
        assert!((durations[1] - 35.0).abs() < 1e-9);
        assert!((durations[2] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        assert_eq!(planned_segment_count(70.0, 35.0), 2);
        let durations = planned_durations(70.0, 35.0);
        assert!((durations[1] - 35.0).abs() < 1e-9);
    }

    #[test]
    fn count_matches_ceil_for_many_durations() {
        for tenth in 1..2000 {
            let total = tenth as f64 / 10.0;
            let count = planned_segment_count(total, 35.0);
            assert_eq!(count, (total / 35.0).ceil() as usize);
            let durations = planned_durations(total, 35.0);
            assert!(durations.iter().all(|d| *d > 0.0 && *d <= 35.0 + 1e-9));
            assert!((durations.iter().sum::<f64>() - total).abs() < 1e-6);
        }
    }

    #[test]
    fn non_positive_inputs_plan_nothing() {
        assert_eq!(planned_segment_count(0.0, 35.0), 0);
        assert_eq!(planned_segment_count(-3.0, 35.0), 0);
        assert_eq!(planned_segment_count(10.0, 0.0), 0);
        assert!(planned_durations(0.0, 35.0).is_empty());
    }

    #[test]
    fn single_pass_exposes_one_segment() {
        let plan = SegmentPlan::single(Path::new("/tmp/job/normalized.wav"), Some(20.0));
        assert!(!plan.is_split());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.segments()[0].index, 0);
        assert_eq!(plan.segments()[0].duration_secs, Some(20.0));
    }
}
