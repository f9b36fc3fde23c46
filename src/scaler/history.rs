//! Sliding-window metric history and trend classification
//!
//! Each (service, metric) pair owns a FIFO-bounded ring of recent samples.
//! The predictive algorithm reads trends out of the last five samples.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// The metric kinds the scaler records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    CpuUsagePercent,
    MemoryUsagePercent,
    ResponseTimeMs,
    ConnectionUtilizationPercent,
    CacheMemoryPercent,
    ErrorRatePercent,
}

/// A single recorded observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Three-way classification of recent metric movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Bounded per-(service, metric) sample history
///
/// Rings are created lazily on first write and live for the process lifetime.
/// Written only by the control loop.
#[derive(Debug)]
pub struct MetricHistory {
    rings: HashMap<(String, MetricKind), VecDeque<MetricSample>>,
    capacity: usize,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: HashMap::new(),
            capacity,
        }
    }

    /// Append a sample taken now; evicts the oldest entry when full
    pub fn append(&mut self, service: &str, kind: MetricKind, value: f64) {
        self.append_at(service, kind, value, Utc::now());
    }

    /// Append a sample with an explicit timestamp
    pub fn append_at(
        &mut self,
        service: &str,
        kind: MetricKind,
        value: f64,
        timestamp: DateTime<Utc>,
    ) {
        let ring = self
            .rings
            .entry((service.to_string(), kind))
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(MetricSample { timestamp, value });
    }

    /// Number of retained samples for a metric
    pub fn len(&self, service: &str, kind: MetricKind) -> usize {
        self.rings
            .get(&(service.to_string(), kind))
            .map(|r| r.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, service: &str, kind: MetricKind) -> bool {
        self.len(service, kind) == 0
    }

    /// Most recent sample for a metric, if any
    pub fn latest(&self, service: &str, kind: MetricKind) -> Option<MetricSample> {
        self.rings
            .get(&(service.to_string(), kind))
            .and_then(|ring| ring.back())
            .copied()
    }

    /// Classify recent movement of a metric
    ///
    /// Looks at the last five samples: the mean of the newest three against
    /// the mean of the rest (or the window's first sample when only three
    /// exist). More than a 10% rise is increasing, more than a 10% drop is
    /// decreasing; ties and short histories are stable.
    pub fn trend(&self, service: &str, kind: MetricKind) -> Trend {
        let ring = match self.rings.get(&(service.to_string(), kind)) {
            Some(ring) => ring,
            None => return Trend::Stable,
        };

        if ring.len() < 3 {
            return Trend::Stable;
        }

        let window: Vec<f64> = ring
            .iter()
            .skip(ring.len().saturating_sub(5))
            .map(|s| s.value)
            .collect();
        if window.len() < 3 {
            return Trend::Stable;
        }

        let recent_avg = mean(&window[window.len() - 3..]);
        let older_avg = if window.len() > 3 {
            mean(&window[..window.len() - 3])
        } else {
            window[0]
        };

        if recent_avg > older_avg * 1.1 {
            Trend::Increasing
        } else if recent_avg < older_avg * 0.9 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const SVC: &str = "api";

    fn history_with(values: &[f64]) -> MetricHistory {
        let mut history = MetricHistory::new(10);
        let base = Utc::now();
        for (i, v) in values.iter().enumerate() {
            history.append_at(
                SVC,
                MetricKind::CpuUsagePercent,
                *v,
                base + TimeDelta::seconds(i as i64),
            );
        }
        history
    }

    #[test]
    fn test_ring_respects_capacity_and_order() {
        let mut history = MetricHistory::new(3);
        let base = Utc::now();
        for i in 0..5 {
            history.append_at(
                SVC,
                MetricKind::ResponseTimeMs,
                i as f64,
                base + TimeDelta::seconds(i),
            );
        }

        assert_eq!(history.len(SVC, MetricKind::ResponseTimeMs), 3);

        // Oldest two evicted; remaining samples in timestamp order
        let ring = history
            .rings
            .get(&(SVC.to_string(), MetricKind::ResponseTimeMs))
            .unwrap();
        let values: Vec<f64> = ring.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert!(ring
            .iter()
            .zip(ring.iter().skip(1))
            .all(|(a, b)| a.timestamp < b.timestamp));

        let newest = history.latest(SVC, MetricKind::ResponseTimeMs).unwrap();
        assert_eq!(newest.value, 4.0);
        assert!(history.latest(SVC, MetricKind::CpuUsagePercent).is_none());
    }

    #[test]
    fn test_rings_are_independent_per_metric() {
        let mut history = MetricHistory::new(10);
        history.append(SVC, MetricKind::CpuUsagePercent, 50.0);
        history.append(SVC, MetricKind::MemoryUsagePercent, 60.0);
        history.append("postgres", MetricKind::CpuUsagePercent, 10.0);

        assert_eq!(history.len(SVC, MetricKind::CpuUsagePercent), 1);
        assert_eq!(history.len(SVC, MetricKind::MemoryUsagePercent), 1);
        assert_eq!(history.len("postgres", MetricKind::CpuUsagePercent), 1);
        assert!(history.is_empty(SVC, MetricKind::ErrorRatePercent));
    }

    #[test]
    fn test_trend_needs_three_samples() {
        assert_eq!(history_with(&[]).trend(SVC, MetricKind::CpuUsagePercent), Trend::Stable);
        assert_eq!(
            history_with(&[50.0, 90.0]).trend(SVC, MetricKind::CpuUsagePercent),
            Trend::Stable
        );
    }

    #[test]
    fn test_trend_increasing() {
        // recent = mean(62, 68, 72) = 67.33, older = mean(50, 55) = 52.5
        let history = history_with(&[50.0, 55.0, 62.0, 68.0, 72.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Increasing);
    }

    #[test]
    fn test_trend_decreasing() {
        let history = history_with(&[80.0, 75.0, 40.0, 35.0, 30.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Decreasing);
    }

    #[test]
    fn test_trend_stable_within_band() {
        let history = history_with(&[50.0, 50.0, 52.0, 51.0, 50.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Stable);
    }

    #[test]
    fn test_trend_three_samples_compares_against_first() {
        // With exactly three samples, older = first sample = 50;
        // recent = mean(50, 54, 56) = 53.33 which is within 1.1 * 50
        let history = history_with(&[50.0, 54.0, 56.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Stable);

        // recent = mean(50, 60, 62) = 57.33 > 55 = 1.1 * 50
        let history = history_with(&[50.0, 60.0, 62.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Increasing);
    }

    #[test]
    fn test_trend_window_is_last_five() {
        // Early spike falls outside the five-sample window and is ignored:
        // window = [50, 50, 50, 50, 50]
        let history = history_with(&[500.0, 500.0, 50.0, 50.0, 50.0, 50.0, 50.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Stable);
    }

    #[test]
    fn test_trend_boundary_ties_are_stable() {
        // recent = mean(55, 55, 55) = 55 = 1.1 * 50 exactly; strict comparison
        let history = history_with(&[50.0, 50.0, 55.0, 55.0, 55.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Stable);

        // recent = 45 = 0.9 * 50 exactly
        let history = history_with(&[50.0, 50.0, 45.0, 45.0, 45.0]);
        assert_eq!(history.trend(SVC, MetricKind::CpuUsagePercent), Trend::Stable);
    }
}
