use crate::config::MetricsConfig;
use crate::date_util::round2;
use crate::metrics::types::MetricSnapshot;

/// Hours saved for `acceptance_count` accepted suggestions, to two decimals.
pub fn calculate_time_saved(acceptance_count: u64, seconds_per_suggestion: f64) -> f64 {
    round2(acceptance_count as f64 * seconds_per_suggestion / 3600.0)
}

/// Fills in metrics computed from a snapshot's own counts.
#[derive(Debug, Clone, Copy)]
pub struct DerivedMetrics {
    config: MetricsConfig,
}

impl DerivedMetrics {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn time_saved(&self, acceptance_count: u64) -> f64 {
        calculate_time_saved(acceptance_count, self.config.seconds_per_suggestion)
    }

    /// Copy of `snapshot` with `estimated_time_saved` populated.
    pub fn apply(&self, snapshot: &MetricSnapshot) -> MetricSnapshot {
        MetricSnapshot {
            estimated_time_saved: Some(self.time_saved(snapshot.acceptance_count)),
            ..snapshot.clone()
        }
    }
}
