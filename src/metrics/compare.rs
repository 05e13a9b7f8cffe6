use std::collections::BTreeMap;

use crate::config::MetricsConfig;
use crate::metrics::derived::DerivedMetrics;
use crate::metrics::types::{ComparisonResult, MetricSelector, MetricSnapshot};

/// Pulls one scalar per team out of already-fetched snapshots.
#[derive(Debug, Clone, Copy)]
pub struct TeamComparator {
    derived: DerivedMetrics,
}

impl TeamComparator {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            derived: DerivedMetrics::new(config),
        }
    }

    /// The selected metric from a snapshot's own (unscaled) totals.
    pub fn value_of(&self, snapshot: &MetricSnapshot, metric: MetricSelector) -> f64 {
        match metric {
            MetricSelector::Completions => snapshot.completions_count as f64,
            MetricSelector::AcceptanceRate => snapshot.acceptance_percentage,
            MetricSelector::ActiveUsers => snapshot.active_users as f64,
            MetricSelector::TimeSaved => snapshot
                .estimated_time_saved
                .unwrap_or_else(|| self.derived.time_saved(snapshot.acceptance_count)),
            MetricSelector::AvgCompletionsPerUser => snapshot.avg_completions_per_user,
        }
    }

    /// Compare `teams` in the given order. Teams without a snapshot keep
    /// their label but get no value.
    pub fn compare(
        &self,
        teams: &[(String, Option<&MetricSnapshot>)],
        metric: MetricSelector,
    ) -> ComparisonResult {
        let mut values = BTreeMap::new();
        for (label, snapshot) in teams {
            if let Some(snapshot) = snapshot {
                values.insert(label.clone(), self.value_of(snapshot, metric));
            }
        }
        ComparisonResult {
            metric_name: metric.as_str().to_string(),
            entity_labels: teams.iter().map(|(label, _)| label.clone()).collect(),
            values,
        }
    }
}
