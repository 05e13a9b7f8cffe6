pub mod compare;
pub mod derived;
pub mod normalize;
pub mod rescale;
pub mod series;
pub mod types;

pub use compare::TeamComparator;
pub use derived::{calculate_time_saved, DerivedMetrics};
pub use normalize::normalize_snapshot;
pub use rescale::WindowRescaler;
pub use series::{change_percentage, fit_periods, TrendSynthesizer};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_payload_to_derived_snapshot() {
        let raw = json!({
            "total_completions_count": "500",
            "totalAcceptanceCount": 200,
            "repository_metrics": [
                {"repository_name": "a", "completions_count": 100}
            ]
        });
        let config = crate::config::MetricsConfig::default();
        let snapshot = DerivedMetrics::new(config).apply(&normalize_snapshot(&raw));

        assert_eq!(snapshot.completions_count, 500);
        assert_eq!(snapshot.acceptance_count, 200);
        assert_eq!(snapshot.repository_breakdown.len(), 1);
        assert_eq!(snapshot.repository_breakdown[0].name, "a");
        assert_eq!(snapshot.repository_breakdown[0].metrics.completions_count, 100);
        assert_eq!(snapshot.estimated_time_saved, Some(3.06));
    }
}
