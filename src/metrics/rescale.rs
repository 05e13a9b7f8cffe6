use crate::config::MetricsConfig;
use crate::metrics::derived::DerivedMetrics;
use crate::metrics::types::{
    per_user, percentage, BreakdownMetrics, DateWindow, MetricSnapshot, RepositoryMetrics,
};

/// Share of `covered` represented by `overlap`, using inclusive day counts.
pub fn overlap_ratio(overlap: &DateWindow, covered: &DateWindow) -> f64 {
    overlap.days() as f64 / covered.days() as f64
}

pub fn scale_count(count: u64, ratio: f64) -> u64 {
    (count as f64 * ratio).round() as u64
}

/// Approximates a sub-window of a snapshot by linear scaling.
///
/// The upstream provider only reports one fixed trailing window, so a request
/// for "the last 7 days" assumes usage was spread evenly over the covered
/// window and scales every count by `overlap_days / covered_days`.
///
/// Counts are rounded independently, so `acceptance <= suggestions` can be off
/// by one after scaling. Percentages and per-user averages are always
/// recomputed from the scaled counts, including when the overlap is the whole
/// covered window; a zero denominator yields `0.0`.
#[derive(Debug, Clone, Copy)]
pub struct WindowRescaler {
    derived: DerivedMetrics,
}

impl WindowRescaler {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            derived: DerivedMetrics::new(config),
        }
    }

    /// Approximate `snapshot` over `requested`.
    ///
    /// The result covers the intersection of `requested` and the snapshot's
    /// window. With no intersection the result is all zeros and covers
    /// `requested` itself, so callers can tell "nothing there" from an error.
    pub fn rescale(&self, snapshot: &MetricSnapshot, requested: &DateWindow) -> MetricSnapshot {
        let Some(covered) = snapshot.covered_window else {
            log::debug!("Snapshot has no covered window; returning it unscaled");
            return self.derived.apply(snapshot);
        };

        let Some(overlap) = requested.intersect(&covered) else {
            log::debug!("Requested window {requested} does not overlap {covered}");
            return self.derived.apply(&MetricSnapshot::empty(Some(*requested)));
        };

        let ratio = overlap_ratio(&overlap, &covered);
        let scaled = scale_snapshot(snapshot, ratio).with_window(overlap);
        self.derived.apply(&scaled)
    }
}

fn scale_snapshot(snapshot: &MetricSnapshot, ratio: f64) -> MetricSnapshot {
    let completions_count = scale_count(snapshot.completions_count, ratio);
    let suggestion_count = scale_count(snapshot.suggestion_count, ratio);
    let acceptance_count = scale_count(snapshot.acceptance_count, ratio);
    let active_users = scale_count(snapshot.active_users, ratio);
    let acceptance_percentage = percentage(acceptance_count, suggestion_count);

    MetricSnapshot {
        completions_count,
        suggestion_count,
        acceptance_count,
        acceptance_percentage,
        active_users,
        avg_completions_per_user: per_user(completions_count, active_users),
        avg_suggestions_per_user: per_user(suggestion_count, active_users),
        avg_acceptance_percentage: acceptance_percentage,
        repository_breakdown: snapshot
            .repository_breakdown
            .iter()
            .map(|repo| RepositoryMetrics {
                id: repo.id.clone(),
                name: repo.name.clone(),
                metrics: scale_breakdown(&repo.metrics, ratio),
            })
            .collect(),
        language_breakdown: snapshot
            .language_breakdown
            .iter()
            .map(|(label, metrics)| (label.clone(), scale_breakdown(metrics, ratio)))
            .collect(),
        covered_window: snapshot.covered_window,
        estimated_time_saved: None,
    }
}

fn scale_breakdown(metrics: &BreakdownMetrics, ratio: f64) -> BreakdownMetrics {
    let suggestion_count = scale_count(metrics.suggestion_count, ratio);
    let acceptance_count = scale_count(metrics.acceptance_count, ratio);
    BreakdownMetrics {
        completions_count: scale_count(metrics.completions_count, ratio),
        suggestion_count,
        acceptance_count,
        acceptance_percentage: percentage(acceptance_count, suggestion_count),
        active_users: scale_count(metrics.active_users, ratio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn w(start: NaiveDate, end: NaiveDate) -> DateWindow {
        DateWindow::new(start, end).unwrap()
    }

    fn rescaler() -> WindowRescaler {
        WindowRescaler::new(MetricsConfig::default())
    }

    fn sample() -> MetricSnapshot {
        MetricSnapshot {
            completions_count: 2800,
            suggestion_count: 1400,
            acceptance_count: 560,
            acceptance_percentage: 41.0,
            active_users: 28,
            avg_completions_per_user: 100.0,
            avg_suggestions_per_user: 50.0,
            avg_acceptance_percentage: 38.5,
            repository_breakdown: vec![RepositoryMetrics {
                id: "1".into(),
                name: "acme/web".into(),
                metrics: BreakdownMetrics {
                    completions_count: 1400,
                    suggestion_count: 700,
                    acceptance_count: 280,
                    acceptance_percentage: 40.0,
                    active_users: 14,
                },
            }],
            language_breakdown: BTreeMap::from([(
                "rs".to_string(),
                BreakdownMetrics {
                    completions_count: 280,
                    suggestion_count: 140,
                    acceptance_count: 0,
                    acceptance_percentage: 0.0,
                    active_users: 4,
                },
            )]),
            covered_window: Some(w(d(2025, 1, 1), d(2025, 1, 28))),
            estimated_time_saved: None,
        }
    }

    #[test]
    fn test_identity_when_requested_equals_covered() {
        let s = sample();
        let out = rescaler().rescale(&s, &w(d(2025, 1, 1), d(2025, 1, 28)));
        assert_eq!(out.completions_count, s.completions_count);
        assert_eq!(out.suggestion_count, s.suggestion_count);
        assert_eq!(out.acceptance_count, s.acceptance_count);
        assert_eq!(out.active_users, s.active_users);
        assert_eq!(out.covered_window, s.covered_window);
        assert_eq!(out.estimated_time_saved, Some(8.56));
        // Upstream 41.0 and 38.5 are replaced by the rate of the counts
        assert_eq!(out.acceptance_percentage, 40.0);
        assert_eq!(out.avg_acceptance_percentage, 40.0);
        assert_eq!(out.repository_breakdown, s.repository_breakdown);
    }

    #[test]
    fn test_rates_consistent_across_full_window_boundary() {
        let s = sample();
        let full = rescaler().rescale(&s, &w(d(2025, 1, 1), d(2025, 1, 28)));
        let almost = rescaler().rescale(&s, &w(d(2025, 1, 2), d(2025, 1, 28)));
        assert_eq!(full.acceptance_percentage, almost.acceptance_percentage);
        assert_eq!(full.avg_acceptance_percentage, almost.avg_acceptance_percentage);
    }

    #[test]
    fn test_superset_request_is_clamped_to_covered() {
        let s = sample();
        let out = rescaler().rescale(&s, &w(d(2024, 12, 1), d(2025, 2, 28)));
        assert_eq!(out.covered_window, s.covered_window);
        assert_eq!(out.completions_count, 2800);
    }

    #[test]
    fn test_half_window_scales_counts_and_recomputes_rates() {
        let out = rescaler().rescale(&sample(), &w(d(2025, 1, 15), d(2025, 2, 10)));
        assert_eq!(out.covered_window, Some(w(d(2025, 1, 15), d(2025, 1, 28))));
        assert_eq!(out.completions_count, 1400);
        assert_eq!(out.suggestion_count, 700);
        assert_eq!(out.acceptance_count, 280);
        assert_eq!(out.active_users, 14);
        // Recomputed from scaled counts, not carried over from 41.0
        assert_eq!(out.acceptance_percentage, 40.0);
        assert_eq!(out.avg_acceptance_percentage, 40.0);
        assert_eq!(out.avg_completions_per_user, 100.0);
        assert_eq!(out.avg_suggestions_per_user, 50.0);
        // Time saved from the scaled acceptance count: 280 * 55 / 3600
        assert_eq!(out.estimated_time_saved, Some(4.28));

        let repo = &out.repository_breakdown[0];
        assert_eq!(repo.name, "acme/web");
        assert_eq!(repo.metrics.completions_count, 700);
        assert_eq!(repo.metrics.active_users, 7);
        assert_eq!(repo.metrics.acceptance_percentage, 40.0);

        let rs = &out.language_breakdown["rs"];
        assert_eq!(rs.completions_count, 140);
        assert_eq!(rs.acceptance_percentage, 0.0);
    }

    #[test]
    fn test_zero_denominators_yield_zero() {
        let s = MetricSnapshot {
            completions_count: 50,
            acceptance_count: 10,
            covered_window: Some(w(d(2025, 1, 1), d(2025, 1, 10))),
            ..MetricSnapshot::default()
        };
        let out = rescaler().rescale(&s, &w(d(2025, 1, 1), d(2025, 1, 5)));
        assert_eq!(out.completions_count, 25);
        assert_eq!(out.acceptance_percentage, 0.0);
        assert_eq!(out.avg_completions_per_user, 0.0);
        assert!(out.avg_suggestions_per_user.is_finite());
    }

    #[test]
    fn test_no_overlap_before_and_after() {
        let s = sample();
        for requested in [
            w(d(2024, 12, 1), d(2024, 12, 31)),
            w(d(2025, 2, 1), d(2025, 2, 14)),
        ] {
            let out = rescaler().rescale(&s, &requested);
            assert_eq!(out.completions_count, 0);
            assert_eq!(out.suggestion_count, 0);
            assert_eq!(out.acceptance_count, 0);
            assert_eq!(out.active_users, 0);
            assert_eq!(out.acceptance_percentage, 0.0);
            assert!(out.repository_breakdown.is_empty());
            assert!(out.language_breakdown.is_empty());
            assert_eq!(out.covered_window, Some(requested));
            assert_eq!(out.estimated_time_saved, Some(0.0));
        }
    }

    #[test]
    fn test_monotonic_in_overlap() {
        let s = MetricSnapshot {
            completions_count: 997,
            suggestion_count: 613,
            acceptance_count: 211,
            active_users: 9,
            covered_window: Some(w(d(2025, 1, 1), d(2025, 1, 28))),
            ..MetricSnapshot::default()
        };
        let mut previous = MetricSnapshot::default();
        for last_day in 1..=28 {
            let out = rescaler().rescale(&s, &w(d(2024, 12, 20), d(2025, 1, last_day)));
            assert!(out.completions_count >= previous.completions_count);
            assert!(out.suggestion_count >= previous.suggestion_count);
            assert!(out.acceptance_count >= previous.acceptance_count);
            assert!(out.active_users >= previous.active_users);
            previous = out;
        }
        assert_eq!(previous.completions_count, 997);
    }

    #[test]
    fn test_same_day_windows_do_not_divide_by_zero() {
        let s = MetricSnapshot {
            completions_count: 10,
            covered_window: Some(w(d(2025, 1, 5), d(2025, 1, 5))),
            ..MetricSnapshot::default()
        };
        let out = rescaler().rescale(&s, &w(d(2025, 1, 5), d(2025, 1, 5)));
        assert_eq!(out.completions_count, 10);
    }

    #[test]
    fn test_without_covered_window_is_passthrough() {
        let s = MetricSnapshot {
            completions_count: 10,
            ..MetricSnapshot::default()
        };
        let out = rescaler().rescale(&s, &w(d(2025, 1, 1), d(2025, 1, 2)));
        assert_eq!(out.completions_count, 10);
        assert_eq!(out.covered_window, None);
    }

    #[test]
    fn test_overlap_ratio() {
        let covered = w(d(2025, 1, 1), d(2025, 1, 28));
        assert_eq!(overlap_ratio(&w(d(2025, 1, 1), d(2025, 1, 7)), &covered), 0.25);
        assert_eq!(scale_count(3, 0.5), 2);
        assert_eq!(scale_count(0, 0.5), 0);
    }
}
