use chrono::{Duration, NaiveDate};

use crate::config::MetricsConfig;
use crate::metrics::derived::DerivedMetrics;
use crate::metrics::rescale::{overlap_ratio, scale_count};
use crate::metrics::types::{DateWindow, MetricSelector, MetricSnapshot, Trend, TrendPoint};

/// Fit `(period_count, period_days)` inside `max_days` of history.
///
/// Shrinks the period length first, keeping the count. When even one-day
/// periods would not fit, keeps the period length and drops periods instead,
/// down to a single period spanning the whole limit.
pub fn fit_periods(period_count: u32, period_days: u32, max_days: u32) -> (u32, u32) {
    let count = period_count.max(1);
    let days = period_days.max(1);
    let max_days = max_days.max(1);

    if u64::from(count) * u64::from(days) <= u64::from(max_days) {
        return (count, days);
    }
    if count <= max_days {
        return (count, max_days / count);
    }
    let fitted = max_days / days;
    if fitted <= 1 {
        (1, max_days)
    } else {
        (fitted, days)
    }
}

/// `(last - first) / first * 100` over chronological points; `0.0` when the
/// first value is zero or there are no points.
pub fn change_percentage(points: &[TrendPoint]) -> f64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if first.value != 0.0 => {
            (last.value - first.value) / first.value * 100.0
        }
        _ => 0.0,
    }
}

/// Synthesizes a trend from one bulk snapshot.
///
/// The upstream API cannot be queried per period, so each period's value is
/// the share of the snapshot that falls inside that period's calendar days.
/// Rate metrics are not divisible across time and are copied whole into
/// every period that overlaps the snapshot at all.
#[derive(Debug, Clone, Copy)]
pub struct TrendSynthesizer {
    config: MetricsConfig,
    derived: DerivedMetrics,
}

impl TrendSynthesizer {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            derived: DerivedMetrics::new(config),
        }
    }

    /// Period windows ending on `today`, most recent first. Periods that
    /// would start before the earliest representable date are left out.
    pub fn period_windows(&self, period_count: u32, period_days: u32, today: NaiveDate) -> Vec<DateWindow> {
        let (count, days) = fit_periods(period_count, period_days, self.config.max_historical_days);
        (0..count)
            .map_while(|i| {
                let end = today.checked_sub_signed(Duration::days(i64::from(i) * i64::from(days)))?;
                DateWindow::trailing(days, end).ok()
            })
            .collect()
    }

    /// Spread `snapshot` over `period_count` periods of `period_days` ending
    /// on `today`. Points come back oldest first.
    pub fn synthesize(
        &self,
        snapshot: &MetricSnapshot,
        metric: MetricSelector,
        period_count: u32,
        period_days: u32,
        today: NaiveDate,
    ) -> Trend {
        let (_, days) = fit_periods(period_count, period_days, self.config.max_historical_days);
        let mut points: Vec<TrendPoint> = self
            .period_windows(period_count, period_days, today)
            .into_iter()
            .map(|period| TrendPoint {
                date: period.end,
                value: self.period_value(snapshot, metric, &period),
            })
            .collect();
        points.sort_by_key(|p| p.date);

        Trend {
            metric_name: metric.as_str().to_string(),
            period_days: days,
            change_percentage: change_percentage(&points),
            points,
        }
    }

    fn period_value(&self, snapshot: &MetricSnapshot, metric: MetricSelector, period: &DateWindow) -> f64 {
        let Some(covered) = snapshot.covered_window else {
            return 0.0;
        };
        let Some(overlap) = period.intersect(&covered) else {
            return 0.0;
        };

        let ratio = overlap_ratio(&overlap, &covered);
        match metric {
            MetricSelector::Completions => scale_count(snapshot.completions_count, ratio) as f64,
            MetricSelector::ActiveUsers => scale_count(snapshot.active_users, ratio) as f64,
            MetricSelector::TimeSaved => self
                .derived
                .time_saved(scale_count(snapshot.acceptance_count, ratio)),
            MetricSelector::AcceptanceRate => snapshot.acceptance_percentage,
            MetricSelector::AvgCompletionsPerUser => snapshot.avg_completions_per_user,
        }
    }
}
