use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date_util::{days_ending, inclusive_days};
use crate::error::{Error, Result};

/// An inclusive calendar window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::PeriodParse(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The trailing `days`-long window ending on `end`.
    pub fn trailing(days: u32, end: NaiveDate) -> Result<Self> {
        let (start, end) = days_ending(end, days).ok_or_else(|| {
            Error::PeriodParse(format!("{days} days before {end} is out of range"))
        })?;
        Ok(Self { start, end })
    }

    /// Inclusive day count, never less than 1.
    pub fn days(&self) -> i64 {
        inclusive_days(self.start, self.end)
    }

    /// Overlap with `other`, or `None` when they are disjoint.
    pub fn intersect(&self, other: &DateWindow) -> Option<DateWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end < start {
            None
        } else {
            Some(DateWindow { start, end })
        }
    }

    /// Key used for cache lookups.
    pub fn to_key(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Count and percentage fields narrowed to one repository or language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownMetrics {
    pub completions_count: u64,
    pub suggestion_count: u64,
    pub acceptance_count: u64,
    pub acceptance_percentage: f64,
    pub active_users: u64,
}

/// Per-repository slice of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub metrics: BreakdownMetrics,
}

/// Canonical aggregate of usage metrics for one scope and window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub completions_count: u64,
    pub suggestion_count: u64,
    pub acceptance_count: u64,
    pub acceptance_percentage: f64,
    pub active_users: u64,
    pub avg_completions_per_user: f64,
    pub avg_suggestions_per_user: f64,
    pub avg_acceptance_percentage: f64,
    pub repository_breakdown: Vec<RepositoryMetrics>,
    /// Keyed by file-extension label.
    pub language_breakdown: BTreeMap<String, BreakdownMetrics>,
    pub covered_window: Option<DateWindow>,
    /// Hours; `None` until derived metrics have been applied.
    pub estimated_time_saved: Option<f64>,
}

impl MetricSnapshot {
    /// An all-zero snapshot with empty collections covering `window`.
    pub fn empty(window: Option<DateWindow>) -> Self {
        Self {
            covered_window: window,
            ..Self::default()
        }
    }

    /// Acceptance percentage computed from the raw counts rather than the
    /// upstream-supplied value.
    pub fn recomputed_acceptance_percentage(&self) -> f64 {
        percentage(self.acceptance_count, self.suggestion_count)
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.covered_window = Some(window);
        self
    }
}

/// `part / whole * 100`, clamped to `[0, 100]`; zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 100.0).min(100.0)
    }
}

/// `total / users`; zero when there are no users.
pub fn per_user(total: u64, users: u64) -> f64 {
    if users == 0 {
        0.0
    } else {
        total as f64 / users as f64
    }
}

/// Which scalar to pull out of a snapshot for trends and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricSelector {
    Completions,
    AcceptanceRate,
    ActiveUsers,
    TimeSaved,
    AvgCompletionsPerUser,
}

impl MetricSelector {
    pub const ALL: [MetricSelector; 5] = [
        MetricSelector::Completions,
        MetricSelector::AcceptanceRate,
        MetricSelector::ActiveUsers,
        MetricSelector::TimeSaved,
        MetricSelector::AvgCompletionsPerUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSelector::Completions => "completions",
            MetricSelector::AcceptanceRate => "acceptance-rate",
            MetricSelector::ActiveUsers => "active-users",
            MetricSelector::TimeSaved => "time-saved",
            MetricSelector::AvgCompletionsPerUser => "avg-completions-per-user",
        }
    }

    /// Rates and averages cannot be split across time.
    pub fn is_rate(&self) -> bool {
        matches!(
            self,
            MetricSelector::AcceptanceRate | MetricSelector::AvgCompletionsPerUser
        )
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        MetricSelector::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = MetricSelector::ALL.iter().map(|m| m.as_str()).collect();
                Error::Other(format!(
                    "unknown metric '{s}'. Use one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// One synthesized value for the period ending on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Chronological series for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub metric_name: String,
    /// Period length actually used, after fitting to the historical limit.
    pub period_days: u32,
    pub points: Vec<TrendPoint>,
    pub change_percentage: f64,
}

/// Side-by-side values for several teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub metric_name: String,
    /// Every requested team, in request order.
    pub entity_labels: Vec<String>,
    /// Only teams that had a snapshot.
    pub values: BTreeMap<String, f64>,
}

impl ComparisonResult {
    /// Label with the largest value. Ties go to the label listed first.
    pub fn highest(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for label in &self.entity_labels {
            let Some(&value) = self.values.get(label) else {
                continue;
            };
            match best {
                Some((_, top)) if value <= top => {}
                _ => best = Some((label.as_str(), value)),
            }
        }
        best.map(|(label, _)| label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_window_intersect() {
        let a = DateWindow::new(d(2025, 1, 1), d(2025, 1, 28)).unwrap();
        let b = DateWindow::new(d(2025, 1, 20), d(2025, 2, 10)).unwrap();
        assert_eq!(
            a.intersect(&b),
            Some(DateWindow { start: d(2025, 1, 20), end: d(2025, 1, 28) })
        );

        let c = DateWindow::new(d(2025, 3, 1), d(2025, 3, 5)).unwrap();
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_window_rejects_inverted() {
        assert!(DateWindow::new(d(2025, 2, 1), d(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_window_trailing_and_key() {
        let w = DateWindow::trailing(28, d(2025, 1, 28)).unwrap();
        assert_eq!(w.start, d(2025, 1, 1));
        assert_eq!(w.days(), 28);
        assert_eq!(w.to_key(), "2025-01-01..2025-01-28");

        let err = DateWindow::trailing(100_000_000, d(2025, 1, 28)).unwrap_err();
        assert!(matches!(err, Error::PeriodParse(_)));
    }

    #[test]
    fn test_percentage_guards() {
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(25, 100), 25.0);
        // More acceptances than suggestions is tolerated, not propagated
        assert_eq!(percentage(150, 100), 100.0);
        assert_eq!(per_user(10, 0), 0.0);
        assert_eq!(per_user(10, 4), 2.5);
    }

    #[test]
    fn test_metric_selector_parse() {
        assert_eq!(
            "acceptance-rate".parse::<MetricSelector>().unwrap(),
            MetricSelector::AcceptanceRate
        );
        assert_eq!(
            "time_saved".parse::<MetricSelector>().unwrap(),
            MetricSelector::TimeSaved
        );
        assert!("lines".parse::<MetricSelector>().is_err());
        assert!(MetricSelector::AcceptanceRate.is_rate());
        assert!(!MetricSelector::Completions.is_rate());
    }

    #[test]
    fn test_highest_prefers_first_on_tie() {
        let result = ComparisonResult {
            metric_name: "completions".into(),
            entity_labels: vec!["web".into(), "api".into(), "data".into()],
            values: BTreeMap::from([
                ("web".to_string(), 10.0),
                ("api".to_string(), 10.0),
                ("data".to_string(), 3.0),
            ]),
        };
        assert_eq!(result.highest(), Some("web"));
    }

    #[test]
    fn test_highest_skips_missing() {
        let result = ComparisonResult {
            metric_name: "completions".into(),
            entity_labels: vec!["gone".into(), "api".into()],
            values: BTreeMap::from([("api".to_string(), 0.0)]),
        };
        assert_eq!(result.highest(), Some("api"));

        let empty = ComparisonResult {
            metric_name: "completions".into(),
            entity_labels: vec!["gone".into()],
            values: BTreeMap::new(),
        };
        assert_eq!(empty.highest(), None);
    }
}
