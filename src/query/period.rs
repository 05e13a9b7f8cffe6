use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::{Captures, Regex};

use crate::date_util::last_day_of_month;
use crate::error::{Error, Result};
use crate::metrics::types::DateWindow;

static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)[dD]$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-[wW](\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\s*\.\.\s*(\d{4}-\d{2}-\d{2})$").unwrap()
});

fn number<T: std::str::FromStr>(caps: &Captures<'_>, group: usize, input: &str) -> Result<T> {
    caps[group]
        .parse()
        .map_err(|_| Error::PeriodParse(format!("number out of range in: {input}")))
}

fn date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::PeriodParse(format!("invalid date: {s}")))
}

/// A user-facing window expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    /// Last N days ending today.
    Rolling(u32),
    Week(i32, u8),
    Month(i32, u8),
    WeekToDate,
    MonthToDate,
    Range(NaiveDate, NaiveDate),
}

impl Period {
    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `7d`: rolling last N days
    /// - `2025-W05`: ISO week
    /// - `2025-01`: calendar month
    /// - `wtd`, `mtd`: week or month to date
    /// - `2025-01-01..2025-01-14`: explicit inclusive range
    /// - `2025-01-05`: a single day
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "wtd" => return Ok(Period::WeekToDate),
            "mtd" => return Ok(Period::MonthToDate),
            _ => {}
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let n: u32 = number(&caps, 1, s)?;
            if n == 0 {
                return Err(Error::PeriodParse(format!("rolling period must be at least 1 day: {s}")));
            }
            return Ok(Period::Rolling(n));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = number(&caps, 1, s)?;
            let week: u8 = number(&caps, 2, s)?;
            if (1..=53).contains(&week) {
                return Ok(Period::Week(year, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = number(&caps, 1, s)?;
            let month: u8 = number(&caps, 2, s)?;
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        if let Some(caps) = RE_RANGE.captures(s) {
            let start = date(&caps[1])?;
            let end = date(&caps[2])?;
            if start > end {
                return Err(Error::PeriodParse(format!("range starts after it ends: {s}")));
            }
            return Ok(Period::Range(start, end));
        }

        if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Period::Range(day, day));
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Canonical key string.
    pub fn to_key(&self) -> String {
        match self {
            Period::Rolling(n) => format!("{n}d"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::WeekToDate => "wtd".to_string(),
            Period::MonthToDate => "mtd".to_string(),
            Period::Range(start, end) => format!("{start}..{end}"),
        }
    }

    /// Resolve to an inclusive window, with relative periods ending on `today`.
    pub fn window(&self, today: NaiveDate) -> Result<DateWindow> {
        match self {
            Period::Rolling(n) => DateWindow::trailing(*n, today),
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(*y, u32::from(*w), Weekday::Mon)
                    .ok_or_else(|| Error::PeriodParse(format!("{y} has no ISO week {w}")))?;
                DateWindow::new(start, start + Duration::days(6))
            }
            Period::Month(y, m) => {
                let start = NaiveDate::from_ymd_opt(*y, u32::from(*m), 1)
                    .ok_or_else(|| Error::PeriodParse(format!("invalid month: {y}-{m:02}")))?;
                DateWindow::new(start, last_day_of_month(*y, u32::from(*m)))
            }
            Period::WeekToDate => {
                let offset = i64::from(today.weekday().num_days_from_monday());
                DateWindow::new(today - Duration::days(offset), today)
            }
            Period::MonthToDate => {
                let start = today.with_day(1).unwrap_or(today);
                DateWindow::new(start, today)
            }
            Period::Range(start, end) => DateWindow::new(*start, *end),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}
