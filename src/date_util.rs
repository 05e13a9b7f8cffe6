use chrono::{Duration, NaiveDate};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Number of calendar days in `[start, end]`, floored at 1 so same-day and
/// inverted ranges never produce a zero divisor.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    ((end - start).num_days() + 1).max(1)
}

/// The `days`-long window ending on `end` (inclusive), or `None` when it
/// would start before the earliest representable date.
pub fn days_ending(end: NaiveDate, days: u32) -> Option<(NaiveDate, NaiveDate)> {
    let span = i64::from(days.max(1)) - 1;
    let start = end.checked_sub_signed(Duration::days(span))?;
    Some((start, end))
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse the `YYYY-MM-DD` prefix of a date or ISO datetime string.
pub fn parse_date_prefix(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let prefix = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2025, 1), d(2025, 1, 31));
        assert_eq!(last_day_of_month(2025, 2), d(2025, 2, 28));
        assert_eq!(last_day_of_month(2024, 2), d(2024, 2, 29)); // Leap year
        assert_eq!(last_day_of_month(2025, 12), d(2025, 12, 31));
    }

    #[test]
    fn test_inclusive_days() {
        assert_eq!(inclusive_days(d(2025, 1, 1), d(2025, 1, 28)), 28);
        assert_eq!(inclusive_days(d(2025, 1, 5), d(2025, 1, 5)), 1);
        // Inverted ranges are floored, never zero or negative
        assert_eq!(inclusive_days(d(2025, 1, 10), d(2025, 1, 1)), 1);
    }

    #[test]
    fn test_days_ending() {
        assert_eq!(days_ending(d(2025, 1, 28), 28), Some((d(2025, 1, 1), d(2025, 1, 28))));
        assert_eq!(days_ending(d(2025, 1, 28), 1), Some((d(2025, 1, 28), d(2025, 1, 28))));
        assert_eq!(days_ending(d(2025, 1, 28), 0), Some((d(2025, 1, 28), d(2025, 1, 28))));
        assert_eq!(days_ending(d(2025, 1, 28), 100_000_000), None);
        assert_eq!(days_ending(d(2025, 1, 28), u32::MAX), None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(15.277_777), 15.28);
        assert_eq!(round2(3.055_555), 3.06);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_parse_date_prefix() {
        assert_eq!(parse_date_prefix("2025-01-15"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date_prefix("2025-01-15T10:00:00Z"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date_prefix("yesterday"), None);
        assert_eq!(parse_date_prefix(""), None);
    }
}
