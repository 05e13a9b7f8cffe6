use serde::Serialize;

use crate::error::{Error, Result};

pub const KEY_SECONDS_PER_SUGGESTION: &str = "seconds_per_suggestion";
pub const KEY_MAX_HISTORICAL_DAYS: &str = "max_historical_days";
pub const KEY_DEFAULT_PERIOD_DAYS: &str = "default_period_days";
pub const KEY_CACHE_TTL_MINUTES: &str = "cache_ttl_minutes";
/// Largest accepted `max_historical_days`, about ten years.
pub const MAX_HISTORICAL_DAYS_LIMIT: u32 = 3650;
/// Organization used when a command does not name one.
pub const KEY_DEFAULT_ORG: &str = "org";

/// Tunables consumed by the metrics components.
///
/// Every component takes this by value in its constructor; nothing reads
/// process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsConfig {
    /// Developer time credited for each accepted suggestion.
    pub seconds_per_suggestion: f64,
    /// Oldest day the upstream provider will report on, counted back from today.
    pub max_historical_days: u32,
    /// Requested length of one trend period, before clamping.
    pub default_period_days: u32,
    /// Age after which cached snapshots are ignored.
    pub cache_ttl_minutes: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            seconds_per_suggestion: 55.0,
            max_historical_days: 28,
            default_period_days: 30,
            cache_ttl_minutes: 60,
        }
    }
}

impl MetricsConfig {
    /// Build a config from stored key/value pairs, falling back to defaults
    /// for missing keys. Unknown keys are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                KEY_SECONDS_PER_SUGGESTION => {
                    config.seconds_per_suggestion = parse_value(key, value)?;
                }
                KEY_MAX_HISTORICAL_DAYS => {
                    config.max_historical_days = parse_value(key, value)?;
                }
                KEY_DEFAULT_PERIOD_DAYS => {
                    config.default_period_days = parse_value(key, value)?;
                }
                KEY_CACHE_TTL_MINUTES => {
                    config.cache_ttl_minutes = parse_value(key, value)?;
                }
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.seconds_per_suggestion.is_finite() || self.seconds_per_suggestion <= 0.0 {
            return Err(Error::Config(format!(
                "{KEY_SECONDS_PER_SUGGESTION} must be a positive number, got {}",
                self.seconds_per_suggestion
            )));
        }
        if !(1..=MAX_HISTORICAL_DAYS_LIMIT).contains(&self.max_historical_days) {
            return Err(Error::Config(format!(
                "{KEY_MAX_HISTORICAL_DAYS} must be between 1 and {MAX_HISTORICAL_DAYS_LIMIT}, got {}",
                self.max_historical_days
            )));
        }
        if self.default_period_days == 0 {
            return Err(Error::Config(format!(
                "{KEY_DEFAULT_PERIOD_DAYS} must be at least 1"
            )));
        }
        Ok(())
    }

    /// Default period length clamped to the provider's historical ceiling.
    pub fn effective_period_days(&self) -> u32 {
        self.default_period_days.min(self.max_historical_days).max(1)
    }

    /// Whether `key` names a setting this struct understands.
    pub fn is_known_key(key: &str) -> bool {
        matches!(
            key,
            KEY_SECONDS_PER_SUGGESTION
                | KEY_MAX_HISTORICAL_DAYS
                | KEY_DEFAULT_PERIOD_DAYS
                | KEY_CACHE_TTL_MINUTES
        )
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}")))
}
