pub mod config;
pub mod date_util;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod query;
pub mod scope;
pub mod storage;

pub use config::MetricsConfig;
pub use error::{Error, Result};
pub use fetch::{BatchReport, BatchStatus, FetchError, HttpSource, SnapshotSource, TeamFailure};
pub use metrics::{
    ComparisonResult, DateWindow, MetricSelector, MetricSnapshot, Trend, TrendPoint,
};
pub use query::Period;
pub use scope::{parse_scope, Scope};
pub use storage::repository::CacheStats;
pub use storage::Database;

use std::collections::HashSet;

use chrono::NaiveDate;
use futures::future::join_all;

use metrics::{normalize_snapshot, DerivedMetrics, TeamComparator, TrendSynthesizer, WindowRescaler};
use storage::repository;

/// Cache window key for a fetch that did not ask for a specific window.
pub const LATEST_WINDOW_KEY: &str = "latest";

/// Result of fetching one team as part of a batch.
#[derive(Debug)]
pub struct TeamOutcome {
    pub team: String,
    pub result: Result<MetricSnapshot>,
}

/// Side-by-side comparison plus what went wrong fetching it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TeamComparison {
    pub comparison: ComparisonResult,
    pub report: BatchReport,
}

/// Main entry point: fetches, normalizes and caches snapshots from a
/// [`SnapshotSource`] and runs the metric transforms over them.
pub struct CopilotStats<S> {
    db: Database,
    source: S,
    config: MetricsConfig,
    as_of: Option<NaiveDate>,
}

impl<S: SnapshotSource> CopilotStats<S> {
    pub fn new(db: Database, source: S, config: MetricsConfig) -> Self {
        Self {
            db,
            source,
            config,
            as_of: None,
        }
    }

    /// Build with the config stored in `db`.
    pub async fn open(db: Database, source: S) -> Result<Self> {
        let config = Self::load_config(&db).await?;
        Ok(Self::new(db, source, config))
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_as_of(mut self, today: NaiveDate) -> Self {
        self.as_of = Some(today);
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub async fn load_config(db: &Database) -> Result<MetricsConfig> {
        let pairs = db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        MetricsConfig::from_pairs(&pairs)
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Fetch, normalize and derive one snapshot.
    ///
    /// The scope is validated before anything else. A payload that does not
    /// say which days it covers is assumed to cover the window that was asked
    /// for, or the provider's full history when none was. The cache holds
    /// the snapshot before derivation, so derived fields always follow the
    /// current config.
    pub async fn fetch_snapshot(
        &self,
        scope: &Scope,
        window: Option<&DateWindow>,
    ) -> Result<MetricSnapshot> {
        scope.validate()?;

        let scope_key = scope.to_key();
        let window_key = window.map_or_else(|| LATEST_WINDOW_KEY.to_string(), DateWindow::to_key);

        let snapshot = match self.cached_snapshot(&scope_key, &window_key).await {
            Some(cached) => {
                log::debug!("Cache hit for {scope_key} ({window_key})");
                cached
            }
            None => {
                let snapshot = self.fetch_normalized(scope, window).await?;
                self.store_snapshot(&scope_key, &window_key, &snapshot).await;
                snapshot
            }
        };
        Ok(DerivedMetrics::new(self.config).apply(&snapshot))
    }

    async fn fetch_normalized(
        &self,
        scope: &Scope,
        window: Option<&DateWindow>,
    ) -> Result<MetricSnapshot> {
        log::info!("Fetching metrics for {scope}");
        let raw = self
            .source
            .fetch_snapshot(scope, window)
            .await
            .map_err(|e| Error::Upstream {
                scope: scope.to_string(),
                status: e.status,
                message: e.message,
            })?;

        let snapshot = normalize_snapshot(&raw);
        if snapshot.covered_window.is_some() {
            return Ok(snapshot);
        }
        let assumed = match window {
            Some(window) => *window,
            None => DateWindow::trailing(self.config.max_historical_days, self.today())?,
        };
        Ok(snapshot.with_window(assumed))
    }

    /// The provider's default (full history) snapshot for a scope.
    pub async fn current_snapshot(&self, scope: &Scope) -> Result<MetricSnapshot> {
        self.fetch_snapshot(scope, None).await
    }

    /// Approximate `requested` by rescaling the full-history snapshot.
    pub async fn snapshot_for_window(
        &self,
        scope: &Scope,
        requested: &DateWindow,
    ) -> Result<MetricSnapshot> {
        let snapshot = self.current_snapshot(scope).await?;
        Ok(WindowRescaler::new(self.config).rescale(&snapshot, requested))
    }

    /// Trend of `metric` over `period_count` periods ending today. Fails as a
    /// whole when the snapshot cannot be fetched.
    pub async fn time_series(
        &self,
        scope: &Scope,
        metric: MetricSelector,
        period_count: u32,
        period_days: Option<u32>,
    ) -> Result<Trend> {
        let snapshot = self.current_snapshot(scope).await?;
        let days = period_days.unwrap_or_else(|| self.config.effective_period_days());
        Ok(TrendSynthesizer::new(self.config).synthesize(
            &snapshot,
            metric,
            period_count,
            days,
            self.today(),
        ))
    }

    // ── Teams ──────────────────────────────────────────────────────

    /// Fetch several teams concurrently. Each outcome stands alone; one
    /// failure never cancels the rest. Outcomes keep the order of `teams`.
    pub async fn fetch_teams(
        &self,
        org: &str,
        teams: &[String],
        window: Option<&DateWindow>,
    ) -> Vec<TeamOutcome> {
        let fetches = teams.iter().map(|team| async move {
            let result = match scope::resolve_team(org, team) {
                Ok(scope) => self.fetch_snapshot(&scope, window).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                log::error!("Failed to fetch team {team}: {e}");
            }
            TeamOutcome {
                team: team.clone(),
                result,
            }
        });
        join_all(fetches).await
    }

    /// Compare `metric` across `teams`. Teams that fail to fetch keep their
    /// label but get no value, and are listed in the report. Repeated labels
    /// are compared once, at their first position.
    pub async fn compare_teams(
        &self,
        org: &str,
        teams: &[String],
        metric: MetricSelector,
        window: Option<&DateWindow>,
    ) -> Result<TeamComparison> {
        Scope::organization(org)?;

        let mut seen = HashSet::new();
        let teams: Vec<String> = teams
            .iter()
            .filter(|team| {
                let first = seen.insert(team.as_str());
                if !first {
                    log::debug!("Ignoring repeated team {team}");
                }
                first
            })
            .cloned()
            .collect();

        let outcomes = self.fetch_teams(org, &teams, window).await;
        let mut failures = Vec::new();
        let mut fetched = 0;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(_) => fetched += 1,
                Err(e) => failures.push(TeamFailure {
                    team: outcome.team.clone(),
                    message: e.to_string(),
                }),
            }
        }

        let labelled: Vec<(String, Option<&MetricSnapshot>)> = outcomes
            .iter()
            .map(|o| (o.team.clone(), o.result.as_ref().ok()))
            .collect();
        let comparison = TeamComparator::new(self.config).compare(&labelled, metric);

        let report = BatchReport::from_outcomes(org.to_string(), fetched, failures);
        if report.status == BatchStatus::PartialFailure {
            log::warn!(
                "{} of {} teams failed to fetch",
                report.teams_failed,
                teams.len()
            );
        }
        Ok(TeamComparison { comparison, report })
    }

    // ── Cache ──────────────────────────────────────────────────────

    /// Read a cached snapshot. Any failure is logged and treated as a miss.
    async fn cached_snapshot(&self, scope_key: &str, window_key: &str) -> Option<MetricSnapshot> {
        let ttl = self.config.cache_ttl_minutes;
        if ttl == 0 {
            return None;
        }
        let lookup = self
            .db
            .reader()
            .call({
                let scope_key = scope_key.to_string();
                let window_key = window_key.to_string();
                move |conn| repository::get_cached_snapshot(conn, &scope_key, &window_key, ttl)
            })
            .await;
        let json = match lookup {
            Ok(json) => json?,
            Err(e) => {
                log::warn!("Snapshot cache read failed: {e}");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::warn!("Discarding unreadable cache entry for {scope_key}: {e}");
                None
            }
        }
    }

    /// Write a normalized snapshot to the cache. Failures are logged only.
    async fn store_snapshot(&self, scope_key: &str, window_key: &str, snapshot: &MetricSnapshot) {
        if self.config.cache_ttl_minutes == 0 {
            return;
        }
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Could not serialize snapshot for cache: {e}");
                return;
            }
        };
        let stored = self
            .db
            .writer()
            .call({
                let scope_key = scope_key.to_string();
                let window_key = window_key.to_string();
                move |conn| repository::put_cached_snapshot(conn, &scope_key, &window_key, &json)
            })
            .await;
        if let Err(e) = stored {
            log::warn!("Snapshot cache write failed: {e}");
        }
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let ttl = self.config.cache_ttl_minutes;
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::cache_stats(conn, ttl))
            .await?)
    }

    /// Remove cached snapshots for one scope, or everything.
    pub async fn cache_clear(&self, scope: Option<&Scope>) -> Result<usize> {
        let scope_key = scope.map(Scope::to_key);
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::clear_cache(conn, scope_key.as_deref()))
            .await?)
    }

    pub async fn cache_prune(&self) -> Result<usize> {
        let ttl = self.config.cache_ttl_minutes;
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::prune_cache(conn, ttl))
            .await?)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await?)
    }

    /// Store a setting after checking it parses. Metric settings take effect
    /// the next time the config is loaded.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        if key == config::KEY_DEFAULT_ORG {
            Scope::organization(value)?;
        } else if MetricsConfig::is_known_key(key) {
            let mut pairs = self.config_list().await?;
            pairs.retain(|(k, _)| k != key);
            pairs.push((key.to_string(), value.to_string()));
            MetricsConfig::from_pairs(&pairs)?;
        } else {
            return Err(Error::Config(format!("unknown config key: {key}")));
        }

        Ok(self
            .db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.trim().to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await?)
    }

    pub async fn config_unset(&self, key: &str) -> Result<bool> {
        Ok(self
            .db
            .writer()
            .call({
                let key = key.to_string();
                move |conn| repository::unset_config(conn, &key)
            })
            .await?)
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?)
    }

    /// Organization from the `org` setting, if one is stored.
    pub async fn default_org(&self) -> Result<Option<String>> {
        self.config_get(config::KEY_DEFAULT_ORG).await
    }
}
