use clap::{Parser, Subcommand};

use copilotstats::{
    BatchReport, CacheStats, CopilotStats, DateWindow, HttpSource, MetricSelector,
    MetricSnapshot, Period, Scope, SnapshotSource, TeamComparison, Trend,
};

#[derive(Parser)]
#[command(name = "copilotstats", about = "Code-completion usage metrics CLI")]
struct Cli {
    /// Database path (default: ~/.copilotstats/copilotstats.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Organization (default: the `org` config value)
    #[arg(long, global = true)]
    org: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metrics for an organization or team
    Snapshot {
        /// `org`, `org/team` or a GitHub org/team URL
        scope: Option<String>,
        /// Team slug within --org
        #[arg(long)]
        team: Option<String>,
        /// Window to approximate: 7d, 2025-W05, 2025-01, mtd, wtd, or a..b
        #[arg(long)]
        period: Option<String>,
        /// Show per-repository and per-language breakdowns
        #[arg(long)]
        breakdown: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a metric as a trend over recent periods
    Trend {
        /// `org`, `org/team` or a GitHub org/team URL
        scope: Option<String>,
        /// Team slug within --org
        #[arg(long)]
        team: Option<String>,
        /// completions, acceptance-rate, active-users, time-saved, avg-completions-per-user
        #[arg(long, default_value = "completions")]
        metric: MetricSelector,
        /// Number of periods
        #[arg(long, default_value = "4")]
        periods: u32,
        /// Days per period (default: default_period_days config value)
        #[arg(long)]
        days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare one metric across teams
    Compare {
        /// Team slugs within --org (or `org/team`)
        #[arg(required = true)]
        teams: Vec<String>,
        #[arg(long, default_value = "completions")]
        metric: MetricSelector,
        /// Window to request from the provider
        #[arg(long)]
        period: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the snapshot cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show database, configuration and cache status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Remove a config value (reverting to the default)
    Unset { key: String },
    /// List all config values
    List,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Delete cached snapshots for one scope, or all of them
    Clear {
        /// `org` or `org/team`
        scope: Option<String>,
    },
    /// Delete entries older than the cache TTL
    Prune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => copilotstats::Database::open_at(path).await?,
        None => copilotstats::Database::open().await?,
    };

    match cli.command {
        Commands::Snapshot {
            scope,
            team,
            period,
            breakdown,
            json,
        } => {
            let app = CopilotStats::open(db, HttpSource::from_env()?).await?;
            let scope = resolve_scope(&app, cli.org.as_deref(), scope.as_deref(), team.as_deref()).await?;
            let snapshot = match period {
                Some(p) => {
                    let window = Period::parse(&p)?.window(app.today())?;
                    app.snapshot_for_window(&scope, &window).await?
                }
                None => app.current_snapshot(&scope).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&scope, &snapshot, breakdown);
            }
        }
        Commands::Trend {
            scope,
            team,
            metric,
            periods,
            days,
            json,
        } => {
            let app = CopilotStats::open(db, HttpSource::from_env()?).await?;
            let scope = resolve_scope(&app, cli.org.as_deref(), scope.as_deref(), team.as_deref()).await?;
            let trend = app.time_series(&scope, metric, periods, days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trend)?);
            } else {
                print_trend(&scope, metric, &trend);
            }
        }
        Commands::Compare {
            teams,
            metric,
            period,
            json,
        } => {
            let app = CopilotStats::open(db, HttpSource::from_env()?).await?;
            let org = resolve_org(&app, cli.org.as_deref()).await?;
            let window = match period {
                Some(p) => Some(Period::parse(&p)?.window(app.today())?),
                None => None,
            };
            let result = app
                .compare_teams(&org, &teams, metric, window.as_ref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_comparison(metric, &result);
            }
        }
        Commands::Config { action } => {
            handle_config(&offline(db).await?, action).await?;
        }
        Commands::Cache { action } => {
            handle_cache(&offline(db).await?, action).await?;
        }
        Commands::Status => {
            print_status(&offline(db).await?, cli.db.as_deref()).await?;
        }
    }

    Ok(())
}

/// App for commands that only touch the local database. No token needed
/// since nothing is fetched.
async fn offline(db: copilotstats::Database) -> anyhow::Result<CopilotStats<HttpSource>> {
    let source = HttpSource::new(copilotstats::fetch::http::DEFAULT_API_URL, None)?;
    Ok(CopilotStats::open(db, source).await?)
}

async fn resolve_org<S: SnapshotSource>(
    app: &CopilotStats<S>,
    org_flag: Option<&str>,
) -> anyhow::Result<String> {
    if let Some(org) = org_flag {
        return Ok(org.to_string());
    }
    app.default_org().await?.ok_or_else(|| {
        anyhow::anyhow!("No organization given. Pass --org or run 'copilotstats config set org <name>'.")
    })
}

async fn resolve_scope<S: SnapshotSource>(
    app: &CopilotStats<S>,
    org_flag: Option<&str>,
    target: Option<&str>,
    team: Option<&str>,
) -> anyhow::Result<Scope> {
    if let Some(target) = target {
        return Ok(copilotstats::parse_scope(target)?);
    }
    let org = resolve_org(app, org_flag).await?;
    let scope = match team {
        Some(team) => copilotstats::scope::resolve_team(&org, team)?,
        None => Scope::organization(&org)?,
    };
    Ok(scope)
}

async fn handle_config<S: SnapshotSource>(
    app: &CopilotStats<S>,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match app.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            app.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::Unset { key } => {
            if app.config_unset(&key).await? {
                println!("Removed {key}.");
            } else {
                println!("{key} is not set");
            }
        }
        ConfigAction::List => {
            let items = app.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn handle_cache<S: SnapshotSource>(
    app: &CopilotStats<S>,
    action: CacheAction,
) -> anyhow::Result<()> {
    match action {
        CacheAction::Stats => print_cache_stats(&app.cache_stats().await?, app.config().cache_ttl_minutes),
        CacheAction::Clear { scope } => {
            let scope = scope
                .as_deref()
                .map(copilotstats::parse_scope)
                .transpose()?;
            let removed = app.cache_clear(scope.as_ref()).await?;
            println!("Removed {removed} cached snapshot(s).");
        }
        CacheAction::Prune => {
            let removed = app.cache_prune().await?;
            println!("Pruned {removed} expired snapshot(s).");
        }
    }
    Ok(())
}

async fn print_status<S: SnapshotSource>(
    app: &CopilotStats<S>,
    db_flag: Option<&str>,
) -> anyhow::Result<()> {
    let path = match db_flag {
        Some(p) => p.to_string(),
        None => copilotstats::Database::default_path()?.display().to_string(),
    };
    let config = app.config();
    let org = app.default_org().await?;

    println!("Status");
    println!("  Database:      {path}");
    println!("  Organization:  {}", org.as_deref().unwrap_or("not set"));
    println!("  Time/accept:   {}s", config.seconds_per_suggestion);
    println!("  History limit: {} days", config.max_historical_days);
    println!(
        "  Period length: {} days (requested {})",
        config.effective_period_days(),
        config.default_period_days
    );
    print_cache_stats(&app.cache_stats().await?, config.cache_ttl_minutes);
    Ok(())
}

fn print_window(window: Option<&DateWindow>) -> String {
    window.map_or_else(|| "unknown window".to_string(), |w| w.to_string())
}

fn print_snapshot(scope: &Scope, s: &MetricSnapshot, breakdown: bool) {
    println!("Metrics: {scope} ({})", print_window(s.covered_window.as_ref()));
    println!("  Completions:  {}", s.completions_count);
    println!("  Suggestions:  {}", s.suggestion_count);
    println!(
        "  Acceptances:  {} ({:.1}%)",
        s.acceptance_count, s.acceptance_percentage
    );
    println!("  Active users: {}", s.active_users);
    println!("  Per user:");
    println!("    Completions: {:.1}", s.avg_completions_per_user);
    println!("    Suggestions: {:.1}", s.avg_suggestions_per_user);
    println!("    Acceptance:  {:.1}%", s.avg_acceptance_percentage);
    if let Some(hours) = s.estimated_time_saved {
        println!("  Time saved:   {hours:.2} hours");
    }
    if !breakdown {
        return;
    }
    if !s.repository_breakdown.is_empty() {
        println!("  Repositories:");
        for repo in &s.repository_breakdown {
            println!(
                "    {:<30} {:>8} completions  {:>5.1}% accepted",
                repo.name, repo.metrics.completions_count, repo.metrics.acceptance_percentage
            );
        }
    }
    if !s.language_breakdown.is_empty() {
        println!("  Languages:");
        for (label, lang) in &s.language_breakdown {
            println!(
                "    {:<10} {:>8} completions  {:>5.1}% accepted",
                label, lang.completions_count, lang.acceptance_percentage
            );
        }
    }
}

fn format_value(metric: MetricSelector, value: f64) -> String {
    match metric {
        MetricSelector::AcceptanceRate => format!("{value:.1}%"),
        MetricSelector::TimeSaved => format!("{value:.2}h"),
        m if m.is_rate() => format!("{value:.1}"),
        _ => format!("{value:.0}"),
    }
}

fn print_trend(scope: &Scope, metric: MetricSelector, trend: &Trend) {
    println!(
        "Trend: {metric} for {scope} ({} periods of {} days)",
        trend.points.len(),
        trend.period_days
    );
    for point in &trend.points {
        println!("  {}  {}", point.date, format_value(metric, point.value));
    }
    println!("  Change: {:+.1}%", trend.change_percentage);
}

fn print_comparison(metric: MetricSelector, result: &TeamComparison) {
    let comparison = &result.comparison;
    let highest = comparison.highest();
    println!("Compare: {metric}");
    for label in &comparison.entity_labels {
        match comparison.values.get(label) {
            Some(value) => {
                let marker = if highest == Some(label.as_str()) { " *" } else { "" };
                println!("  {label:<24} {}{marker}", format_value(metric, *value));
            }
            None => println!("  {label:<24} n/a"),
        }
    }
    print_batch_report(&result.report);
}

fn print_batch_report(report: &BatchReport) {
    if report.failures.is_empty() {
        return;
    }
    println!("  Status:  {:?}", report.status);
    println!(
        "  Fetched: {} teams, failed: {}",
        report.teams_fetched, report.teams_failed
    );
    for failure in &report.failures {
        println!("  Error:   {}: {}", failure.team, failure.message);
    }
}

fn print_cache_stats(stats: &CacheStats, ttl_minutes: u32) {
    println!("  Cache:");
    println!("    Entries: {} ({} fresh, TTL {ttl_minutes}m)", stats.entries, stats.fresh_entries);
    println!("    Scopes:  {}", stats.scopes);
    if let Some(newest) = &stats.newest {
        println!("    Newest:  {newest}");
    }
    if let Some(oldest) = &stats.oldest {
        println!("    Oldest:  {oldest}");
    }
}
