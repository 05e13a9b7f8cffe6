use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::date_util::parse_date_prefix;
use crate::metrics::types::{
    per_user, percentage, BreakdownMetrics, DateWindow, MetricSnapshot, RepositoryMetrics,
};

/// Envelope keys unwrapped (once) before field lookup.
const WRAPPER_KEYS: &[&str] = &["data", "metrics"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Field {
    Completions,
    Suggestions,
    Acceptances,
    AcceptancePercentage,
    ActiveUsers,
    AvgCompletionsPerUser,
    AvgSuggestionsPerUser,
    AvgAcceptancePercentage,
}

type FieldTable = &'static [(Field, &'static [&'static str])];

const SNAPSHOT_FIELDS: FieldTable = &[
    (
        Field::Completions,
        &[
            "total_completions_count",
            "completions_count",
            "totalCompletionsCount",
            "completionsCount",
        ],
    ),
    (
        Field::Suggestions,
        &[
            "total_suggestions_count",
            "total_suggestion_count",
            "suggestions_count",
            "suggestion_count",
            "totalSuggestionsCount",
            "totalSuggestionCount",
            "suggestionsCount",
            "suggestionCount",
        ],
    ),
    (
        Field::Acceptances,
        &[
            "total_acceptances_count",
            "total_acceptance_count",
            "acceptances_count",
            "acceptance_count",
            "totalAcceptancesCount",
            "totalAcceptanceCount",
            "acceptancesCount",
            "acceptanceCount",
        ],
    ),
    (
        Field::AcceptancePercentage,
        &[
            "acceptance_percentage",
            "acceptance_rate",
            "acceptancePercentage",
            "acceptanceRate",
        ],
    ),
    (
        Field::ActiveUsers,
        &[
            "total_active_users",
            "active_users",
            "totalActiveUsers",
            "activeUsers",
        ],
    ),
    (
        Field::AvgCompletionsPerUser,
        &["avg_completions_per_user", "avgCompletionsPerUser"],
    ),
    (
        Field::AvgSuggestionsPerUser,
        &["avg_suggestions_per_user", "avgSuggestionsPerUser"],
    ),
    (
        Field::AvgAcceptancePercentage,
        &["avg_acceptance_percentage", "avgAcceptancePercentage"],
    ),
];

const BREAKDOWN_FIELDS: FieldTable = &[
    (
        Field::Completions,
        &[
            "completions_count",
            "total_completions_count",
            "completionsCount",
            "totalCompletionsCount",
        ],
    ),
    (
        Field::Suggestions,
        &[
            "suggestions_count",
            "suggestion_count",
            "total_suggestions_count",
            "suggestionsCount",
            "suggestionCount",
            "totalSuggestionsCount",
        ],
    ),
    (
        Field::Acceptances,
        &[
            "acceptances_count",
            "acceptance_count",
            "total_acceptances_count",
            "acceptancesCount",
            "acceptanceCount",
            "totalAcceptancesCount",
        ],
    ),
    (
        Field::AcceptancePercentage,
        &[
            "acceptance_percentage",
            "acceptance_rate",
            "acceptancePercentage",
            "acceptanceRate",
        ],
    ),
    (
        Field::ActiveUsers,
        &["active_users", "total_active_users", "activeUsers", "totalActiveUsers"],
    ),
];

const REPOSITORY_KEYS: &[&str] = &[
    "repository_metrics",
    "repositories",
    "repositoryMetrics",
    "repositoryBreakdown",
];
const REPOSITORY_ID_KEYS: &[&str] = &["repository_id", "id", "repositoryId"];
const REPOSITORY_NAME_KEYS: &[&str] = &["repository_name", "full_name", "name", "repositoryName", "fullName"];

const LANGUAGE_KEYS: &[&str] = &[
    "language_metrics",
    "breakdown",
    "language_breakdown",
    "languages",
    "languageMetrics",
    "languageBreakdown",
];
const LANGUAGE_LABEL_KEYS: &[&str] = &["file_extension", "extension", "language", "fileExtension"];

const WINDOW_OBJECT_KEYS: &[&str] = &["covered_window", "coveredWindow"];
const WINDOW_START_KEYS: &[&str] = &["start_date", "start", "since", "startDate"];
const WINDOW_END_KEYS: &[&str] = &["end_date", "end", "until", "endDate"];
/// Date of a single entry in a per-day payload.
const DAY_KEYS: &[&str] = &["date", "day"];

enum Source<'a> {
    Object(&'a Map<String, Value>),
    Days(&'a [Value]),
}

/// Normalize an arbitrary JSON payload into a canonical snapshot.
///
/// The upstream provider does not guarantee field names or nesting, so every
/// canonical field is looked up through an ordered list of candidate keys.
/// Snake-style spellings come first, camel-style second. The first candidate
/// present with a non-null value wins, even when that value turns out to be
/// unusable; unusable values become zero instead of falling through to a
/// lower-priority spelling.
///
/// A top-level array is read as one entry per day: counts are summed, active
/// users is the busiest day, rates are recomputed from the totals and the
/// covered window spans the earliest to the latest day.
///
/// Normalization never fails. The worst case is an all-zero snapshot.
pub fn normalize_snapshot(payload: &Value) -> MetricSnapshot {
    match effective_source(payload) {
        Some(Source::Object(source)) => normalize_object(source),
        Some(Source::Days(items)) => normalize_days(items),
        None => {
            log::debug!("Payload is neither an object nor an array; returning empty snapshot");
            MetricSnapshot::default()
        }
    }
}

fn normalize_object(source: &Map<String, Value>) -> MetricSnapshot {
    let values = resolve_fields(source, SNAPSHOT_FIELDS);
    let completions_count = count(values.get(&Field::Completions));
    let suggestion_count = count(values.get(&Field::Suggestions));
    let acceptance_count = count(values.get(&Field::Acceptances));
    let active_users = count(values.get(&Field::ActiveUsers));

    let acceptance_percentage = values
        .get(&Field::AcceptancePercentage)
        .map(|v| clamp_percentage(*v))
        .unwrap_or_else(|| percentage(acceptance_count, suggestion_count));

    MetricSnapshot {
        completions_count,
        suggestion_count,
        acceptance_count,
        acceptance_percentage,
        active_users,
        avg_completions_per_user: values
            .get(&Field::AvgCompletionsPerUser)
            .copied()
            .unwrap_or_else(|| per_user(completions_count, active_users)),
        avg_suggestions_per_user: values
            .get(&Field::AvgSuggestionsPerUser)
            .copied()
            .unwrap_or_else(|| per_user(suggestion_count, active_users)),
        avg_acceptance_percentage: values
            .get(&Field::AvgAcceptancePercentage)
            .map(|v| clamp_percentage(*v))
            .unwrap_or(acceptance_percentage),
        repository_breakdown: repositories(source),
        language_breakdown: languages(source),
        covered_window: covered_window(source),
        estimated_time_saved: None,
    }
}

fn normalize_days(items: &[Value]) -> MetricSnapshot {
    let mut total = MetricSnapshot::default();
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            log::debug!("Skipping malformed day entry #{i}");
            continue;
        };
        let day = normalize_object(obj);
        let day_window = day.covered_window.or_else(|| day_of(obj));

        total.completions_count += day.completions_count;
        total.suggestion_count += day.suggestion_count;
        total.acceptance_count += day.acceptance_count;
        total.active_users = total.active_users.max(day.active_users);
        for repo in day.repository_breakdown {
            merge_repository(&mut total.repository_breakdown, repo);
        }
        for (label, metrics) in day.language_breakdown {
            merge_language(&mut total.language_breakdown, label, metrics);
        }
        total.covered_window = match (total.covered_window, day_window) {
            (Some(a), Some(b)) => Some(DateWindow {
                start: a.start.min(b.start),
                end: a.end.max(b.end),
            }),
            (a, b) => a.or(b),
        };
    }

    total.acceptance_percentage = percentage(total.acceptance_count, total.suggestion_count);
    total.avg_completions_per_user = per_user(total.completions_count, total.active_users);
    total.avg_suggestions_per_user = per_user(total.suggestion_count, total.active_users);
    total.avg_acceptance_percentage = total.acceptance_percentage;
    total
}

fn effective_source(payload: &Value) -> Option<Source<'_>> {
    let root = match payload {
        Value::Array(items) => return Some(Source::Days(items.as_slice())),
        Value::Object(root) => root,
        _ => return None,
    };
    for key in WRAPPER_KEYS {
        if let Some(Value::Object(inner)) = root.get(*key) {
            return Some(Source::Object(inner));
        }
    }
    Some(Source::Object(root))
}

/// First candidate key present with a non-null value.
fn probe<'a>(source: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| source.get(*k))
        .find(|v| !v.is_null())
}

fn resolve_fields(source: &Map<String, Value>, table: FieldTable) -> BTreeMap<Field, f64> {
    table
        .iter()
        .filter_map(|(field, keys)| probe(source, keys).map(|v| (*field, number(v))))
        .collect()
}

/// Numeric or numeric-string value; anything else, including NaN, infinities
/// and negatives, is zero.
fn number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches('%')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

fn count(value: Option<&f64>) -> u64 {
    value.map(|v| v.round() as u64).unwrap_or(0)
}

fn clamp_percentage(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

fn breakdown(source: &Map<String, Value>) -> BreakdownMetrics {
    let values = resolve_fields(source, BREAKDOWN_FIELDS);
    let suggestion_count = count(values.get(&Field::Suggestions));
    let acceptance_count = count(values.get(&Field::Acceptances));
    BreakdownMetrics {
        completions_count: count(values.get(&Field::Completions)),
        suggestion_count,
        acceptance_count,
        acceptance_percentage: values
            .get(&Field::AcceptancePercentage)
            .map(|v| clamp_percentage(*v))
            .unwrap_or_else(|| percentage(acceptance_count, suggestion_count)),
        active_users: count(values.get(&Field::ActiveUsers)),
    }
}

fn label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn repositories(source: &Map<String, Value>) -> Vec<RepositoryMetrics> {
    let Some(items) = probe(source, REPOSITORY_KEYS).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let repo = repository(item);
            if repo.is_none() {
                log::debug!("Skipping malformed repository entry #{i}");
            }
            repo
        })
        .collect()
}

fn repository(item: &Value) -> Option<RepositoryMetrics> {
    let obj = item.as_object()?;
    let id = probe(obj, REPOSITORY_ID_KEYS).and_then(label);
    let name = probe(obj, REPOSITORY_NAME_KEYS).and_then(label);
    let (id, name) = match (id, name) {
        (Some(id), Some(name)) => (id, name),
        (Some(id), None) => (id.clone(), id),
        (None, Some(name)) => (name.clone(), name),
        (None, None) => return None,
    };
    Some(RepositoryMetrics {
        id,
        name,
        metrics: breakdown(obj),
    })
}

fn languages(source: &Map<String, Value>) -> BTreeMap<String, BreakdownMetrics> {
    let mut out = BTreeMap::new();
    match probe(source, LANGUAGE_KEYS) {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let entry = item.as_object().and_then(|obj| {
                    probe(obj, LANGUAGE_LABEL_KEYS)
                        .and_then(label)
                        .map(|l| (l, breakdown(obj)))
                });
                match entry {
                    Some((label, metrics)) => merge_language(&mut out, label, metrics),
                    None => log::debug!("Skipping malformed language entry #{i}"),
                }
            }
        }
        Some(Value::Object(map)) => {
            for (key, item) in map {
                match item.as_object() {
                    Some(obj) if !key.trim().is_empty() => {
                        merge_language(&mut out, key.trim().to_string(), breakdown(obj));
                    }
                    _ => log::debug!("Skipping malformed language entry '{key}'"),
                }
            }
        }
        _ => {}
    }
    out
}

/// Repeated labels (one row per editor, say) are summed.
fn merge_language(
    out: &mut BTreeMap<String, BreakdownMetrics>,
    label: String,
    metrics: BreakdownMetrics,
) {
    match out.get_mut(&label) {
        Some(existing) => add_breakdown(existing, &metrics),
        None => {
            out.insert(label, metrics);
        }
    }
}

fn merge_repository(out: &mut Vec<RepositoryMetrics>, repo: RepositoryMetrics) {
    match out.iter_mut().find(|r| r.id == repo.id) {
        Some(existing) => add_breakdown(&mut existing.metrics, &repo.metrics),
        None => out.push(repo),
    }
}

fn add_breakdown(existing: &mut BreakdownMetrics, metrics: &BreakdownMetrics) {
    existing.completions_count += metrics.completions_count;
    existing.suggestion_count += metrics.suggestion_count;
    existing.acceptance_count += metrics.acceptance_count;
    existing.active_users = existing.active_users.max(metrics.active_users);
    existing.acceptance_percentage =
        percentage(existing.acceptance_count, existing.suggestion_count);
}

fn covered_window(source: &Map<String, Value>) -> Option<DateWindow> {
    if let Some(Value::Object(window)) = probe(source, WINDOW_OBJECT_KEYS) {
        if let Some(w) = window_from(window) {
            return Some(w);
        }
    }
    window_from(source)
}

fn day_of(obj: &Map<String, Value>) -> Option<DateWindow> {
    let day = probe(obj, DAY_KEYS)?.as_str().and_then(parse_date_prefix)?;
    Some(DateWindow { start: day, end: day })
}

fn window_from(obj: &Map<String, Value>) -> Option<DateWindow> {
    let start = probe(obj, WINDOW_START_KEYS)?.as_str().and_then(parse_date_prefix)?;
    let end = probe(obj, WINDOW_END_KEYS)?.as_str().and_then(parse_date_prefix)?;
    DateWindow::new(start, end).ok()
}
