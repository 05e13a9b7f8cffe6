use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn unset_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(n > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Snapshot cache ─────────────────────────────────────────────────

fn ttl_modifier(ttl_minutes: u32) -> String {
    format!("-{ttl_minutes} minutes")
}

/// Cached snapshot JSON for `(scope_key, window_key)` no older than
/// `ttl_minutes`.
pub fn get_cached_snapshot(
    conn: &Connection,
    scope_key: &str,
    window_key: &str,
    ttl_minutes: u32,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT snapshot_json FROM snapshot_cache
         WHERE scope_key = ?1 AND window_key = ?2
           AND cached_at >= datetime('now', ?3)",
        params![scope_key, window_key, ttl_modifier(ttl_minutes)],
        |row| row.get(0),
    )
    .optional()
}

pub fn put_cached_snapshot(
    conn: &Connection,
    scope_key: &str,
    window_key: &str,
    snapshot_json: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO snapshot_cache (scope_key, window_key, snapshot_json, cached_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![scope_key, window_key, snapshot_json],
    )?;
    Ok(())
}

/// Delete cached snapshots, for one scope or all of them. Returns rows removed.
pub fn clear_cache(conn: &Connection, scope_key: Option<&str>) -> Result<usize, rusqlite::Error> {
    match scope_key {
        Some(key) => conn.execute("DELETE FROM snapshot_cache WHERE scope_key = ?1", params![key]),
        None => conn.execute("DELETE FROM snapshot_cache", []),
    }
}

/// Delete entries older than `ttl_minutes`. Returns rows removed.
pub fn prune_cache(conn: &Connection, ttl_minutes: u32) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM snapshot_cache WHERE cached_at < datetime('now', ?1)",
        params![ttl_modifier(ttl_minutes)],
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub fresh_entries: u64,
    pub scopes: u64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

pub fn cache_stats(conn: &Connection, ttl_minutes: u32) -> Result<CacheStats, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN cached_at >= datetime('now', ?1) THEN 1 ELSE 0 END), 0),
                COUNT(DISTINCT scope_key),
                MIN(cached_at),
                MAX(cached_at)
         FROM snapshot_cache",
        params![ttl_modifier(ttl_minutes)],
        |row| {
            Ok(CacheStats {
                entries: row.get::<_, i64>(0)?.max(0) as u64,
                fresh_entries: row.get::<_, i64>(1)?.max(0) as u64,
                scopes: row.get::<_, i64>(2)?.max(0) as u64,
                oldest: row.get(3)?,
                newest: row.get(4)?,
            })
        },
    )
}
