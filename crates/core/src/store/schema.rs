//! Versioned, additive schema migrations.
//!
//! `schema_meta` holds a single integer. Each migration appends tables or
//! nullable columns only; columns are never dropped or renamed without a new
//! migration entry. Re-running is idempotent.

use sqlx::{Row, SqliteConnection};
use tracing::info;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization TEXT NOT NULL,
    audit_date TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    run_type TEXT NOT NULL,
    parent_run_id INTEGER REFERENCES audit_runs(id),
    config_hash TEXT NOT NULL,
    report_stale INTEGER NOT NULL DEFAULT 0,
    snapshot_hash TEXT,
    scan_outcomes TEXT
);

CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hostname TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER NOT NULL REFERENCES servers(id),
    instance_name TEXT NOT NULL,
    port INTEGER,
    UNIQUE(server_id, instance_name)
);

CREATE TABLE IF NOT EXISTS findings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES audit_runs(id),
    instance_id INTEGER NOT NULL REFERENCES instances(id),
    finding_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    row_uuid TEXT,
    status TEXT NOT NULL,
    risk TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    recommendation TEXT NOT NULL DEFAULT '',
    details TEXT NOT NULL DEFAULT '{}',
    has_exception INTEGER NOT NULL DEFAULT 0,
    exception_text TEXT NOT NULL DEFAULT '',
    UNIQUE(run_id, finding_type, entity_key)
);

CREATE INDEX IF NOT EXISTS idx_findings_run_key ON findings (run_id, entity_key);
CREATE INDEX IF NOT EXISTS idx_findings_key ON findings (entity_key);
CREATE INDEX IF NOT EXISTS idx_findings_type_key ON findings (finding_type, entity_key);

CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    row_uuid TEXT UNIQUE,
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    purpose TEXT NOT NULL DEFAULT '',
    justification TEXT NOT NULL DEFAULT '',
    review_status TEXT NOT NULL DEFAULT '',
    last_reviewed TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    modified_by TEXT NOT NULL DEFAULT '',
    UNIQUE(entity_type, entity_key)
);

CREATE TABLE IF NOT EXISTS action_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    initial_run_id INTEGER NOT NULL REFERENCES audit_runs(id),
    sync_run_id INTEGER,
    entity_key TEXT NOT NULL,
    finding_type TEXT NOT NULL,
    change_type TEXT NOT NULL,
    status TEXT NOT NULL,
    action_date TEXT NOT NULL,
    user_date_override TEXT,
    description TEXT NOT NULL DEFAULT '',
    notes TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_action_dedup
    ON action_log (initial_run_id, entity_key, change_type, COALESCE(sync_run_id, 0));
CREATE INDEX IF NOT EXISTS idx_action_sync ON action_log (sync_run_id);
"#;

pub async fn current_version(conn: &mut SqliteConnection) -> Result<i64> {
    let exists = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_meta'",
    )
    .fetch_optional(&mut *conn)
    .await?;
    if exists.is_none() {
        return Ok(0);
    }
    let row = sqlx::query("SELECT version FROM schema_meta LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get::<i64, _>("version")).unwrap_or(0))
}

pub async fn migrate(conn: &mut SqliteConnection) -> Result<()> {
    let mut version = current_version(conn).await?;
    if version < 1 {
        apply_batch(conn, MIGRATION_V1).await?;
        set_version(conn, 1).await?;
        version = 1;
        info!(version, "schema migrated");
    }
    Ok(())
}

async fn apply_batch(conn: &mut SqliteConnection, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn set_version(conn: &mut SqliteConnection, version: i64) -> Result<()> {
    sqlx::query("DELETE FROM schema_meta")
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO schema_meta (version) VALUES (?)")
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        migrate(&mut conn).await.unwrap();
        migrate(&mut conn).await.unwrap();
        assert_eq!(current_version(&mut conn).await.unwrap(), SCHEMA_VERSION);
    }
}
