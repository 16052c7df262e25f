//! Append-only action log.
//!
//! The system never updates an entry after insert; the only mutable fields
//! are the operator's `notes` and `user_date_override`, round-tripped from
//! the workbook's Actions sheet by entry id.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::error::{AuditError, Result};
use crate::model::ActionLogEntry;
use crate::types::{ActionStatus, ChangeType, FindingType, RunStatus};

/// An entry about to be appended; `action_date` is stamped on insert.
#[derive(Debug, Clone)]
pub struct NewAction {
    pub initial_run_id: i64,
    pub sync_run_id: Option<i64>,
    pub entity_key: String,
    pub finding_type: FindingType,
    pub change_type: ChangeType,
    pub status: ActionStatus,
    pub description: String,
}

fn entry_from_row(row: &SqliteRow) -> Result<ActionLogEntry> {
    let type_raw: String = row.get("finding_type");
    let change_raw: String = row.get("change_type");
    let status_raw: String = row.get("status");
    Ok(ActionLogEntry {
        id: row.get("id"),
        initial_run_id: row.get("initial_run_id"),
        sync_run_id: row.get("sync_run_id"),
        entity_key: row.get("entity_key"),
        finding_type: FindingType::parse(&type_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown finding type '{}'", type_raw),
        })?,
        change_type: ChangeType::parse(&change_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown change type '{}'", change_raw),
        })?,
        status: ActionStatus::parse(&status_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown action status '{}'", status_raw),
        })?,
        action_date: row.get("action_date"),
        user_date_override: row.get("user_date_override"),
        description: row.get("description"),
        notes: row.get("notes"),
    })
}

/// Append an entry unless the dedup key
/// `(initial_run_id, entity_key, change_type, sync_run_id)` already exists.
/// Returns `false` on duplicate; never raises for one.
pub async fn append(conn: &mut SqliteConnection, action: &NewAction) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO action_log (initial_run_id, sync_run_id, entity_key, finding_type,
                                change_type, status, action_date, description)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(action.initial_run_id)
    .bind(action.sync_run_id)
    .bind(&action.entity_key)
    .bind(action.finding_type.as_str())
    .bind(action.change_type.as_str())
    .bind(action.status.as_str())
    .bind(Utc::now())
    .bind(&action.description)
    .execute(&mut *conn)
    .await?;

    let inserted = result.rows_affected() > 0;
    if inserted {
        debug!(
            entity_key = %action.entity_key,
            change_type = %action.change_type,
            "action recorded"
        );
    }
    Ok(inserted)
}

/// Apply operator edits from the Actions sheet, matched by id. The
/// system-stamped `action_date` is never touched. Rejected once the entry's
/// cycle is finalized.
pub async fn apply_operator_edit(
    conn: &mut SqliteConnection,
    entry_id: i64,
    notes: Option<&str>,
    user_date_override: Option<NaiveDate>,
) -> Result<bool> {
    let entry = match get(conn, entry_id).await? {
        Some(entry) => entry,
        None => return Ok(false),
    };

    let run_status: String =
        sqlx::query("SELECT status FROM audit_runs WHERE id = ?")
            .bind(entry.initial_run_id)
            .fetch_one(&mut *conn)
            .await?
            .get("status");
    if RunStatus::parse(&run_status) == Some(RunStatus::Finalized) {
        return Err(AuditError::FinalizedRun {
            run_id: entry.initial_run_id,
        });
    }

    sqlx::query("UPDATE action_log SET notes = ?, user_date_override = ? WHERE id = ?")
        .bind(notes)
        .bind(user_date_override)
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

pub async fn get(conn: &mut SqliteConnection, entry_id: i64) -> Result<Option<ActionLogEntry>> {
    let row = sqlx::query("SELECT * FROM action_log WHERE id = ?")
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| entry_from_row(&r)).transpose()
}

/// Entries of one cycle in insertion order (log id order matches the
/// processing order of the sync that wrote them).
pub async fn for_cycle(
    conn: &mut SqliteConnection,
    initial_run_id: i64,
) -> Result<Vec<ActionLogEntry>> {
    let rows = sqlx::query("SELECT * FROM action_log WHERE initial_run_id = ? ORDER BY id ASC")
        .bind(initial_run_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(entry_from_row).collect()
}

pub async fn count_for_cycle(
    conn: &mut SqliteConnection,
    initial_run_id: i64,
    change_type: ChangeType,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM action_log WHERE initial_run_id = ? AND change_type = ?",
    )
    .bind(initial_run_id)
    .bind(change_type.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

pub async fn count_for_sync(
    conn: &mut SqliteConnection,
    sync_run_id: i64,
    change_type: ChangeType,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM action_log WHERE sync_run_id = ? AND change_type = ?",
    )
    .bind(sync_run_id)
    .bind(change_type.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{runs, Store};
    use crate::types::RunType;

    fn action(initial: i64, sync: Option<i64>, key: &str, change: ChangeType) -> NewAction {
        NewAction {
            initial_run_id: initial,
            sync_run_id: sync,
            entity_key: key.into(),
            finding_type: FindingType::Config,
            change_type: change,
            status: ActionStatus::Open,
            description: "test".into(),
        }
    }

    async fn baseline(conn: &mut SqliteConnection) -> i64 {
        runs::begin_run(
            conn,
            "Contoso",
            chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            RunType::Baseline,
            None,
            "h",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn append_dedups_on_key() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let run = baseline(&mut conn).await;

        let entry = action(run, Some(99), "config|srv1|default|xp_cmdshell", ChangeType::Fixed);
        assert!(append(&mut conn, &entry).await.unwrap());
        assert!(!append(&mut conn, &entry).await.unwrap());

        // Same key in a different sync is a new entry.
        let later = action(run, Some(100), "config|srv1|default|xp_cmdshell", ChangeType::Fixed);
        assert!(append(&mut conn, &later).await.unwrap());
    }

    #[tokio::test]
    async fn baseline_entries_dedup_with_null_sync() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let run = baseline(&mut conn).await;

        let entry = action(run, None, "login|srv1|default|app_reader", ChangeType::NewIssue);
        assert!(append(&mut conn, &entry).await.unwrap());
        assert!(!append(&mut conn, &entry).await.unwrap());
    }

    #[tokio::test]
    async fn operator_edit_preserves_action_date() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let run = baseline(&mut conn).await;

        append(&mut conn, &action(run, None, "k", ChangeType::NewIssue))
            .await
            .unwrap();
        let before = for_cycle(&mut conn, run).await.unwrap().remove(0);

        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(apply_operator_edit(&mut conn, before.id, Some("ticket ref"), Some(date))
            .await
            .unwrap());

        let after = get(&mut conn, before.id).await.unwrap().unwrap();
        assert_eq!(after.action_date, before.action_date);
        assert_eq!(after.user_date_override, Some(date));
        assert_eq!(after.notes.as_deref(), Some("ticket ref"));
        assert_eq!(after.display_date(), date);
    }

    #[tokio::test]
    async fn edits_rejected_after_finalize() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let run = baseline(&mut conn).await;
        append(&mut conn, &action(run, None, "k", ChangeType::NewIssue))
            .await
            .unwrap();
        let entry = for_cycle(&mut conn, run).await.unwrap().remove(0);

        runs::complete_run(&mut conn, run).await.unwrap();
        runs::finalize_run(&mut conn, run, "hash").await.unwrap();

        let result = apply_operator_edit(&mut conn, entry.id, Some("late"), None).await;
        assert!(matches!(result, Err(AuditError::FinalizedRun { .. })));
    }
}
