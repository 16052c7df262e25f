//! Audit run lifecycle records.

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use crate::error::{AuditError, Result};
use crate::model::{AuditRun, ScanOutcome};
use crate::types::{RunStatus, RunType};

fn run_from_row(row: &SqliteRow) -> Result<AuditRun> {
    let status_raw: String = row.get("status");
    let type_raw: String = row.get("run_type");
    Ok(AuditRun {
        id: row.get("id"),
        organization: row.get("organization"),
        audit_date: row.get("audit_date"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        status: RunStatus::parse(&status_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown run status '{}'", status_raw),
        })?,
        run_type: RunType::parse(&type_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown run type '{}'", type_raw),
        })?,
        parent_run_id: row.get("parent_run_id"),
        config_hash: row.get("config_hash"),
        report_stale: row.get::<i64, _>("report_stale") != 0,
        snapshot_hash: row.get("snapshot_hash"),
    })
}

/// Start a run. Fails when another run for the same organization and audit
/// date is still `running`.
pub async fn begin_run(
    conn: &mut SqliteConnection,
    organization: &str,
    audit_date: NaiveDate,
    run_type: RunType,
    parent_run_id: Option<i64>,
    config_hash: &str,
) -> Result<i64> {
    let conflict = sqlx::query(
        "SELECT id FROM audit_runs WHERE organization = ? AND audit_date = ? AND status = 'running'",
    )
    .bind(organization)
    .bind(audit_date)
    .fetch_optional(&mut *conn)
    .await?;
    if conflict.is_some() {
        return Err(AuditError::RunInProgress {
            organization: organization.to_string(),
            audit_date: audit_date.to_string(),
        });
    }

    let result = sqlx::query(
        r#"
        INSERT INTO audit_runs (organization, audit_date, started_at, status, run_type, parent_run_id, config_hash)
        VALUES (?, ?, ?, 'running', ?, ?, ?)
        "#,
    )
    .bind(organization)
    .bind(audit_date)
    .bind(Utc::now())
    .bind(run_type.as_str())
    .bind(parent_run_id)
    .bind(config_hash)
    .execute(&mut *conn)
    .await?;

    let run_id = result.last_insert_rowid();
    info!(run_id, %run_type, organization, "run started");
    Ok(run_id)
}

pub async fn get_run(conn: &mut SqliteConnection, run_id: i64) -> Result<AuditRun> {
    let row = sqlx::query("SELECT * FROM audit_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AuditError::RunNotFound { run_id })?;
    run_from_row(&row)
}

/// Raise [`AuditError::FinalizedRun`] when the run can no longer be mutated.
pub async fn ensure_mutable(conn: &mut SqliteConnection, run_id: i64) -> Result<()> {
    let run = get_run(conn, run_id).await?;
    if run.status == RunStatus::Finalized {
        return Err(AuditError::FinalizedRun { run_id });
    }
    Ok(())
}

pub async fn complete_run(conn: &mut SqliteConnection, run_id: i64) -> Result<()> {
    ensure_mutable(conn, run_id).await?;
    sqlx::query("UPDATE audit_runs SET status = 'completed', completed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(run_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fail_run(conn: &mut SqliteConnection, run_id: i64) -> Result<()> {
    sqlx::query("UPDATE audit_runs SET status = 'failed', completed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(run_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark a run finalized, recording the workbook snapshot hash.
///
/// At most one finalized run may exist per organization and audit date.
pub async fn finalize_run(
    conn: &mut SqliteConnection,
    run_id: i64,
    snapshot_hash: &str,
) -> Result<()> {
    let run = get_run(conn, run_id).await?;
    if run.status == RunStatus::Finalized {
        return Err(AuditError::FinalizedRun { run_id });
    }
    let existing = sqlx::query(
        "SELECT id FROM audit_runs WHERE organization = ? AND audit_date = ? AND status = 'finalized' AND id != ?",
    )
    .bind(&run.organization)
    .bind(run.audit_date)
    .bind(run_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(row) = existing {
        return Err(AuditError::FinalizedRun {
            run_id: row.get("id"),
        });
    }
    sqlx::query(
        "UPDATE audit_runs SET status = 'finalized', completed_at = ?, snapshot_hash = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(snapshot_hash)
    .bind(run_id)
    .execute(&mut *conn)
    .await?;
    info!(run_id, "run finalized");
    Ok(())
}

pub async fn mark_report_stale(
    conn: &mut SqliteConnection,
    run_id: i64,
    stale: bool,
) -> Result<()> {
    sqlx::query("UPDATE audit_runs SET report_stale = ? WHERE id = ?")
        .bind(stale as i64)
        .bind(run_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn save_scan_outcomes(
    conn: &mut SqliteConnection,
    run_id: i64,
    outcomes: &[ScanOutcome],
) -> Result<()> {
    sqlx::query("UPDATE audit_runs SET scan_outcomes = ? WHERE id = ?")
        .bind(serde_json::to_string(outcomes)?)
        .bind(run_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn scan_outcomes(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<Vec<ScanOutcome>> {
    let row = sqlx::query("SELECT scan_outcomes FROM audit_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AuditError::RunNotFound { run_id })?;
    let raw: Option<String> = row.get("scan_outcomes");
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(vec![]),
    }
}

/// Most recent baseline for the organization, finalized or not.
pub async fn latest_baseline(
    conn: &mut SqliteConnection,
    organization: &str,
) -> Result<Option<AuditRun>> {
    let row = sqlx::query(
        "SELECT * FROM audit_runs WHERE organization = ? AND run_type = 'baseline' ORDER BY id DESC LIMIT 1",
    )
    .bind(organization)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(|r| run_from_row(&r)).transpose()
}

/// Completed runs of the baseline's chain (baseline itself plus its syncs),
/// ascending by id.
pub async fn chain_runs(
    conn: &mut SqliteConnection,
    baseline_id: i64,
) -> Result<Vec<AuditRun>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM audit_runs
        WHERE (id = ? OR parent_run_id = ?) AND status IN ('completed', 'finalized')
        ORDER BY id ASC
        "#,
    )
    .bind(baseline_id)
    .bind(baseline_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(run_from_row).collect()
}

pub async fn list_runs(
    conn: &mut SqliteConnection,
    organization: &str,
) -> Result<Vec<AuditRun>> {
    let rows = sqlx::query("SELECT * FROM audit_runs WHERE organization = ? ORDER BY id ASC")
        .bind(organization)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(run_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn begin_rejects_concurrent_run() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let first = begin_run(&mut conn, "Contoso", date, RunType::Baseline, None, "h1")
            .await
            .unwrap();
        let second = begin_run(&mut conn, "Contoso", date, RunType::Sync, Some(first), "h1").await;
        assert!(matches!(second, Err(AuditError::RunInProgress { .. })));

        complete_run(&mut conn, first).await.unwrap();
        let third = begin_run(&mut conn, "Contoso", date, RunType::Sync, Some(first), "h1").await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn finalize_guards_mutation() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let run = begin_run(&mut conn, "Contoso", date, RunType::Baseline, None, "h1")
            .await
            .unwrap();
        complete_run(&mut conn, run).await.unwrap();
        finalize_run(&mut conn, run, "abc123").await.unwrap();

        assert!(matches!(
            ensure_mutable(&mut conn, run).await,
            Err(AuditError::FinalizedRun { .. })
        ));
        assert!(matches!(
            finalize_run(&mut conn, run, "again").await,
            Err(AuditError::FinalizedRun { .. })
        ));
        let loaded = get_run(&mut conn, run).await.unwrap();
        assert_eq!(loaded.snapshot_hash.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn chain_runs_orders_ascending() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let baseline = begin_run(&mut conn, "Contoso", date, RunType::Baseline, None, "h")
            .await
            .unwrap();
        complete_run(&mut conn, baseline).await.unwrap();
        let s1 = begin_run(&mut conn, "Contoso", date, RunType::Sync, Some(baseline), "h")
            .await
            .unwrap();
        complete_run(&mut conn, s1).await.unwrap();

        let chain = chain_runs(&mut conn, baseline).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, baseline);
        assert_eq!(chain[1].id, s1);
    }
}
