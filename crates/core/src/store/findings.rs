//! Finding rows: one check outcome per entity per run.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{AuditError, Result};
use crate::model::{Finding, FindingRow};
use crate::types::{FindingStatus, FindingType, Risk};

/// A finding about to be persisted; the store assigns the row id.
#[derive(Debug, Clone)]
pub struct NewFinding {
    pub run_id: i64,
    pub instance_id: i64,
    pub finding_type: FindingType,
    pub entity_key: String,
    pub row_uuid: Option<Uuid>,
    pub status: FindingStatus,
    pub risk: Risk,
    pub description: String,
    pub recommendation: String,
    pub details: serde_json::Value,
}

fn finding_from_row(row: &SqliteRow) -> Result<Finding> {
    let type_raw: String = row.get("finding_type");
    let status_raw: String = row.get("status");
    let risk_raw: String = row.get("risk");
    let uuid_raw: Option<String> = row.get("row_uuid");
    let details_raw: String = row.get("details");
    Ok(Finding {
        id: row.get("id"),
        run_id: row.get("run_id"),
        instance_id: row.get("instance_id"),
        finding_type: FindingType::parse(&type_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown finding type '{}'", type_raw),
        })?,
        entity_key: row.get("entity_key"),
        row_uuid: uuid_raw.and_then(|s| Uuid::parse_str(&s).ok()),
        status: FindingStatus::parse(&status_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown finding status '{}'", status_raw),
        })?,
        risk: Risk::parse(&risk_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown risk '{}'", risk_raw),
        })?,
        description: row.get("description"),
        recommendation: row.get("recommendation"),
        details: serde_json::from_str(&details_raw).unwrap_or(serde_json::Value::Null),
        has_exception: row.get::<i64, _>("has_exception") != 0,
        exception_text: row.get("exception_text"),
    })
}

fn finding_row_from_row(row: &SqliteRow) -> Result<FindingRow> {
    Ok(FindingRow {
        finding: finding_from_row(row)?,
        server: row.get("server"),
        instance: row.get("instance"),
    })
}

/// Insert one finding. A second finding with the same
/// `(run_id, finding_type, entity_key)` indicates a collector bug and is
/// fatal to the sync.
pub async fn save_finding(conn: &mut SqliteConnection, finding: &NewFinding) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO findings (run_id, instance_id, finding_type, entity_key, row_uuid,
                              status, risk, description, recommendation, details)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(finding.run_id)
    .bind(finding.instance_id)
    .bind(finding.finding_type.as_str())
    .bind(&finding.entity_key)
    .bind(finding.row_uuid.map(|u| u.to_string()))
    .bind(finding.status.as_str())
    .bind(finding.risk.as_str())
    .bind(&finding.description)
    .bind(&finding.recommendation)
    .bind(serde_json::to_string(&finding.details)?)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(AuditError::CollectorDuplicate {
                run_id: finding.run_id,
                finding_type: finding.finding_type,
                entity_key: finding.entity_key.clone(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

const SELECT_JOINED: &str = r#"
    SELECT f.*, s.hostname AS server, i.instance_name AS instance
    FROM findings f
    JOIN instances i ON i.id = f.instance_id
    JOIN servers s ON s.id = i.server_id
"#;

/// All findings of one run in deterministic order.
pub async fn findings_for_run(
    conn: &mut SqliteConnection,
    run_id: i64,
    finding_type: Option<FindingType>,
) -> Result<Vec<FindingRow>> {
    let sql = match finding_type {
        Some(_) => format!(
            "{} WHERE f.run_id = ? AND f.finding_type = ? ORDER BY f.instance_id, f.finding_type, f.entity_key",
            SELECT_JOINED
        ),
        None => format!(
            "{} WHERE f.run_id = ? ORDER BY f.instance_id, f.finding_type, f.entity_key",
            SELECT_JOINED
        ),
    };
    let mut query = sqlx::query(&sql).bind(run_id);
    if let Some(ft) = finding_type {
        query = query.bind(ft.as_str());
    }
    let rows = query.fetch_all(&mut *conn).await?;
    rows.iter().map(finding_row_from_row).collect()
}

/// Latest known finding per entity across the given prior runs. Feeds the
/// diff engine with last-known state so an outage in the run between does
/// not erase history.
pub async fn latest_findings_across(
    conn: &mut SqliteConnection,
    run_ids: &[i64],
) -> Result<Vec<FindingRow>> {
    if run_ids.is_empty() {
        return Ok(vec![]);
    }
    let id_list = run_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        {} JOIN (
            SELECT finding_type, entity_key, MAX(run_id) AS run_id
            FROM findings WHERE run_id IN ({})
            GROUP BY finding_type, entity_key
        ) latest
        ON latest.run_id = f.run_id
        AND latest.finding_type = f.finding_type
        AND latest.entity_key = f.entity_key
        ORDER BY f.instance_id, f.finding_type, f.entity_key
        "#,
        SELECT_JOINED, id_list
    );
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter().map(finding_row_from_row).collect()
}

/// Most recent row UUID recorded for an entity in a prior run, used both for
/// UUID continuity across runs and for the resurrection window. `since`
/// bounds how old the prior run may be; `None` accepts any age.
pub async fn recent_uuid_for_key(
    conn: &mut SqliteConnection,
    finding_type: FindingType,
    entity_key: &str,
    since: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Option<Uuid>> {
    let row = sqlx::query(
        r#"
        SELECT f.row_uuid FROM findings f
        JOIN audit_runs r ON r.id = f.run_id
        WHERE f.finding_type = ? AND f.entity_key = ? AND f.row_uuid IS NOT NULL
          AND (? IS NULL OR r.started_at >= ?)
        ORDER BY f.run_id DESC LIMIT 1
        "#,
    )
    .bind(finding_type.as_str())
    .bind(entity_key)
    .bind(since)
    .bind(since)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row
        .and_then(|r| r.get::<Option<String>, _>("row_uuid"))
        .and_then(|s| Uuid::parse_str(&s).ok()))
}

/// Freeze the documented-exception state onto the current run's finding so
/// the next sync can diff exception transitions.
pub async fn update_exception_state(
    conn: &mut SqliteConnection,
    run_id: i64,
    finding_type: FindingType,
    entity_key: &str,
    has_exception: bool,
    exception_text: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE findings SET has_exception = ?, exception_text = ?
        WHERE run_id = ? AND finding_type = ? AND entity_key = ?
        "#,
    )
    .bind(has_exception as i64)
    .bind(exception_text)
    .bind(run_id)
    .bind(finding_type.as_str())
    .bind(entity_key)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Exception state frozen on a prior run's findings, keyed by
/// `(finding_type, entity_key)`.
pub async fn exception_states_for_run(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<std::collections::HashMap<(FindingType, String), (bool, String)>> {
    let rows = sqlx::query(
        "SELECT finding_type, entity_key, has_exception, exception_text FROM findings WHERE run_id = ?",
    )
    .bind(run_id)
    .fetch_all(&mut *conn)
    .await?;
    let mut map = std::collections::HashMap::new();
    for row in rows {
        let type_raw: String = row.get("finding_type");
        let Some(finding_type) = FindingType::parse(&type_raw) else {
            continue;
        };
        map.insert(
            (finding_type, row.get::<String, _>("entity_key")),
            (
                row.get::<i64, _>("has_exception") != 0,
                row.get::<String, _>("exception_text"),
            ),
        );
    }
    Ok(map)
}

/// Status counts for one run, split by documented-exception state.
pub async fn status_counts(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<(i64, i64, i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            SUM(CASE WHEN status IN ('FAIL', 'WARN') AND has_exception = 0 THEN 1 ELSE 0 END) AS active,
            SUM(CASE WHEN status IN ('FAIL', 'WARN') AND has_exception = 1 THEN 1 ELSE 0 END) AS excepted,
            SUM(CASE WHEN status = 'PASS' THEN 1 ELSE 0 END) AS compliant
        FROM findings WHERE run_id = ?
        "#,
    )
    .bind(run_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok((
        row.get::<i64, _>("total"),
        row.get::<Option<i64>, _>("active").unwrap_or(0),
        row.get::<Option<i64>, _>("excepted").unwrap_or(0),
        row.get::<Option<i64>, _>("compliant").unwrap_or(0),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{runs, servers, Store};
    use crate::types::RunType;
    use chrono::NaiveDate;

    async fn setup(conn: &mut SqliteConnection) -> (i64, i64) {
        let run = runs::begin_run(
            conn,
            "Contoso",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            RunType::Baseline,
            None,
            "h",
        )
        .await
        .unwrap();
        let server = servers::upsert_server(conn, "srv1").await.unwrap();
        let instance = servers::upsert_instance(conn, server, "DEFAULT", None)
            .await
            .unwrap();
        (run, instance)
    }

    fn sample(run_id: i64, instance_id: i64, key: &str) -> NewFinding {
        NewFinding {
            run_id,
            instance_id,
            finding_type: FindingType::Config,
            entity_key: key.to_string(),
            row_uuid: Some(Uuid::new_v4()),
            status: FindingStatus::Fail,
            risk: Risk::High,
            description: "xp_cmdshell enabled".into(),
            recommendation: "disable xp_cmdshell".into(),
            details: serde_json::json!({"value_in_use": 1}),
        }
    }

    #[tokio::test]
    async fn duplicate_within_run_is_collector_bug() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let (run, instance) = setup(&mut conn).await;
        let finding = sample(run, instance, "config|srv1|default|xp_cmdshell");
        save_finding(&mut conn, &finding).await.unwrap();
        let dup = save_finding(&mut conn, &finding).await;
        assert!(matches!(dup, Err(AuditError::CollectorDuplicate { .. })));
    }

    #[tokio::test]
    async fn findings_round_trip_with_join() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let (run, instance) = setup(&mut conn).await;
        save_finding(&mut conn, &sample(run, instance, "config|srv1|default|xp_cmdshell"))
            .await
            .unwrap();

        let rows = findings_for_run(&mut conn, run, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].server, "srv1");
        assert_eq!(rows[0].instance, "DEFAULT");
        assert_eq!(rows[0].finding.status, FindingStatus::Fail);
        assert!(rows[0].finding.row_uuid.is_some());
    }

    #[tokio::test]
    async fn latest_across_prefers_newest_run() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let (baseline, instance) = setup(&mut conn).await;
        let key = "config|srv1|default|xp_cmdshell";
        save_finding(&mut conn, &sample(baseline, instance, key))
            .await
            .unwrap();
        runs::complete_run(&mut conn, baseline).await.unwrap();

        let sync = runs::begin_run(
            &mut conn,
            "Contoso",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            RunType::Sync,
            Some(baseline),
            "h",
        )
        .await
        .unwrap();
        let mut fixed = sample(sync, instance, key);
        fixed.status = FindingStatus::Pass;
        save_finding(&mut conn, &fixed).await.unwrap();

        let latest = latest_findings_across(&mut conn, &[baseline, sync])
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].finding.status, FindingStatus::Pass);
        assert_eq!(latest[0].finding.run_id, sync);
    }

    #[tokio::test]
    async fn exception_state_freezes_per_run() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let (run, instance) = setup(&mut conn).await;
        let key = "config|srv1|default|xp_cmdshell";
        save_finding(&mut conn, &sample(run, instance, key))
            .await
            .unwrap();
        update_exception_state(&mut conn, run, FindingType::Config, key, true, "CAB-482")
            .await
            .unwrap();

        let states = exception_states_for_run(&mut conn, run).await.unwrap();
        let state = states.get(&(FindingType::Config, key.to_string())).unwrap();
        assert_eq!(state.0, true);
        assert_eq!(state.1, "CAB-482");

        let (total, active, excepted, compliant) = status_counts(&mut conn, run).await.unwrap();
        assert_eq!((total, active, excepted, compliant), (1, 0, 1, 0));
    }
}
