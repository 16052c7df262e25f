//! Annotation sync: fold workbook-read rows back into the store.
//!
//! Resolution order per row: the hidden UUID, then the composite key, then a
//! prior finding's UUID inside the resurrection window. Field normalization
//! is lenient everywhere the operator types free text.

use chrono::{Duration, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use sqlwarden_core::identity::compose_key;
use sqlwarden_core::store::annotations::{self, AnnotationInput};
use sqlwarden_core::store::findings;
use sqlwarden_core::types::ReviewStatus;
use sqlwarden_core::util::parse_loose_date;
use sqlwarden_core::Result;
use sqlwarden_report::SheetRow;

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub upserted: usize,
    /// Rows whose Last Reviewed cell could not be parsed; the original text
    /// was preserved.
    pub date_warnings: usize,
}

/// Upsert every annotated workbook row into the store. Rows with nothing
/// filled in are skipped unless they blank an existing annotation.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    rows: &[SheetRow],
    resurrection_window_days: i64,
    modified_by: &str,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();
    let window_start = Utc::now() - Duration::days(resurrection_window_days);

    for row in rows {
        let parts: Vec<&str> = row.key_parts.iter().map(String::as_str).collect();
        let entity_key = compose_key(row.finding_type, &parts);

        let review_status = ReviewStatus::parse(&row.editable.review_status);
        let (last_reviewed, parse_failed) = normalize_date(&row.editable.last_reviewed);
        if parse_failed {
            warn!(
                sheet = row.sheet,
                entity_key = %entity_key,
                raw = %row.editable.last_reviewed,
                "unparseable review date, preserving original text"
            );
            outcome.date_warnings += 1;
        }

        let mut input = AnnotationInput {
            row_uuid: row.row_uuid,
            notes: row.editable.notes.trim().to_string(),
            purpose: row.editable.purpose.trim().to_string(),
            justification: row.editable.justification.trim().to_string(),
            review_status,
            last_reviewed,
            modified_by: modified_by.to_string(),
        };

        let has_content = !input.notes.is_empty()
            || !input.purpose.is_empty()
            || !input.justification.is_empty()
            || input.review_status != ReviewStatus::None
            || input.last_reviewed.is_some();

        if !has_content {
            // Only touch the store when there is an annotation to blank.
            let existing = match row.row_uuid {
                Some(uuid) => annotations::get_by_uuid(conn, &uuid).await?,
                None => annotations::get_by_key(conn, row.finding_type, &entity_key).await?,
            };
            if existing.map_or(true, |a| !a.has_content()) {
                continue;
            }
        }

        // Rows that lost their UUID re-bind to the identity of the most
        // recent finding with the same key inside the resurrection window.
        if input.row_uuid.is_none() {
            input.row_uuid = findings::recent_uuid_for_key(
                conn,
                row.finding_type,
                &entity_key,
                Some(window_start),
            )
            .await?;
        }

        annotations::upsert(conn, row.finding_type, &entity_key, &input).await?;
        outcome.upserted += 1;
    }

    debug!(
        upserted = outcome.upserted,
        date_warnings = outcome.date_warnings,
        "annotations reconciled"
    );
    Ok(outcome)
}

/// Canonicalize a date cell; on failure keep the operator's text verbatim.
fn normalize_date(raw: &str) -> (Option<String>, bool) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, false);
    }
    match parse_loose_date(trimmed) {
        Some(date) => (Some(date.format("%Y-%m-%d").to_string()), false),
        None => (Some(trimmed.to_string()), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlwarden_core::store::Store;
    use sqlwarden_core::types::FindingType;
    use sqlwarden_report::EditableValues;

    fn sheet_row(key_parts: &[&str], editable: EditableValues) -> SheetRow {
        SheetRow {
            sheet: "Configuration",
            finding_type: FindingType::Config,
            row_uuid: None,
            key_parts: key_parts.iter().map(|s| s.to_string()).collect(),
            editable,
        }
    }

    #[tokio::test]
    async fn justified_row_is_upserted_with_normalized_key() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        let rows = vec![sheet_row(
            &["SRV1", "DEFAULT", "xp_cmdshell"],
            EditableValues {
                justification: "Approved per CAB-482".into(),
                last_reviewed: "14.03.2026".into(),
                ..Default::default()
            },
        )];
        let outcome = reconcile(&mut conn, &rows, 180, "auditor").await.unwrap();
        assert_eq!(outcome.upserted, 1);
        assert_eq!(outcome.date_warnings, 0);

        let stored = annotations::get_by_key(
            &mut conn,
            FindingType::Config,
            "config|srv1|default|xp_cmdshell",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.justification, "Approved per CAB-482");
        assert_eq!(stored.last_reviewed.as_deref(), Some("2026-03-14"));
    }

    #[tokio::test]
    async fn bad_date_preserves_text_and_warns() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        let rows = vec![sheet_row(
            &["srv1", "default", "clr enabled"],
            EditableValues {
                justification: "pending CAB".into(),
                last_reviewed: "after the migration".into(),
                ..Default::default()
            },
        )];
        let outcome = reconcile(&mut conn, &rows, 180, "auditor").await.unwrap();
        assert_eq!(outcome.date_warnings, 1);

        let stored = annotations::get_by_key(
            &mut conn,
            FindingType::Config,
            "config|srv1|default|clr enabled",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.last_reviewed.as_deref(), Some("after the migration"));
    }

    #[tokio::test]
    async fn invalid_review_status_collapses_to_empty() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        let rows = vec![sheet_row(
            &["srv1", "default", "xp_cmdshell"],
            EditableValues {
                review_status: "Maybe Later".into(),
                notes: "keep an eye on this".into(),
                ..Default::default()
            },
        )];
        reconcile(&mut conn, &rows, 180, "auditor").await.unwrap();

        let stored = annotations::get_by_key(
            &mut conn,
            FindingType::Config,
            "config|srv1|default|xp_cmdshell",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.review_status, ReviewStatus::None);
        assert_eq!(stored.notes, "keep an eye on this");
    }

    #[tokio::test]
    async fn empty_rows_do_not_create_annotations() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        let rows = vec![sheet_row(&["srv1", "default", "xp_cmdshell"], EditableValues::default())];
        let outcome = reconcile(&mut conn, &rows, 180, "auditor").await.unwrap();
        assert_eq!(outcome.upserted, 0);
        assert!(annotations::all(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clearing_an_existing_annotation_blanks_it() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        let filled = vec![sheet_row(
            &["srv1", "default", "xp_cmdshell"],
            EditableValues {
                justification: "temporary".into(),
                ..Default::default()
            },
        )];
        reconcile(&mut conn, &filled, 180, "auditor").await.unwrap();

        let cleared = vec![sheet_row(&["srv1", "default", "xp_cmdshell"], EditableValues::default())];
        let outcome = reconcile(&mut conn, &cleared, 180, "auditor").await.unwrap();
        assert_eq!(outcome.upserted, 1);

        let stored = annotations::get_by_key(
            &mut conn,
            FindingType::Config,
            "config|srv1|default|xp_cmdshell",
        )
        .await
        .unwrap()
        .unwrap();
        assert!(stored.justification.is_empty());
    }
}
