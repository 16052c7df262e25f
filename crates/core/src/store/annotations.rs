//! Operator annotations: created or updated on every workbook read, never
//! deleted by the system.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{AuditError, Result};
use crate::model::Annotation;
use crate::types::{FindingType, ReviewStatus};

/// Annotation content as read from the workbook, before it is bound to a
/// store row.
#[derive(Debug, Clone, Default)]
pub struct AnnotationInput {
    pub row_uuid: Option<Uuid>,
    pub notes: String,
    pub purpose: String,
    pub justification: String,
    pub review_status: ReviewStatus,
    pub last_reviewed: Option<String>,
    pub modified_by: String,
}

fn annotation_from_row(row: &SqliteRow) -> Result<Annotation> {
    let type_raw: String = row.get("entity_type");
    let uuid_raw: Option<String> = row.get("row_uuid");
    let review_raw: String = row.get("review_status");
    Ok(Annotation {
        id: row.get("id"),
        row_uuid: uuid_raw.and_then(|s| Uuid::parse_str(&s).ok()),
        entity_type: FindingType::parse(&type_raw).ok_or_else(|| AuditError::StoreCorrupt {
            reason: format!("unknown entity type '{}'", type_raw),
        })?,
        entity_key: row.get("entity_key"),
        notes: row.get("notes"),
        purpose: row.get("purpose"),
        justification: row.get("justification"),
        review_status: ReviewStatus::parse(&review_raw),
        last_reviewed: row.get("last_reviewed"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
        modified_by: row.get("modified_by"),
    })
}

pub async fn get_by_uuid(
    conn: &mut SqliteConnection,
    row_uuid: &Uuid,
) -> Result<Option<Annotation>> {
    let row = sqlx::query("SELECT * FROM annotations WHERE row_uuid = ?")
        .bind(row_uuid.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| annotation_from_row(&r)).transpose()
}

/// Fallback match: `(entity_type, entity_key)` under the normalized
/// (lowercased) key, so workbook rows re-bind case-insensitively.
pub async fn get_by_key(
    conn: &mut SqliteConnection,
    entity_type: FindingType,
    entity_key: &str,
) -> Result<Option<Annotation>> {
    let row = sqlx::query("SELECT * FROM annotations WHERE entity_type = ? AND entity_key = ?")
        .bind(entity_type.as_str())
        .bind(entity_key.to_lowercase())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| annotation_from_row(&r)).transpose()
}

/// Create or update the annotation for one entity. Matches by UUID first,
/// then by `(entity_type, entity_key)`; `created_at` survives updates and a
/// newly learned UUID is attached to a key-matched row.
pub async fn upsert(
    conn: &mut SqliteConnection,
    entity_type: FindingType,
    entity_key: &str,
    input: &AnnotationInput,
) -> Result<Annotation> {
    let entity_key = entity_key.to_lowercase();
    let existing = match &input.row_uuid {
        Some(uuid) => match get_by_uuid(conn, uuid).await? {
            Some(found) => Some(found),
            None => get_by_key(conn, entity_type, &entity_key).await?,
        },
        None => get_by_key(conn, entity_type, &entity_key).await?,
    };

    let now = Utc::now();
    match existing {
        Some(found) => {
            let row_uuid = input.row_uuid.or(found.row_uuid);
            sqlx::query(
                r#"
                UPDATE annotations
                SET row_uuid = ?, entity_key = ?, notes = ?, purpose = ?, justification = ?,
                    review_status = ?, last_reviewed = ?, modified_at = ?, modified_by = ?
                WHERE id = ?
                "#,
            )
            .bind(row_uuid.map(|u| u.to_string()))
            .bind(&entity_key)
            .bind(&input.notes)
            .bind(&input.purpose)
            .bind(&input.justification)
            .bind(input.review_status.as_str())
            .bind(&input.last_reviewed)
            .bind(now)
            .bind(&input.modified_by)
            .bind(found.id)
            .execute(&mut *conn)
            .await?;
            Ok(Annotation {
                row_uuid,
                entity_key,
                notes: input.notes.clone(),
                purpose: input.purpose.clone(),
                justification: input.justification.clone(),
                review_status: input.review_status,
                last_reviewed: input.last_reviewed.clone(),
                modified_at: now,
                modified_by: input.modified_by.clone(),
                ..found
            })
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO annotations (row_uuid, entity_type, entity_key, notes, purpose,
                                         justification, review_status, last_reviewed,
                                         created_at, modified_at, modified_by)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(input.row_uuid.map(|u| u.to_string()))
            .bind(entity_type.as_str())
            .bind(&entity_key)
            .bind(&input.notes)
            .bind(&input.purpose)
            .bind(&input.justification)
            .bind(input.review_status.as_str())
            .bind(&input.last_reviewed)
            .bind(now)
            .bind(now)
            .bind(&input.modified_by)
            .execute(&mut *conn)
            .await?;
            Ok(Annotation {
                id: result.last_insert_rowid(),
                row_uuid: input.row_uuid,
                entity_type,
                entity_key,
                notes: input.notes.clone(),
                purpose: input.purpose.clone(),
                justification: input.justification.clone(),
                review_status: input.review_status,
                last_reviewed: input.last_reviewed.clone(),
                created_at: now,
                modified_at: now,
                modified_by: input.modified_by.clone(),
            })
        }
    }
}

pub async fn all(conn: &mut SqliteConnection) -> Result<Vec<Annotation>> {
    let rows = sqlx::query("SELECT * FROM annotations ORDER BY entity_type, entity_key")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(annotation_from_row).collect()
}
