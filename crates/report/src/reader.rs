//! Workbook reader: annotations and keys out of a previously generated
//! report.
//!
//! Merged cells come back from the file as empty for every row but the
//! anchor, so the reader carries a last-non-empty context per key column.
//! Header lookup is exact (case-insensitive) first with a substring
//! fallback, so `Server` never binds to `Linked Server` when both exist.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use tracing::{debug, warn};
use uuid::Uuid;

use sqlwarden_core::types::FindingType;
use sqlwarden_core::{AuditError, Result};

use crate::schema::{
    self, ColumnKind, SheetSchema, ACTIONS_SHEET, HDR_JUSTIFICATION, HDR_LAST_REVIEWED, HDR_NOTES,
    HDR_PURPOSE, HDR_REVIEW_STATUS,
};

/// Editable cell values of one data row, verbatim as the operator left them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditableValues {
    pub review_status: String,
    pub justification: String,
    pub purpose: String,
    pub notes: String,
    pub last_reviewed: String,
}

#[derive(Debug, Clone)]
pub struct SheetRow {
    pub sheet: &'static str,
    pub finding_type: FindingType,
    pub row_uuid: Option<Uuid>,
    /// Key column values in schema order, merged cells already propagated.
    pub key_parts: Vec<String>,
    pub editable: EditableValues,
}

/// Operator edit on the Actions sheet, matched by entry id.
#[derive(Debug, Clone)]
pub struct ActionRowEdit {
    pub id: i64,
    pub notes: String,
    pub date_override: String,
}

#[derive(Debug, Default)]
pub struct WorkbookRead {
    pub rows: Vec<SheetRow>,
    pub action_edits: Vec<ActionRowEdit>,
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Int(i) => format!("{}", i),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Map schema column index -> sheet column index.
///
/// Pass one binds exact case-insensitive header matches; pass two resolves
/// leftovers by unambiguous substring.
fn map_columns(headers: &[Data], sheet: &SheetSchema) -> HashMap<usize, usize> {
    let header_texts: Vec<String> = headers
        .iter()
        .map(|h| cell_text(h).trim().to_lowercase())
        .collect();
    let mut mapping = HashMap::new();
    let mut taken = vec![false; header_texts.len()];

    for (schema_idx, column) in sheet.columns.iter().enumerate() {
        let wanted = column.header.to_lowercase();
        if let Some(col) = header_texts
            .iter()
            .position(|h| !h.is_empty() && *h == wanted)
        {
            mapping.insert(schema_idx, col);
            taken[col] = true;
        }
    }

    for (schema_idx, column) in sheet.columns.iter().enumerate() {
        if mapping.contains_key(&schema_idx) {
            continue;
        }
        let wanted = column.header.to_lowercase();
        let candidates: Vec<usize> = header_texts
            .iter()
            .enumerate()
            .filter(|(col, h)| !taken[*col] && !h.is_empty() && h.contains(&wanted))
            .map(|(col, _)| col)
            .collect();
        if let [only] = candidates[..] {
            mapping.insert(schema_idx, only);
            taken[only] = true;
        }
    }
    mapping
}

pub fn read_workbook(path: &Path) -> Result<WorkbookRead> {
    schema::verify()?;

    let mut workbook =
        open_workbook::<Xlsx<BufReader<File>>, _>(path).map_err(|e| AuditError::Workbook(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_owned();

    let mut result = WorkbookRead::default();

    for sheet in schema::data_sheets() {
        if !sheet_names.iter().any(|n| n == sheet.name) {
            debug!(sheet = sheet.name, "sheet absent from workbook, skipping");
            continue;
        }
        let range = workbook
            .worksheet_range(sheet.name)
            .map_err(|e| AuditError::Workbook(e.to_string()))?;
        read_data_sheet(sheet, range.rows(), &mut result.rows);
    }

    if sheet_names.iter().any(|n| n == ACTIONS_SHEET.name) {
        let range = workbook
            .worksheet_range(ACTIONS_SHEET.name)
            .map_err(|e| AuditError::Workbook(e.to_string()))?;
        read_actions_sheet(range.rows(), &mut result.action_edits);
    }

    debug!(
        rows = result.rows.len(),
        action_edits = result.action_edits.len(),
        "workbook read"
    );
    Ok(result)
}

fn read_data_sheet<'a>(
    sheet: &'static SheetSchema,
    mut rows: impl Iterator<Item = &'a [Data]>,
    out: &mut Vec<SheetRow>,
) {
    let Some(headers) = rows.next() else {
        return;
    };
    let mapping = map_columns(headers, sheet);

    let key_schema_indices: Vec<usize> = sheet.key_columns().map(|(i, _)| i).collect();
    let mut carried: Vec<String> = vec![String::new(); key_schema_indices.len()];

    let uuid_schema_idx = sheet
        .columns
        .iter()
        .position(|c| c.kind == ColumnKind::RowUuid);

    for row in rows {
        if row.iter().all(|c| cell_text(c).trim().is_empty()) {
            continue;
        }

        let get = |schema_idx: usize| -> String {
            mapping
                .get(&schema_idx)
                .and_then(|col| row.get(*col))
                .map(cell_text)
                .unwrap_or_default()
        };

        let mut key_parts = Vec::with_capacity(key_schema_indices.len());
        for (slot, schema_idx) in key_schema_indices.iter().enumerate() {
            let raw = get(*schema_idx);
            let value = if raw.trim().is_empty() {
                carried[slot].clone()
            } else {
                carried[slot] = raw.trim().to_string();
                carried[slot].clone()
            };
            key_parts.push(value);
        }

        let row_uuid = uuid_schema_idx
            .map(|idx| get(idx))
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok());

        let mut editable = EditableValues::default();
        for (schema_idx, column) in sheet.editable_columns() {
            let value = get(schema_idx).trim().to_string();
            match column.header {
                HDR_REVIEW_STATUS => editable.review_status = value,
                HDR_JUSTIFICATION => editable.justification = value,
                HDR_PURPOSE => editable.purpose = value,
                HDR_NOTES => editable.notes = value,
                HDR_LAST_REVIEWED => editable.last_reviewed = value,
                other => warn!(sheet = sheet.name, header = other, "unmapped editable column"),
            }
        }

        out.push(SheetRow {
            sheet: sheet.name,
            finding_type: sheet.finding_type.expect("data sheet"),
            row_uuid,
            key_parts,
            editable,
        });
    }
}

fn read_actions_sheet<'a>(
    mut rows: impl Iterator<Item = &'a [Data]>,
    out: &mut Vec<ActionRowEdit>,
) {
    let Some(headers) = rows.next() else {
        return;
    };
    let mapping = map_columns(headers, &ACTIONS_SHEET);
    let id_idx = ACTIONS_SHEET.column_index("Id");
    let notes_idx = ACTIONS_SHEET.column_index("Notes");
    let override_idx = ACTIONS_SHEET.column_index("Date Override");

    for row in rows {
        let get = |schema_idx: Option<usize>| -> String {
            schema_idx
                .and_then(|idx| mapping.get(&idx))
                .and_then(|col| row.get(*col))
                .map(cell_text)
                .unwrap_or_default()
        };
        let id_raw = get(id_idx);
        let Ok(id) = id_raw.trim().parse::<i64>() else {
            continue;
        };
        out.push(ActionRowEdit {
            id,
            notes: get(notes_idx).trim().to_string(),
            date_override: get(override_idx).trim().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlwarden_core::types::FindingType;

    fn header_row(texts: &[&str]) -> Vec<Data> {
        texts.iter().map(|t| Data::String(t.to_string())).collect()
    }

    #[test]
    fn exact_match_beats_substring() {
        let sheet = schema::sheet_for_type(FindingType::LinkedServer);
        // Deliberately reordered headers with both "Linked Name" and "Server".
        let headers = header_row(&[
            "Row Id",
            "Linked Name",
            "Server",
            "Instance",
            "Status",
            "Risk",
            "Description",
            "Recommendation",
            "Review Status",
            "Justification",
            "Purpose",
            "Notes",
            "Last Reviewed",
        ]);
        let mapping = map_columns(&headers, sheet);
        let server_schema_idx = sheet.column_index("Server").unwrap();
        let linked_schema_idx = sheet.column_index("Linked Name").unwrap();
        assert_eq!(mapping[&server_schema_idx], 2);
        assert_eq!(mapping[&linked_schema_idx], 1);
    }

    #[test]
    fn merged_key_cells_carry_forward() {
        let sheet = schema::sheet_for_type(FindingType::Config);
        let rows: Vec<Vec<Data>> = vec![
            header_row(&[
                "Row Id",
                "Server",
                "Instance",
                "Setting",
                "Status",
                "Risk",
                "Description",
                "Recommendation",
                "Review Status",
                "Justification",
                "Notes",
                "Last Reviewed",
            ]),
            vec![
                Data::String(Uuid::new_v4().to_string()),
                Data::String("SRV1".into()),
                Data::String("DEFAULT".into()),
                Data::String("xp_cmdshell".into()),
                Data::String("FAIL".into()),
                Data::String("high".into()),
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::String("Approved per CAB-482".into()),
                Data::Empty,
                Data::Empty,
            ],
            // Merged presentation: server and instance cells empty.
            vec![
                Data::String(Uuid::new_v4().to_string()),
                Data::Empty,
                Data::Empty,
                Data::String("clr enabled".into()),
                Data::String("PASS".into()),
                Data::String("info".into()),
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::Empty,
            ],
        ];

        let mut out = Vec::new();
        read_data_sheet(sheet, rows.iter().map(|r| r.as_slice()), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].key_parts, vec!["SRV1", "DEFAULT", "clr enabled"]);
        assert_eq!(out[0].editable.justification, "Approved per CAB-482");
    }

    #[test]
    fn blank_rows_are_skipped_not_carried() {
        let sheet = schema::sheet_for_type(FindingType::Config);
        let rows: Vec<Vec<Data>> = vec![
            header_row(&[
                "Row Id",
                "Server",
                "Instance",
                "Setting",
                "Status",
                "Risk",
                "Description",
                "Recommendation",
                "Review Status",
                "Justification",
                "Notes",
                "Last Reviewed",
            ]),
            vec![
                Data::Empty,
                Data::String("srv1".into()),
                Data::String("DEFAULT".into()),
                Data::String("xp_cmdshell".into()),
                Data::String("FAIL".into()),
                Data::String("high".into()),
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::Empty,
                Data::Empty,
            ],
            vec![Data::Empty; 12],
        ];
        let mut out = Vec::new();
        read_data_sheet(sheet, rows.iter().map(|r| r.as_slice()), &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].row_uuid.is_none());
    }

    #[test]
    fn action_rows_match_by_id() {
        let rows: Vec<Vec<Data>> = vec![
            header_row(&[
                "Id",
                "Date",
                "Date Override",
                "Entity",
                "Type",
                "Change",
                "State",
                "Description",
                "Notes",
            ]),
            vec![
                Data::Float(7.0),
                Data::String("2026-03-01".into()),
                Data::String("2026-02-20".into()),
                Data::String("config|srv1|default|xp_cmdshell".into()),
                Data::String("config".into()),
                Data::String("FIXED".into()),
                Data::String("closed".into()),
                Data::String("".into()),
                Data::String("verified by dba".into()),
            ],
            vec![Data::String("not-an-id".into()), Data::Empty, Data::Empty],
        ];
        let mut out = Vec::new();
        read_actions_sheet(rows.iter().map(|r| r.as_slice()), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 7);
        assert_eq!(out[0].date_override, "2026-02-20");
        assert_eq!(out[0].notes, "verified by dba");
    }
}
