//! Workbook writer: regenerates the full report from current findings,
//! annotations, stats, and the action log.
//!
//! Merging of server/instance columns is a final render pass; the persisted
//! keys never depend on it. The hidden UUID column is always column A.

use std::collections::HashMap;
use std::path::Path;

use rust_xlsxwriter::{DataValidation, Format, Workbook, Worksheet};
use tracing::info;

use sqlwarden_core::model::{ActionLogEntry, Annotation, FindingRow, ScanOutcome, Stats};
use sqlwarden_core::types::{FindingStatus, FindingType, ReviewStatus};
use sqlwarden_core::util::format_date;
use sqlwarden_core::{AuditError, NaiveDate, Result};

use crate::schema::{
    self, ColumnKind, SheetSchema, Validation, ACTIONS_SHEET, COVER_SHEET, HDR_JUSTIFICATION,
    HDR_LAST_REVIEWED, HDR_NOTES, HDR_PURPOSE, HDR_REVIEW_STATUS, ROLE_MATRIX_SHEET,
};

/// Everything the writer needs for one regeneration.
pub struct ReportContext<'a> {
    pub organization: &'a str,
    pub audit_date: NaiveDate,
    pub stats: &'a Stats,
    /// Current findings in store order (instance, type, key).
    pub findings: &'a [FindingRow],
    /// Latest annotations keyed by `(finding_type, entity_key)`.
    pub annotations: &'a HashMap<(FindingType, String), Annotation>,
    pub outcomes: &'a [ScanOutcome],
    pub actions: &'a [ActionLogEntry],
}

fn wx(err: rust_xlsxwriter::XlsxError) -> AuditError {
    AuditError::Workbook(err.to_string())
}

pub fn write_workbook(path: &Path, ctx: &ReportContext<'_>) -> Result<()> {
    schema::verify()?;

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    write_cover(workbook.add_worksheet(), ctx, &bold)?;

    for sheet in schema::data_sheets() {
        let finding_type = sheet.finding_type.expect("data sheet");
        let rows: Vec<&FindingRow> = ctx
            .findings
            .iter()
            .filter(|f| f.finding.finding_type == finding_type)
            .collect();
        let worksheet = workbook.add_worksheet();
        write_data_sheet(worksheet, sheet, &rows, ctx, &bold)?;
    }

    write_role_matrix(workbook.add_worksheet(), ctx, &bold)?;
    write_actions(workbook.add_worksheet(), ctx, &bold)?;

    workbook.save(path).map_err(wx)?;
    info!(path = %path.display(), findings = ctx.findings.len(), "workbook written");
    Ok(())
}

fn write_cover(worksheet: &mut Worksheet, ctx: &ReportContext<'_>, bold: &Format) -> Result<()> {
    worksheet.set_name(COVER_SHEET).map_err(wx)?;
    worksheet
        .write_string_with_format(0, 0, "SQL Server Security Audit", bold)
        .map_err(wx)?;
    worksheet.write_string(1, 0, "Organization").map_err(wx)?;
    worksheet.write_string(1, 1, ctx.organization).map_err(wx)?;
    worksheet.write_string(2, 0, "Audit Date").map_err(wx)?;
    worksheet
        .write_string(2, 1, ctx.audit_date.format("%Y-%m-%d").to_string())
        .map_err(wx)?;

    let stats = [
        ("Total Findings", ctx.stats.total_findings),
        ("Active Issues", ctx.stats.active_issues),
        ("Documented Exceptions", ctx.stats.documented_exceptions),
        ("Compliant", ctx.stats.compliant),
        ("Fixed Since Baseline", ctx.stats.fixed_since_baseline),
        ("Regressions Since Baseline", ctx.stats.regressions_since_baseline),
        ("New Issues Since Baseline", ctx.stats.new_issues_since_baseline),
        ("Fixed Since Last Sync", ctx.stats.fixed_since_last),
        ("Regressions Since Last Sync", ctx.stats.regressions_since_last),
        ("New Issues Since Last Sync", ctx.stats.new_issues_since_last),
        ("Instances Scanned", ctx.stats.instances_scanned),
        ("Instances Unreachable", ctx.stats.instances_unreachable),
    ];
    worksheet
        .write_string_with_format(4, 0, "Summary", bold)
        .map_err(wx)?;
    for (offset, (label, value)) in stats.iter().enumerate() {
        let row = 5 + offset as u32;
        worksheet.write_string(row, 0, *label).map_err(wx)?;
        worksheet.write_number(row, 1, *value as f64).map_err(wx)?;
    }
    worksheet.set_column_width(0, 28.0).map_err(wx)?;
    Ok(())
}

/// Effective review-status cell: a justified FAIL/WARN row with an empty
/// dropdown is auto-populated to Exception; a PASS row keeps whatever the
/// operator left (it is ignored, not cleared).
fn effective_review_status(status: FindingStatus, annotation: Option<&Annotation>) -> String {
    match annotation {
        Some(a) => {
            if status.is_discrepancy()
                && a.review_status == ReviewStatus::None
                && !a.justification.trim().is_empty()
            {
                ReviewStatus::Exception.as_str().to_string()
            } else {
                a.review_status.as_str().to_string()
            }
        }
        None => String::new(),
    }
}

fn write_data_sheet(
    worksheet: &mut Worksheet,
    sheet: &'static SheetSchema,
    rows: &[&FindingRow],
    ctx: &ReportContext<'_>,
    bold: &Format,
) -> Result<()> {
    worksheet.set_name(sheet.name).map_err(wx)?;

    for (col, column) in sheet.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, column.header, bold)
            .map_err(wx)?;
    }

    // Column A: hidden, locked row identifier.
    worksheet.set_column_width(0, 0.0).map_err(wx)?;
    worksheet.set_column_hidden(0).map_err(wx)?;

    let outcome_by_ref: HashMap<String, &ScanOutcome> = ctx
        .outcomes
        .iter()
        .map(|o| (o.instance_ref(), o))
        .collect();

    // Server/instance merge runs are computed up front so merged cells are
    // written exactly once.
    let server_col = sheet.column_index("Server");
    let instance_col = sheet.column_index("Instance");
    let merge_cols: Vec<usize> = [server_col, instance_col].into_iter().flatten().collect();
    let key_values: Vec<Vec<String>> = rows
        .iter()
        .map(|r| key_parts_of(&r.finding.entity_key))
        .collect();

    for (row_offset, finding_row) in rows.iter().enumerate() {
        let row = 1 + row_offset as u32;
        let finding = &finding_row.finding;
        let annotation = ctx
            .annotations
            .get(&(finding.finding_type, finding.entity_key.clone()));
        let parts = &key_values[row_offset];

        for (col, column) in sheet.columns.iter().enumerate() {
            let col_u16 = col as u16;
            let value = match column.kind {
                ColumnKind::RowUuid => finding
                    .row_uuid
                    .map(|u| u.to_string())
                    .unwrap_or_default(),
                ColumnKind::Key => {
                    if merge_cols.contains(&col) {
                        // Server/instance cells are written by the merge pass.
                        continue;
                    }
                    let key_slot = sheet
                        .key_columns()
                        .position(|(idx, _)| idx == col)
                        .unwrap_or(0);
                    parts.get(key_slot).cloned().unwrap_or_default()
                }
                ColumnKind::Fact => match column.header {
                    "Status" => finding.status.as_str().to_string(),
                    "Risk" => finding.risk.as_str().to_string(),
                    "Description" => finding.description.clone(),
                    "Recommendation" => finding.recommendation.clone(),
                    "Scanned" => outcome_by_ref
                        .get(&finding_row.instance_ref())
                        .map(|o| if o.scanned { "yes" } else { "no" }.to_string())
                        .unwrap_or_default(),
                    "Scan Error" => outcome_by_ref
                        .get(&finding_row.instance_ref())
                        .and_then(|o| o.error.clone())
                        .unwrap_or_default(),
                    _ => String::new(),
                },
                ColumnKind::Editable => match column.header {
                    HDR_REVIEW_STATUS => effective_review_status(finding.status, annotation),
                    HDR_JUSTIFICATION => annotation
                        .map(|a| a.justification.clone())
                        .unwrap_or_default(),
                    HDR_PURPOSE => annotation.map(|a| a.purpose.clone()).unwrap_or_default(),
                    HDR_NOTES => annotation.map(|a| a.notes.clone()).unwrap_or_default(),
                    HDR_LAST_REVIEWED => annotation
                        .and_then(|a| a.last_reviewed.clone())
                        .unwrap_or_default(),
                    _ => String::new(),
                },
            };
            worksheet.write_string(row, col_u16, value.as_str()).map_err(wx)?;
        }
    }

    apply_merges(worksheet, sheet, &key_values, &merge_cols)?;
    apply_validations(worksheet, sheet, rows.len())?;
    Ok(())
}

fn key_parts_of(entity_key: &str) -> Vec<String> {
    // Segment 0 is the finding type; the rest line up with key columns.
    entity_key.split('|').skip(1).map(String::from).collect()
}

/// Whether this row continues a run of identical values in the given key
/// slot (and the server slot stays identical too, so instance merges never
/// span servers).
fn in_merge_run(key_values: &[Vec<String>], row_offset: usize, key_slot: usize) -> bool {
    if row_offset == 0 {
        return false;
    }
    let prev = &key_values[row_offset - 1];
    let curr = &key_values[row_offset];
    let same_here = prev.get(key_slot) == curr.get(key_slot);
    let same_server = key_slot == 0 || prev.first() == curr.first();
    same_here && same_server
}

fn apply_merges(
    worksheet: &mut Worksheet,
    sheet: &'static SheetSchema,
    key_values: &[Vec<String>],
    merge_cols: &[usize],
) -> Result<()> {
    let merge_format = Format::new();
    for &col in merge_cols {
        let key_slot = sheet
            .key_columns()
            .position(|(idx, _)| idx == col)
            .unwrap_or(0);
        let mut run_start = 0usize;
        for row in 1..=key_values.len() {
            let continues = row < key_values.len() && in_merge_run(key_values, row, key_slot);
            if continues {
                continue;
            }
            let run_end = row - 1;
            let value = key_values[run_start]
                .get(key_slot)
                .cloned()
                .unwrap_or_default();
            if run_end > run_start {
                worksheet
                    .merge_range(
                        1 + run_start as u32,
                        col as u16,
                        1 + run_end as u32,
                        col as u16,
                        &value,
                        &merge_format,
                    )
                    .map_err(wx)?;
            } else {
                worksheet
                    .write_string(1 + run_start as u32, col as u16, value.as_str())
                    .map_err(wx)?;
            }
            run_start = row;
        }
    }
    Ok(())
}

fn apply_validations(
    worksheet: &mut Worksheet,
    sheet: &'static SheetSchema,
    row_count: usize,
) -> Result<()> {
    if row_count == 0 {
        return Ok(());
    }
    let last_row = row_count as u32;
    for (col, column) in sheet.columns.iter().enumerate() {
        if let Some(Validation::List(values)) = column.validation {
            let validation = DataValidation::new()
                .allow_list_strings(values)
                .map_err(wx)?;
            worksheet
                .add_data_validation(1, col as u16, last_row, col as u16, &validation)
                .map_err(wx)?;
        }
    }
    Ok(())
}

fn write_role_matrix(
    worksheet: &mut Worksheet,
    ctx: &ReportContext<'_>,
    bold: &Format,
) -> Result<()> {
    worksheet.set_name(ROLE_MATRIX_SHEET).map_err(wx)?;

    // Pivot of server role memberships: rows are members, columns roles.
    let mut roles: Vec<String> = Vec::new();
    let mut members: Vec<(String, String)> = Vec::new();
    let mut memberships: std::collections::HashSet<(String, String, String)> =
        std::collections::HashSet::new();

    for finding_row in ctx
        .findings
        .iter()
        .filter(|f| f.finding.finding_type == FindingType::ServerRoleMember)
    {
        let parts = key_parts_of(&finding_row.finding.entity_key);
        if parts.len() < 4 {
            continue;
        }
        let instance = format!("{}\\{}", parts[0], parts[1]);
        let role = parts[2].clone();
        let member = parts[3].clone();
        if !roles.contains(&role) {
            roles.push(role.clone());
        }
        let row_key = (instance.clone(), member.clone());
        if !members.contains(&row_key) {
            members.push(row_key);
        }
        memberships.insert((instance, role, member));
    }
    roles.sort();
    members.sort();

    worksheet
        .write_string_with_format(0, 0, "Instance", bold)
        .map_err(wx)?;
    worksheet
        .write_string_with_format(0, 1, "Member", bold)
        .map_err(wx)?;
    for (idx, role) in roles.iter().enumerate() {
        worksheet
            .write_string_with_format(0, 2 + idx as u16, role, bold)
            .map_err(wx)?;
    }
    for (row_idx, (instance, member)) in members.iter().enumerate() {
        let row = 1 + row_idx as u32;
        worksheet.write_string(row, 0, instance.as_str()).map_err(wx)?;
        worksheet.write_string(row, 1, member.as_str()).map_err(wx)?;
        for (col_idx, role) in roles.iter().enumerate() {
            if memberships.contains(&(instance.clone(), role.clone(), member.clone())) {
                worksheet
                    .write_string(row, 2 + col_idx as u16, "X")
                    .map_err(wx)?;
            }
        }
    }
    Ok(())
}

fn write_actions(
    worksheet: &mut Worksheet,
    ctx: &ReportContext<'_>,
    bold: &Format,
) -> Result<()> {
    worksheet.set_name(ACTIONS_SHEET.name).map_err(wx)?;
    for (col, column) in ACTIONS_SHEET.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, column.header, bold)
            .map_err(wx)?;
    }

    for (offset, entry) in ctx.actions.iter().enumerate() {
        let row = 1 + offset as u32;
        worksheet
            .write_number(row, 0, entry.id as f64)
            .map_err(wx)?;
        worksheet
            .write_string(row, 1, entry.action_date.date_naive().format("%Y-%m-%d").to_string())
            .map_err(wx)?;
        worksheet
            .write_string(row, 2, format_date(entry.user_date_override))
            .map_err(wx)?;
        worksheet
            .write_string(row, 3, entry.entity_key.as_str())
            .map_err(wx)?;
        worksheet
            .write_string(row, 4, entry.finding_type.as_str())
            .map_err(wx)?;
        worksheet
            .write_string(row, 5, entry.change_type.as_str())
            .map_err(wx)?;
        worksheet
            .write_string(row, 6, entry.status.as_str())
            .map_err(wx)?;
        worksheet
            .write_string(row, 7, &entry.description)
            .map_err(wx)?;
        worksheet
            .write_string(row, 8, entry.notes.as_deref().unwrap_or(""))
            .map_err(wx)?;
    }
    Ok(())
}
