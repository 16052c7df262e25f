//! Sheet layout declared as data.
//!
//! Reader and writer share this registry, so a column the writer emits is by
//! construction a column the reader knows how to find. [`verify`] is the
//! startup self-check; it runs before any workbook is touched.

use sqlwarden_core::types::FindingType;
use sqlwarden_core::{AuditError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Hidden, locked, always column A of a data sheet.
    RowUuid,
    Key,
    Fact,
    Editable,
}

#[derive(Debug, Clone, Copy)]
pub enum Validation {
    List(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub header: &'static str,
    pub kind: ColumnKind,
    pub validation: Option<Validation>,
}

const fn uuid_col() -> ColumnSpec {
    ColumnSpec {
        header: "Row Id",
        kind: ColumnKind::RowUuid,
        validation: None,
    }
}

const fn key(header: &'static str) -> ColumnSpec {
    ColumnSpec {
        header,
        kind: ColumnKind::Key,
        validation: None,
    }
}

const fn fact(header: &'static str) -> ColumnSpec {
    ColumnSpec {
        header,
        kind: ColumnKind::Fact,
        validation: None,
    }
}

const fn fact_list(header: &'static str, values: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        header,
        kind: ColumnKind::Fact,
        validation: Some(Validation::List(values)),
    }
}

const fn editable(header: &'static str) -> ColumnSpec {
    ColumnSpec {
        header,
        kind: ColumnKind::Editable,
        validation: None,
    }
}

pub const REVIEW_STATUS_VALUES: &[&str] = &["Exception", "Needs Review", ""];
pub const RISK_VALUES: &[&str] = &["critical", "high", "medium", "low", "info"];
pub const STATUS_VALUES: &[&str] = &["PASS", "FAIL", "WARN"];

const fn review_status_col() -> ColumnSpec {
    ColumnSpec {
        header: "Review Status",
        kind: ColumnKind::Editable,
        validation: Some(Validation::List(REVIEW_STATUS_VALUES)),
    }
}

pub const HDR_JUSTIFICATION: &str = "Justification";
pub const HDR_NOTES: &str = "Notes";
pub const HDR_PURPOSE: &str = "Purpose";
pub const HDR_LAST_REVIEWED: &str = "Last Reviewed";
pub const HDR_REVIEW_STATUS: &str = "Review Status";

#[derive(Debug, Clone, Copy)]
pub struct SheetSchema {
    pub name: &'static str,
    /// `None` for summary sheets (Cover, Role Matrix) and Actions.
    pub finding_type: Option<FindingType>,
    pub columns: &'static [ColumnSpec],
}

impl SheetSchema {
    pub fn key_columns(&self) -> impl Iterator<Item = (usize, &ColumnSpec)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ColumnKind::Key)
    }

    pub fn editable_columns(&self) -> impl Iterator<Item = (usize, &ColumnSpec)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ColumnKind::Editable)
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.header == header)
    }
}

static SHEETS: &[SheetSchema] = &[
    SheetSchema {
        name: "Instances",
        finding_type: Some(FindingType::InstanceInfo),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Scanned"),
            fact("Scan Error"),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "SA Account",
        finding_type: Some(FindingType::SaAccount),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Current Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Server Logins",
        finding_type: Some(FindingType::Login),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Login Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_PURPOSE),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Sensitive Roles",
        finding_type: Some(FindingType::ServerRoleMember),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Role"),
            key("Member"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Configuration",
        finding_type: Some(FindingType::Config),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Setting"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Services",
        finding_type: Some(FindingType::Service),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Service Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Client Protocols",
        finding_type: Some(FindingType::ClientProtocol),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Protocol"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Databases",
        finding_type: Some(FindingType::Database),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Database"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Database Users",
        finding_type: Some(FindingType::DbUser),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Database"),
            key("User Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_PURPOSE),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Database Roles",
        finding_type: Some(FindingType::DbRoleMember),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Database"),
            key("Role"),
            key("Member"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Permission Grants",
        finding_type: Some(FindingType::Permission),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Scope"),
            key("Database"),
            key("Grantee"),
            key("Permission"),
            key("Target"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Orphaned Users",
        finding_type: Some(FindingType::OrphanedUser),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Database"),
            key("User Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Linked Servers",
        finding_type: Some(FindingType::LinkedServer),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Linked Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_PURPOSE),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Triggers",
        finding_type: Some(FindingType::Trigger),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Scope"),
            key("Database"),
            key("Trigger Name"),
            key("Event"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Backups",
        finding_type: Some(FindingType::Backup),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Database"),
            key("Recovery Model"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Audit Settings",
        finding_type: Some(FindingType::AuditSettings),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Setting"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
    SheetSchema {
        name: "Encryption",
        finding_type: Some(FindingType::Encryption),
        columns: &[
            uuid_col(),
            key("Server"),
            key("Instance"),
            key("Key Type"),
            key("Key Name"),
            fact_list("Status", STATUS_VALUES),
            fact_list("Risk", RISK_VALUES),
            fact("Description"),
            fact("Recommendation"),
            review_status_col(),
            editable(HDR_JUSTIFICATION),
            editable(HDR_NOTES),
            editable(HDR_LAST_REVIEWED),
        ],
    },
];

/// Actions sheet is append-only on the system side; the operator edits
/// `Notes` and `Date Override`, matched by `Id`, never by position.
pub static ACTIONS_SHEET: SheetSchema = SheetSchema {
    name: "Actions",
    finding_type: None,
    columns: &[
        key("Id"),
        fact("Date"),
        editable("Date Override"),
        fact("Entity"),
        fact("Type"),
        fact("Change"),
        fact("State"),
        fact("Description"),
        editable("Notes"),
    ],
};

pub const COVER_SHEET: &str = "Cover";
pub const ROLE_MATRIX_SHEET: &str = "Role Matrix";

/// All data sheets that carry findings, in workbook order.
pub fn data_sheets() -> impl Iterator<Item = &'static SheetSchema> {
    SHEETS.iter().filter(|s| s.finding_type.is_some())
}

pub fn sheet_for_type(finding_type: FindingType) -> &'static SheetSchema {
    SHEETS
        .iter()
        .find(|s| s.finding_type == Some(finding_type))
        .expect("every finding type has a sheet")
}

/// Number of key columns each finding type carries: server + instance +
/// type-specific tail.
fn expected_key_columns(finding_type: FindingType) -> usize {
    match finding_type {
        FindingType::InstanceInfo => 2,
        FindingType::SaAccount
        | FindingType::Login
        | FindingType::Config
        | FindingType::Service
        | FindingType::Database
        | FindingType::ClientProtocol
        | FindingType::LinkedServer
        | FindingType::AuditSettings => 3,
        FindingType::ServerRoleMember
        | FindingType::DbUser
        | FindingType::OrphanedUser
        | FindingType::Backup
        | FindingType::Encryption => 4,
        FindingType::DbRoleMember => 5,
        FindingType::Trigger => 6,
        FindingType::Permission => 7,
    }
}

/// Startup self-check: every data sheet leads with exactly one hidden UUID
/// column, key column counts match the key grammar, and headers are unique.
/// A mismatch here means writer and reader would disagree, so it is fatal.
pub fn verify() -> Result<()> {
    for sheet in data_sheets() {
        let finding_type = sheet.finding_type.expect("data sheet");
        let uuid_cols: Vec<usize> = sheet
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ColumnKind::RowUuid)
            .map(|(i, _)| i)
            .collect();
        if uuid_cols != [0] {
            return Err(AuditError::internal(format!(
                "sheet '{}': row uuid must be exactly column A",
                sheet.name
            )));
        }

        let key_count = sheet.key_columns().count();
        if key_count != expected_key_columns(finding_type) {
            return Err(AuditError::internal(format!(
                "sheet '{}': {} key columns declared, {} expected for {}",
                sheet.name,
                key_count,
                expected_key_columns(finding_type),
                finding_type
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for column in sheet.columns {
            if !seen.insert(column.header.to_lowercase()) {
                return Err(AuditError::internal(format!(
                    "sheet '{}': duplicate header '{}'",
                    sheet.name, column.header
                )));
            }
        }

        if sheet.column_index(HDR_REVIEW_STATUS).is_none()
            || sheet.column_index(HDR_JUSTIFICATION).is_none()
        {
            return Err(AuditError::internal(format!(
                "sheet '{}': missing review columns",
                sheet.name
            )));
        }
    }

    let id_col = ACTIONS_SHEET
        .column_index("Id")
        .ok_or_else(|| AuditError::internal("actions sheet: missing Id column"))?;
    if id_col != 0 {
        return Err(AuditError::internal("actions sheet: Id must be column A"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_passes_self_check() {
        verify().unwrap();
    }

    #[test]
    fn every_finding_type_has_a_sheet() {
        for finding_type in FindingType::ALL {
            let sheet = sheet_for_type(finding_type);
            assert_eq!(sheet.finding_type, Some(finding_type));
        }
    }

    #[test]
    fn server_header_is_distinct_from_linked_name() {
        let sheet = sheet_for_type(FindingType::LinkedServer);
        let headers: Vec<&str> = sheet.columns.iter().map(|c| c.header).collect();
        assert!(headers.contains(&"Server"));
        assert!(headers.contains(&"Linked Name"));
    }

    #[test]
    fn review_status_dropdown_matches_contract() {
        assert_eq!(REVIEW_STATUS_VALUES, &["Exception", "Needs Review", ""]);
    }
}
