use thiserror::Error;

use crate::types::FindingType;

/// Audit-wide error type.
///
/// Per-target collection failures are recovered locally by the runner; every
/// other variant aborts the operation that raised it. The CLI maps variants
/// to process exit codes via [`AuditError::exit_code`].
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("audit store is locked by another process: {path}")]
    StoreLocked { path: String },

    #[error("audit store is corrupt: {reason}")]
    StoreCorrupt { reason: String },

    #[error("workbook is open in another program: {path}")]
    WorkbookLocked { path: String },

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("target unreachable: {target}: {reason}")]
    TargetUnreachable { target: String, reason: String },

    #[error("collector emitted duplicate {finding_type} finding '{entity_key}' in run {run_id}")]
    CollectorDuplicate {
        run_id: i64,
        finding_type: FindingType,
        entity_key: String,
    },

    #[error("run {run_id} is finalized and cannot be modified")]
    FinalizedRun { run_id: i64 },

    #[error("finalize refused: {active_issues} active issue(s) without documented exception")]
    FinalizeRefused { active_issues: i64 },

    #[error("no baseline run exists; run a baseline audit first")]
    NoBaseline,

    #[error("run not found: {run_id}")]
    RunNotFound { run_id: i64 },

    #[error("a run is already in progress for {organization} on {audit_date}")]
    RunInProgress {
        organization: String,
        audit_date: String,
    },

    #[error("unparseable date '{original}' preserved as text")]
    DateParse { original: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, AuditError>;

impl AuditError {
    /// Process exit code for the CLI surface.
    ///
    /// 0 success, 1 generic, 2 configuration, 3 connectivity, 4 file
    /// lock/conflict, 5 finalize refused, 130 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            AuditError::ConfigInvalid { .. } | AuditError::Config(_) => 2,
            AuditError::TargetUnreachable { .. } => 3,
            AuditError::WorkbookLocked { .. } => 4,
            AuditError::FinalizeRefused { .. } => 5,
            AuditError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Errors that abort the whole sync rather than a single target.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            AuditError::TargetUnreachable { .. } | AuditError::DateParse { .. }
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AuditError::Internal {
            message: message.into(),
        }
    }

    pub fn config_invalid(reason: impl Into<String>) -> Self {
        AuditError::ConfigInvalid {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_cli_contract() {
        assert_eq!(AuditError::config_invalid("x").exit_code(), 2);
        assert_eq!(
            AuditError::TargetUnreachable {
                target: "srv1".into(),
                reason: "timeout".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            AuditError::WorkbookLocked { path: "r.xlsx".into() }.exit_code(),
            4
        );
        assert_eq!(
            AuditError::FinalizeRefused { active_issues: 2 }.exit_code(),
            5
        );
        assert_eq!(AuditError::Cancelled.exit_code(), 130);
        assert_eq!(
            AuditError::StoreLocked { path: "a.db".into() }.exit_code(),
            1
        );
    }

    #[test]
    fn target_errors_are_not_structural() {
        let err = AuditError::TargetUnreachable {
            target: "srv2".into(),
            reason: "refused".into(),
        };
        assert!(!err.is_structural());
        assert!(AuditError::internal("boom").is_structural());
    }
}
