//! Persisted records and aggregate views of the audit store.

pub mod facts;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    ActionStatus, ChangeType, FindingStatus, FindingType, ReviewStatus, Risk, RunStatus, RunType,
};

/// A single execution of baseline or sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub id: i64,
    pub organization: String,
    pub audit_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub run_type: RunType,
    /// Links a sync back to its baseline.
    pub parent_run_id: Option<i64>,
    pub config_hash: String,
    /// Set when workbook regeneration failed after a committed sync; the next
    /// sync regenerates unconditionally.
    pub report_stale: bool,
    /// SHA-256 of the final workbook, recorded at finalize.
    pub snapshot_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: i64,
    pub hostname: String,
}

/// One SQL Server instance on a server. The default instance is stored
/// explicitly as `DEFAULT`; a port-only target keeps its port so two
/// hostname-less targets stay distinguishable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: i64,
    pub server_id: i64,
    pub instance_name: String,
    pub port: Option<u16>,
}

/// A single check outcome for one entity, in one run. Immutable once the run
/// completes; status changes across runs are the sole transition signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: i64,
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
    /// Documented-exception state frozen onto this run's row once the
    /// annotation sync has run; the next sync diffs exception transitions
    /// against it.
    pub has_exception: bool,
    pub exception_text: String,
}

/// A finding joined with its instance identity, as the diff engine and the
/// report writer consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingRow {
    pub finding: Finding,
    pub server: String,
    pub instance: String,
}

impl FindingRow {
    /// `server|instance` reference matching the scanned-instance set.
    pub fn instance_ref(&self) -> String {
        crate::identity::instance_ref(&self.server, &self.instance)
    }
}

/// Operator input attached to a row, persisting across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    pub row_uuid: Option<Uuid>,
    pub entity_type: FindingType,
    pub entity_key: String,
    pub notes: String,
    pub purpose: String,
    pub justification: String,
    pub review_status: ReviewStatus,
    /// Operator-entered review date; preserved verbatim when unparseable.
    pub last_reviewed: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub modified_by: String,
}

impl Annotation {
    /// A row is a documented exception iff its finding is an open
    /// discrepancy AND the operator supplied a justification or set the
    /// review status to Exception. A justification on a PASS row is a note.
    pub fn is_documented_exception(&self, status: FindingStatus) -> bool {
        status.is_discrepancy()
            && (!self.justification.trim().is_empty()
                || self.review_status == ReviewStatus::Exception)
    }

    /// Whether anything operator-visible is filled in.
    pub fn has_content(&self) -> bool {
        !self.notes.trim().is_empty()
            || !self.purpose.trim().is_empty()
            || !self.justification.trim().is_empty()
            || self.review_status != ReviewStatus::None
            || self.last_reviewed.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

/// Append-only history of classified transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: i64,
    pub initial_run_id: i64,
    pub sync_run_id: Option<i64>,
    pub entity_key: String,
    pub finding_type: FindingType,
    pub change_type: ChangeType,
    pub status: ActionStatus,
    /// First detection time; never rewritten by the system.
    pub action_date: DateTime<Utc>,
    pub user_date_override: Option<NaiveDate>,
    pub description: String,
    pub notes: Option<String>,
}

impl ActionLogEntry {
    /// Date shown to the operator: their override wins over first detection.
    pub fn display_date(&self) -> NaiveDate {
        self.user_date_override
            .unwrap_or_else(|| self.action_date.date_naive())
    }
}

/// Aggregate counts. Produced only by the stats service; every consumer
/// (console, cover sheet, finalize report) reads this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_findings: i64,
    /// FAIL/WARN without a documented exception.
    pub active_issues: i64,
    pub documented_exceptions: i64,
    pub compliant: i64,
    pub fixed_since_baseline: i64,
    pub regressions_since_baseline: i64,
    pub new_issues_since_baseline: i64,
    pub fixed_since_last: i64,
    pub regressions_since_last: i64,
    pub new_issues_since_last: i64,
    pub instances_scanned: i64,
    pub instances_unreachable: i64,
}

/// Per-target collection outcome surfaced on the Instances sheet and in the
/// run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub target_id: String,
    pub server: String,
    pub instance: String,
    pub scanned: bool,
    pub error: Option<String>,
}

impl ScanOutcome {
    pub fn instance_ref(&self) -> String {
        crate::identity::instance_ref(&self.server, &self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn annotation(justification: &str, review: ReviewStatus) -> Annotation {
        Annotation {
            id: 1,
            row_uuid: None,
            entity_type: FindingType::Login,
            entity_key: "login|srv1|default|app_reader".into(),
            notes: String::new(),
            purpose: String::new(),
            justification: justification.into(),
            review_status: review,
            last_reviewed: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            modified_by: "test".into(),
        }
    }

    #[test]
    fn justification_on_fail_is_exception() {
        let a = annotation("Approved per CAB-482", ReviewStatus::None);
        assert!(a.is_documented_exception(FindingStatus::Fail));
        assert!(a.is_documented_exception(FindingStatus::Warn));
    }

    #[test]
    fn justification_on_pass_is_a_note() {
        let a = annotation("Business-critical DB", ReviewStatus::None);
        assert!(!a.is_documented_exception(FindingStatus::Pass));
        let b = annotation("", ReviewStatus::Exception);
        assert!(!b.is_documented_exception(FindingStatus::Pass));
    }

    #[test]
    fn review_status_alone_marks_exception() {
        let a = annotation("", ReviewStatus::Exception);
        assert!(a.is_documented_exception(FindingStatus::Fail));
        let b = annotation("   ", ReviewStatus::None);
        assert!(!b.is_documented_exception(FindingStatus::Fail));
    }

    #[test]
    fn display_date_prefers_override() {
        let entry = ActionLogEntry {
            id: 1,
            initial_run_id: 1,
            sync_run_id: Some(2),
            entity_key: "config|srv1|default|xp_cmdshell".into(),
            finding_type: FindingType::Config,
            change_type: ChangeType::Fixed,
            status: ActionStatus::Closed,
            action_date: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            user_date_override: Some(NaiveDate::from_ymd_opt(2025, 2, 20).unwrap()),
            description: String::new(),
            notes: None,
        };
        assert_eq!(entry.display_date(), NaiveDate::from_ymd_opt(2025, 2, 20).unwrap());
    }
}
