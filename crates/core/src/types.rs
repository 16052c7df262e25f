use serde::{Deserialize, Serialize};

/// Outcome of a single security check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingStatus {
    Pass,
    Fail,
    Warn,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Pass => "PASS",
            FindingStatus::Fail => "FAIL",
            FindingStatus::Warn => "WARN",
        }
    }

    /// FAIL and WARN both represent an open discrepancy.
    pub fn is_discrepancy(&self) -> bool {
        matches!(self, FindingStatus::Fail | FindingStatus::Warn)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PASS" => Some(FindingStatus::Pass),
            "FAIL" => Some(FindingStatus::Fail),
            "WARN" => Some(FindingStatus::Warn),
            _ => None,
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk rating attached to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Critical => "critical",
            Risk::High => "high",
            Risk::Medium => "medium",
            Risk::Low => "low",
            Risk::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Risk::Critical),
            "high" => Some(Risk::High),
            "medium" => Some(Risk::Medium),
            "low" => Some(Risk::Low),
            "info" => Some(Risk::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Baseline,
    Sync,
    Finalize,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Baseline => "baseline",
            RunType::Sync => "sync",
            RunType::Finalize => "finalize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Some(RunType::Baseline),
            "sync" => Some(RunType::Sync),
            "finalize" => Some(RunType::Finalize),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Finalized,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "finalized" => Some(RunStatus::Finalized),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified transition of one entity between two runs.
///
/// Only the logged variants ever reach the action log; `StillFailing`,
/// `NoChange` and `Unknown` are tallied but never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    NewIssue,
    Fixed,
    Regression,
    ExceptionAdded,
    ExceptionRemoved,
    ExceptionUpdated,
    StillFailing,
    NoChange,
    Unknown,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::NewIssue => "NEW_ISSUE",
            ChangeType::Fixed => "FIXED",
            ChangeType::Regression => "REGRESSION",
            ChangeType::ExceptionAdded => "EXCEPTION_ADDED",
            ChangeType::ExceptionRemoved => "EXCEPTION_REMOVED",
            ChangeType::ExceptionUpdated => "EXCEPTION_UPDATED",
            ChangeType::StillFailing => "STILL_FAILING",
            ChangeType::NoChange => "NO_CHANGE",
            ChangeType::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEW_ISSUE" => Some(ChangeType::NewIssue),
            "FIXED" => Some(ChangeType::Fixed),
            "REGRESSION" => Some(ChangeType::Regression),
            "EXCEPTION_ADDED" => Some(ChangeType::ExceptionAdded),
            "EXCEPTION_REMOVED" => Some(ChangeType::ExceptionRemoved),
            "EXCEPTION_UPDATED" => Some(ChangeType::ExceptionUpdated),
            "STILL_FAILING" => Some(ChangeType::StillFailing),
            "NO_CHANGE" => Some(ChangeType::NoChange),
            "UNKNOWN" => Some(ChangeType::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolution state carried on an action log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Open,
    Closed,
    Exception,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Open => "open",
            ActionStatus::Closed => "closed",
            ActionStatus::Exception => "exception",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(ActionStatus::Open),
            "closed" => Some(ActionStatus::Closed),
            "exception" => Some(ActionStatus::Exception),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operator review state read from the workbook dropdown.
///
/// Anything outside the known set is treated as empty on read and rewritten
/// to a valid value on the next regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReviewStatus {
    #[default]
    #[serde(rename = "")]
    None,
    Exception,
    #[serde(rename = "Needs Review")]
    NeedsReview,
    Reviewed,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::None => "",
            ReviewStatus::Exception => "Exception",
            ReviewStatus::NeedsReview => "Needs Review",
            ReviewStatus::Reviewed => "Reviewed",
            ReviewStatus::Rejected => "Rejected",
        }
    }

    /// Lenient parse: unknown values collapse to `None`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "exception" => ReviewStatus::Exception,
            "needs review" => ReviewStatus::NeedsReview,
            "reviewed" => ReviewStatus::Reviewed,
            "rejected" => ReviewStatus::Rejected,
            _ => ReviewStatus::None,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every category of entity the auditor checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    InstanceInfo,
    SaAccount,
    Login,
    ServerRoleMember,
    Config,
    Service,
    Database,
    DbUser,
    DbRoleMember,
    OrphanedUser,
    Permission,
    LinkedServer,
    Trigger,
    Backup,
    ClientProtocol,
    Encryption,
    AuditSettings,
}

impl FindingType {
    pub const ALL: [FindingType; 17] = [
        FindingType::InstanceInfo,
        FindingType::SaAccount,
        FindingType::Login,
        FindingType::ServerRoleMember,
        FindingType::Config,
        FindingType::Service,
        FindingType::Database,
        FindingType::DbUser,
        FindingType::DbRoleMember,
        FindingType::OrphanedUser,
        FindingType::Permission,
        FindingType::LinkedServer,
        FindingType::Trigger,
        FindingType::Backup,
        FindingType::ClientProtocol,
        FindingType::Encryption,
        FindingType::AuditSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::InstanceInfo => "instance_info",
            FindingType::SaAccount => "sa_account",
            FindingType::Login => "login",
            FindingType::ServerRoleMember => "server_role_member",
            FindingType::Config => "config",
            FindingType::Service => "service",
            FindingType::Database => "database",
            FindingType::DbUser => "db_user",
            FindingType::DbRoleMember => "db_role_member",
            FindingType::OrphanedUser => "orphaned_user",
            FindingType::Permission => "permission",
            FindingType::LinkedServer => "linked_server",
            FindingType::Trigger => "trigger",
            FindingType::Backup => "backup",
            FindingType::ClientProtocol => "client_protocol",
            FindingType::Encryption => "encryption",
            FindingType::AuditSettings => "audit_settings",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim().to_lowercase();
        FindingType::ALL.iter().copied().find(|t| t.as_str() == needle)
    }
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a classified transition contributes to the aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tally {
    Active,
    Exception,
    Compliant,
    /// Instance not scanned this run; prior state is preserved untouched.
    Preserve,
}
