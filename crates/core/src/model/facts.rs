//! Collected security facts, one tagged variant per finding type.
//!
//! This is the collection contract: whatever gathers facts from a SQL Server
//! instance (live queries, an offline agent dump) must deliver one
//! [`InstanceAudit`] per target in exactly this shape. The classifier is a
//! set of pure functions over these variants and never sees the wire.

use serde::{Deserialize, Serialize};

use crate::types::FindingType;

/// Everything collected from one instance in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceAudit {
    pub server: String,
    /// `DEFAULT` for the default instance.
    pub instance: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub facts: Vec<FindingFacts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginAuth {
    Sql,
    Windows,
    WindowsGroup,
    Certificate,
    AsymmetricKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Engine,
    Agent,
    Browser,
    FullText,
    ReportingServices,
    IntegrationServices,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    Paused,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    Server,
    Database,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::Server => "server",
            PermissionScope::Database => "database",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Grant,
    GrantWithGrant,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerScope {
    Server,
    Database,
}

impl TriggerScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerScope::Server => "server",
            TriggerScope::Database => "database",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionKeyType {
    ServiceMasterKey,
    DatabaseMasterKey,
    Certificate,
    SymmetricKey,
    AsymmetricKey,
    Tde,
}

impl EncryptionKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionKeyType::ServiceMasterKey => "service_master_key",
            EncryptionKeyType::DatabaseMasterKey => "database_master_key",
            EncryptionKeyType::Certificate => "certificate",
            EncryptionKeyType::SymmetricKey => "symmetric_key",
            EncryptionKeyType::AsymmetricKey => "asymmetric_key",
            EncryptionKeyType::Tde => "tde",
        }
    }
}

/// One collected fact, tagged by the finding type it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingFacts {
    InstanceInfo {
        /// e.g. "2019", "2022".
        version_family: String,
        /// Full build, e.g. "15.0.4375.4".
        build: String,
        edition: String,
        product_level: String,
    },
    SaAccount {
        principal_id: i32,
        current_name: String,
        enabled: bool,
    },
    Login {
        login_name: String,
        auth: LoginAuth,
        enabled: bool,
        check_policy: bool,
        check_expiration: bool,
        default_database: String,
        is_sysadmin: bool,
        password_last_set_days: Option<i64>,
    },
    ServerRoleMember {
        role: String,
        member: String,
    },
    ConfigSetting {
        setting: String,
        value_in_use: i64,
    },
    Service {
        service_name: String,
        service_kind: ServiceKind,
        state: ServiceState,
        start_mode: String,
        account: String,
    },
    Database {
        database: String,
        owner: String,
        trustworthy: bool,
        is_system: bool,
        recovery_model: String,
        state: String,
    },
    DbUser {
        database: String,
        user_name: String,
        has_connect: bool,
        is_system_database: bool,
    },
    DbRoleMember {
        database: String,
        role: String,
        member: String,
    },
    OrphanedUser {
        database: String,
        user_name: String,
    },
    Permission {
        scope: PermissionScope,
        database: Option<String>,
        grantee: String,
        permission: String,
        target: String,
        state: PermissionState,
    },
    LinkedServer {
        linked_name: String,
        provider: String,
        data_source: String,
        remote_login: Option<String>,
        uses_self_mapping: bool,
        rpc_out: bool,
    },
    Trigger {
        scope: TriggerScope,
        database: Option<String>,
        trigger_name: String,
        event: String,
        enabled: bool,
    },
    Backup {
        database: String,
        recovery_model: String,
        days_since_full: Option<i64>,
        days_since_log: Option<i64>,
    },
    ClientProtocol {
        protocol: String,
        enabled: bool,
    },
    Encryption {
        key_type: EncryptionKeyType,
        key_name: String,
        algorithm: String,
        key_length: Option<i32>,
    },
    AuditSettings {
        setting: String,
        value: String,
    },
}

impl FindingFacts {
    pub fn finding_type(&self) -> FindingType {
        match self {
            FindingFacts::InstanceInfo { .. } => FindingType::InstanceInfo,
            FindingFacts::SaAccount { .. } => FindingType::SaAccount,
            FindingFacts::Login { .. } => FindingType::Login,
            FindingFacts::ServerRoleMember { .. } => FindingType::ServerRoleMember,
            FindingFacts::ConfigSetting { .. } => FindingType::Config,
            FindingFacts::Service { .. } => FindingType::Service,
            FindingFacts::Database { .. } => FindingType::Database,
            FindingFacts::DbUser { .. } => FindingType::DbUser,
            FindingFacts::DbRoleMember { .. } => FindingType::DbRoleMember,
            FindingFacts::OrphanedUser { .. } => FindingType::OrphanedUser,
            FindingFacts::Permission { .. } => FindingType::Permission,
            FindingFacts::LinkedServer { .. } => FindingType::LinkedServer,
            FindingFacts::Trigger { .. } => FindingType::Trigger,
            FindingFacts::Backup { .. } => FindingType::Backup,
            FindingFacts::ClientProtocol { .. } => FindingType::ClientProtocol,
            FindingFacts::Encryption { .. } => FindingType::Encryption,
            FindingFacts::AuditSettings { .. } => FindingType::AuditSettings,
        }
    }

    /// Type-specific key segments, appended after `server|instance`.
    /// Optional segments (database on server-scoped rows) stay as empty
    /// strings so the segment count per type never varies.
    pub fn key_tail(&self) -> Vec<String> {
        match self {
            FindingFacts::InstanceInfo { .. } => vec![],
            FindingFacts::SaAccount { current_name, .. } => vec![current_name.clone()],
            FindingFacts::Login { login_name, .. } => vec![login_name.clone()],
            FindingFacts::ServerRoleMember { role, member } => {
                vec![role.clone(), member.clone()]
            }
            FindingFacts::ConfigSetting { setting, .. } => vec![setting.clone()],
            FindingFacts::Service { service_name, .. } => vec![service_name.clone()],
            FindingFacts::Database { database, .. } => vec![database.clone()],
            FindingFacts::DbUser {
                database, user_name, ..
            } => vec![database.clone(), user_name.clone()],
            FindingFacts::DbRoleMember {
                database,
                role,
                member,
            } => vec![database.clone(), role.clone(), member.clone()],
            FindingFacts::OrphanedUser {
                database, user_name, ..
            } => vec![database.clone(), user_name.clone()],
            FindingFacts::Permission {
                scope,
                database,
                grantee,
                permission,
                target,
                ..
            } => vec![
                scope.as_str().to_string(),
                database.clone().unwrap_or_default(),
                grantee.clone(),
                permission.clone(),
                target.clone(),
            ],
            FindingFacts::LinkedServer { linked_name, .. } => vec![linked_name.clone()],
            FindingFacts::Trigger {
                scope,
                database,
                trigger_name,
                event,
                ..
            } => vec![
                scope.as_str().to_string(),
                database.clone().unwrap_or_default(),
                trigger_name.clone(),
                event.clone(),
            ],
            FindingFacts::Backup {
                database,
                recovery_model,
                ..
            } => vec![database.clone(), recovery_model.clone()],
            FindingFacts::ClientProtocol { protocol, .. } => vec![protocol.clone()],
            FindingFacts::Encryption {
                key_type, key_name, ..
            } => vec![key_type.as_str().to_string(), key_name.clone()],
            FindingFacts::AuditSettings { setting, .. } => vec![setting.clone()],
        }
    }
}
