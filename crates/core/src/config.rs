//! Configuration loading and validation.
//!
//! Settings are loaded in order of precedence: the named TOML file (or
//! `sqlwarden.toml` in the working directory), then environment variables
//! prefixed `SQLWARDEN_`. Validation fails fast before any run starts.
//!
//! Credentials are never stored here: SQL-auth targets carry a
//! `credential_ref` resolved by the external credential store.

use std::collections::BTreeMap;

use config::{Environment, File};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AuditError, Result};
use crate::types::Risk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Integrated,
    Sql,
}

/// One SQL Server target to audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub server: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    pub auth: AuthMode,
    #[serde(default)]
    pub username: Option<String>,
    /// Id into the external encrypted credential store.
    #[serde(default)]
    pub credential_ref: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TargetConfig {
    /// Instance label used everywhere downstream; the default instance is
    /// explicit so keys never depend on an absent name.
    pub fn instance_label(&self) -> String {
        match &self.instance {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => match self.port {
                Some(port) => format!("PORT{}", port),
                None => "DEFAULT".to_string(),
            },
        }
    }

    pub fn display(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("{}\\{}", self.server, self.instance_label()))
    }
}

/// Declared requirement for one `sp_configure` setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingRule {
    pub required: i64,
    pub risk: Risk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupThresholds {
    /// FAIL when the last full backup is older than this many days.
    #[serde(default = "default_full_backup_max_days")]
    pub full_backup_max_days: i64,
    /// FAIL when a FULL-recovery database has no log backup for this long.
    #[serde(default = "default_log_backup_max_days")]
    pub log_backup_max_days: i64,
}

impl Default for BackupThresholds {
    fn default() -> Self {
        Self {
            full_backup_max_days: default_full_backup_max_days(),
            log_backup_max_days: default_log_backup_max_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel_tasks: usize,
    #[serde(default = "default_sql_timeout")]
    pub sql_command_timeout_seconds: u64,
    #[serde(default = "default_psremoting_timeout")]
    pub psremoting_timeout_seconds: u64,
    #[serde(default = "default_target_timeout")]
    pub target_timeout_seconds: u64,
    #[serde(default = "default_sync_cap_minutes")]
    pub sync_wall_clock_minutes: u64,
    #[serde(default = "default_retries")]
    pub collection_retries: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel(),
            sql_command_timeout_seconds: default_sql_timeout(),
            psremoting_timeout_seconds: default_psremoting_timeout(),
            target_timeout_seconds: default_target_timeout(),
            sync_wall_clock_minutes: default_sync_cap_minutes(),
            collection_retries: default_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Days within which a disappeared-and-returned entity re-binds to its
    /// prior UUID instead of minting a new one.
    #[serde(default = "default_resurrection_window")]
    pub resurrection_window_days: i64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            resurrection_window_days: default_resurrection_window(),
        }
    }
}

/// Main configuration for an audit cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub organization: String,
    pub audit_year: i32,
    /// Defaults to today when absent.
    #[serde(default)]
    pub audit_date: Option<chrono::NaiveDate>,
    /// Path of the SQLite store file.
    #[serde(default = "default_store_path")]
    pub store_path: String,
    /// Path of the generated workbook.
    #[serde(default = "default_report_path")]
    pub report_path: String,
    /// Expected build per version family, e.g. `"2019" = "15.0.4375.4"`.
    #[serde(default)]
    pub expected_builds: BTreeMap<String, String>,
    /// Required `sp_configure` values keyed by setting name.
    #[serde(default)]
    pub security_settings: BTreeMap<String, SettingRule>,
    #[serde(default)]
    pub backup_thresholds: BackupThresholds,
    #[serde(default)]
    pub feature_flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl AuditConfig {
    /// Load configuration from the given file (default `sqlwarden.toml`)
    /// overlaid with `SQLWARDEN_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or("sqlwarden");

        let builder = config::Config::builder()
            .add_source(File::with_name(file).required(path.is_some()))
            .add_source(Environment::with_prefix("SQLWARDEN").separator("__"));

        let raw = builder.build()?;
        let loaded: AuditConfig = raw.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Fail fast on configuration the audit cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(AuditError::config_invalid("organization must not be empty"));
        }
        if self.performance.max_parallel_tasks == 0 {
            return Err(AuditError::config_invalid(
                "performance.max_parallel_tasks must be at least 1",
            ));
        }
        if self.identity.resurrection_window_days < 0 {
            return Err(AuditError::config_invalid(
                "identity.resurrection_window_days must not be negative",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err(AuditError::config_invalid("target id must not be empty"));
            }
            if target.server.trim().is_empty() {
                return Err(AuditError::config_invalid(format!(
                    "target '{}': server must not be empty",
                    target.id
                )));
            }
            if target.auth == AuthMode::Sql && target.credential_ref.is_none() {
                return Err(AuditError::config_invalid(format!(
                    "target '{}' uses sql auth but references no credential",
                    target.id
                )));
            }
            // Two port-only targets on the same host must stay distinguishable.
            let identity = (
                target.server.to_lowercase(),
                target.instance_label().to_lowercase(),
            );
            if !seen.insert(identity) {
                return Err(AuditError::config_invalid(format!(
                    "duplicate target {}\\{}",
                    target.server,
                    target.instance_label()
                )));
            }
        }
        Ok(())
    }

    pub fn audit_date(&self) -> chrono::NaiveDate {
        self.audit_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    pub fn enabled_targets(&self) -> Vec<&TargetConfig> {
        self.targets.iter().filter(|t| t.enabled).collect()
    }

    /// Stable hash of the effective configuration, recorded on each run so a
    /// later reader can tell whether the rule set changed mid-cycle.
    pub fn config_hash(&self) -> String {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&serialized);
        format!("{:x}", digest)
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_full_backup_max_days() -> i64 {
    7
}

fn default_log_backup_max_days() -> i64 {
    1
}

fn default_max_parallel() -> usize {
    5
}

fn default_sql_timeout() -> u64 {
    60
}

fn default_psremoting_timeout() -> u64 {
    120
}

fn default_target_timeout() -> u64 {
    120
}

fn default_sync_cap_minutes() -> u64 {
    60
}

fn default_retries() -> u32 {
    2
}

fn default_resurrection_window() -> i64 {
    180
}

fn default_store_path() -> String {
    "sqlwarden.db".to_string()
}

fn default_report_path() -> String {
    "sqlwarden-report.xlsx".to_string()
}
