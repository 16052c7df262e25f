//! Security requirement rules, one pure function per finding type.
//!
//! Each rule maps collected facts to a status, a risk rating, and operator
//! text. Rules read declared requirements (required `sp_configure` values,
//! expected builds, backup thresholds) from [`RuleContext`] and nothing
//! else; they never touch the store or the workbook.

use std::collections::BTreeMap;

use sqlwarden_core::config::{BackupThresholds, SettingRule};
use sqlwarden_core::model::facts::{
    EncryptionKeyType, FindingFacts, LoginAuth, PermissionScope, PermissionState, ServiceKind,
    ServiceState,
};
use sqlwarden_core::types::{FindingStatus, Risk};

#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub security_settings: &'a BTreeMap<String, SettingRule>,
    pub expected_builds: &'a BTreeMap<String, String>,
    pub backup_thresholds: &'a BackupThresholds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: FindingStatus,
    pub risk: Risk,
    pub description: String,
    pub recommendation: String,
}

fn pass(description: impl Into<String>) -> Verdict {
    Verdict {
        status: FindingStatus::Pass,
        risk: Risk::Info,
        description: description.into(),
        recommendation: String::new(),
    }
}

fn fail(risk: Risk, description: impl Into<String>, recommendation: impl Into<String>) -> Verdict {
    Verdict {
        status: FindingStatus::Fail,
        risk,
        description: description.into(),
        recommendation: recommendation.into(),
    }
}

fn warn(risk: Risk, description: impl Into<String>, recommendation: impl Into<String>) -> Verdict {
    Verdict {
        status: FindingStatus::Warn,
        risk,
        description: description.into(),
        recommendation: recommendation.into(),
    }
}

/// System principals (`##MS_...##`) are excluded from discrepancy checks.
fn is_system_principal(name: &str) -> bool {
    name.starts_with("##") && name.ends_with("##")
}

pub fn classify(facts: &FindingFacts, ctx: &RuleContext<'_>) -> Verdict {
    match facts {
        FindingFacts::SaAccount {
            current_name,
            enabled,
            ..
        } => rule_sa_account(current_name, *enabled),
        FindingFacts::Login {
            login_name,
            auth,
            enabled,
            check_policy,
            check_expiration,
            default_database,
            is_sysadmin,
            ..
        } => rule_login(
            login_name,
            *auth,
            *enabled,
            *check_policy,
            *check_expiration,
            default_database,
            *is_sysadmin,
        ),
        FindingFacts::ServerRoleMember { role, member } => rule_server_role_member(role, member),
        FindingFacts::ConfigSetting {
            setting,
            value_in_use,
        } => rule_config(setting, *value_in_use, ctx.security_settings),
        FindingFacts::Service {
            service_name,
            service_kind,
            state,
            start_mode,
            account,
        } => rule_service(service_name, *service_kind, *state, start_mode, account),
        FindingFacts::Database {
            database,
            owner,
            trustworthy,
            is_system,
            ..
        } => rule_database(database, owner, *trustworthy, *is_system),
        FindingFacts::DbUser {
            database,
            user_name,
            has_connect,
            is_system_database,
        } => rule_db_user(database, user_name, *has_connect, *is_system_database),
        FindingFacts::DbRoleMember {
            database,
            role,
            member,
        } => rule_db_role_member(database, role, member),
        FindingFacts::OrphanedUser {
            database, user_name, ..
        } => rule_orphaned_user(database, user_name),
        FindingFacts::Permission {
            scope,
            grantee,
            permission,
            target,
            state,
            ..
        } => rule_permission(*scope, grantee, permission, target, *state),
        FindingFacts::LinkedServer {
            linked_name,
            remote_login,
            uses_self_mapping,
            rpc_out,
            ..
        } => rule_linked_server(linked_name, remote_login.as_deref(), *uses_self_mapping, *rpc_out),
        FindingFacts::Trigger {
            trigger_name,
            event,
            enabled,
            ..
        } => rule_trigger(trigger_name, event, *enabled),
        FindingFacts::Backup {
            database,
            recovery_model,
            days_since_full,
            days_since_log,
        } => rule_backup(
            database,
            recovery_model,
            *days_since_full,
            *days_since_log,
            ctx.backup_thresholds,
        ),
        FindingFacts::ClientProtocol { protocol, enabled } => rule_client_protocol(protocol, *enabled),
        FindingFacts::Encryption {
            key_type,
            key_name,
            algorithm,
            key_length,
        } => rule_encryption(*key_type, key_name, algorithm, *key_length),
        FindingFacts::AuditSettings { setting, value } => rule_audit_settings(setting, value),
        FindingFacts::InstanceInfo {
            version_family,
            build,
            ..
        } => rule_instance_info(version_family, build, ctx.expected_builds),
    }
}

fn rule_sa_account(current_name: &str, enabled: bool) -> Verdict {
    if !enabled {
        return pass(format!("builtin administrator login '{}' is disabled", current_name));
    }
    if current_name.eq_ignore_ascii_case("sa") {
        fail(
            Risk::Critical,
            "the sa login is enabled under its well-known name",
            "disable the sa login, or rename it and disable interactive use",
        )
    } else {
        warn(
            Risk::High,
            format!("builtin administrator login renamed to '{}' but still enabled", current_name),
            "disable the renamed sa login",
        )
    }
}

fn rule_login(
    login_name: &str,
    auth: LoginAuth,
    enabled: bool,
    check_policy: bool,
    check_expiration: bool,
    default_database: &str,
    is_sysadmin: bool,
) -> Verdict {
    if is_system_principal(login_name) {
        return pass(format!("system login '{}'", login_name));
    }
    if auth == LoginAuth::Sql && !check_policy {
        return fail(
            Risk::High,
            format!("SQL login '{}' does not enforce the Windows password policy", login_name),
            "enable CHECK_POLICY for the login",
        );
    }
    if is_sysadmin
        && !default_database.eq_ignore_ascii_case("master")
        && !default_database.eq_ignore_ascii_case("tempdb")
    {
        return warn(
            Risk::Medium,
            format!(
                "sysadmin login '{}' defaults to user database '{}'",
                login_name, default_database
            ),
            "point sysadmin logins at master",
        );
    }
    if auth == LoginAuth::Sql && is_sysadmin && !check_expiration {
        return warn(
            Risk::Medium,
            format!("sysadmin SQL login '{}' has no password expiration", login_name),
            "enable CHECK_EXPIRATION for privileged SQL logins",
        );
    }
    if !enabled {
        return pass(format!("login '{}' is disabled", login_name));
    }
    pass(format!("login '{}' meets policy", login_name))
}

const SENSITIVE_SERVER_ROLES: &[&str] = &[
    "sysadmin",
    "securityadmin",
    "serveradmin",
    "setupadmin",
    "processadmin",
];

fn rule_server_role_member(role: &str, member: &str) -> Verdict {
    if is_system_principal(member) {
        return pass(format!("system principal '{}' in role '{}'", member, role));
    }
    let role_lc = role.to_lowercase();
    if role_lc == "sysadmin" && member.to_lowercase().contains("builtin\\administrators") {
        return fail(
            Risk::High,
            "local Administrators group holds sysadmin",
            "remove BUILTIN\\Administrators from the sysadmin role",
        );
    }
    if SENSITIVE_SERVER_ROLES.contains(&role_lc.as_str()) {
        return warn(
            Risk::High,
            format!("'{}' is a member of the {} server role", member, role),
            "confirm the membership is required and documented",
        );
    }
    pass(format!("'{}' in role '{}'", member, role))
}

fn rule_config(
    setting: &str,
    value_in_use: i64,
    rules: &BTreeMap<String, SettingRule>,
) -> Verdict {
    let Some(rule) = rules.get(setting) else {
        return pass(format!("'{}' has no declared requirement (value {})", setting, value_in_use));
    };
    if value_in_use == rule.required {
        return pass(format!("'{}' = {} as required", setting, value_in_use));
    }
    let description = format!(
        "'{}' is {} but the requirement declares {}",
        setting, value_in_use, rule.required
    );
    let recommendation = format!(
        "sp_configure '{}', {}; RECONFIGURE",
        setting, rule.required
    );
    match rule.risk {
        Risk::Critical | Risk::High => fail(rule.risk, description, recommendation),
        _ => warn(rule.risk, description, recommendation),
    }
}

fn rule_service(
    service_name: &str,
    kind: ServiceKind,
    state: ServiceState,
    start_mode: &str,
    account: &str,
) -> Verdict {
    // Stopped agent on an audited instance is a warning, not a failure.
    if kind == ServiceKind::Agent && state != ServiceState::Running {
        return warn(
            Risk::Medium,
            format!("SQL Server Agent '{}' is not running", service_name),
            "start the agent so maintenance and backup jobs run",
        );
    }
    if kind == ServiceKind::Browser && state == ServiceState::Running {
        return warn(
            Risk::Medium,
            "SQL Browser service is running",
            "disable the browser service unless named-instance discovery is required",
        );
    }
    if matches!(kind, ServiceKind::Engine | ServiceKind::Agent)
        && account.eq_ignore_ascii_case("localsystem")
    {
        return warn(
            Risk::Medium,
            format!("service '{}' runs as LocalSystem", service_name),
            "use a low-privilege service account",
        );
    }
    if state == ServiceState::Stopped && start_mode.eq_ignore_ascii_case("disabled") {
        return pass(format!("service '{}' is disabled", service_name));
    }
    pass(format!("service '{}' is {:?}", service_name, state))
}

const SYSTEM_DATABASES: &[&str] = &["master", "model", "msdb", "tempdb"];

fn rule_database(database: &str, owner: &str, trustworthy: bool, is_system: bool) -> Verdict {
    let system = is_system || SYSTEM_DATABASES.contains(&database.to_lowercase().as_str());
    if system {
        return pass(format!("system database '{}'", database));
    }
    if trustworthy {
        return fail(
            Risk::High,
            format!("user database '{}' is marked TRUSTWORTHY", database),
            "ALTER DATABASE ... SET TRUSTWORTHY OFF",
        );
    }
    if !owner.eq_ignore_ascii_case("sa") {
        return warn(
            Risk::Low,
            format!("database '{}' is owned by '{}'", database, owner),
            "transfer ownership to sa",
        );
    }
    pass(format!("database '{}' meets policy", database))
}

fn rule_db_user(
    database: &str,
    user_name: &str,
    has_connect: bool,
    is_system_database: bool,
) -> Verdict {
    let db_lc = database.to_lowercase();
    if user_name.eq_ignore_ascii_case("guest") && has_connect {
        // guest stays enabled in msdb and tempdb by design of the engine.
        if is_system_database && (db_lc == "msdb" || db_lc == "tempdb") {
            return pass(format!("guest enabled in '{}'", database));
        }
        return fail(
            Risk::High,
            format!("guest user is enabled in database '{}'", database),
            "REVOKE CONNECT FROM guest",
        );
    }
    pass(format!("user '{}' in '{}'", user_name, database))
}

fn rule_db_role_member(database: &str, role: &str, member: &str) -> Verdict {
    if role.eq_ignore_ascii_case("db_owner") && !member.eq_ignore_ascii_case("dbo") {
        return warn(
            Risk::Medium,
            format!("'{}' holds db_owner in '{}'", member, database),
            "confirm the membership is required and documented",
        );
    }
    pass(format!("'{}' in role '{}' of '{}'", member, role, database))
}

fn rule_orphaned_user(database: &str, user_name: &str) -> Verdict {
    warn(
        Risk::Medium,
        format!("user '{}' in '{}' has no matching login", user_name, database),
        "drop the user or re-map it to a login",
    )
}

fn rule_permission(
    scope: PermissionScope,
    grantee: &str,
    permission: &str,
    target: &str,
    state: PermissionState,
) -> Verdict {
    if state == PermissionState::Deny {
        return pass(format!("{} denied to '{}' on {}", permission, grantee, target));
    }
    let permission_lc = permission.to_lowercase();
    if permission_lc == "control server" {
        return fail(
            Risk::Critical,
            format!("'{}' holds CONTROL SERVER", grantee),
            "revoke CONTROL SERVER; grant narrower rights",
        );
    }
    if scope == PermissionScope::Server && grantee.eq_ignore_ascii_case("public") {
        return fail(
            Risk::High,
            format!("server permission {} granted to public on {}", permission, target),
            "revoke the grant from public",
        );
    }
    if state == PermissionState::GrantWithGrant {
        return warn(
            Risk::High,
            format!("'{}' may re-grant {} on {}", grantee, permission, target),
            "revoke the WITH GRANT OPTION",
        );
    }
    if permission_lc.starts_with("impersonate") {
        return warn(
            Risk::High,
            format!("'{}' may impersonate {}", grantee, target),
            "confirm the impersonation grant is required",
        );
    }
    pass(format!("{} granted to '{}' on {}", permission, grantee, target))
}

fn rule_linked_server(
    linked_name: &str,
    remote_login: Option<&str>,
    uses_self_mapping: bool,
    rpc_out: bool,
) -> Verdict {
    if remote_login.is_some_and(|l| l.eq_ignore_ascii_case("sa")) {
        return fail(
            Risk::Critical,
            format!("linked server '{}' connects as sa", linked_name),
            "map the linked server to a least-privilege remote login",
        );
    }
    if uses_self_mapping && rpc_out {
        return fail(
            Risk::High,
            format!("linked server '{}' impersonates callers with RPC Out enabled", linked_name),
            "disable RPC Out or replace the self-mapping",
        );
    }
    warn(
        Risk::Low,
        format!("linked server '{}' is defined", linked_name),
        "confirm the linked server is still needed",
    )
}

fn rule_trigger(trigger_name: &str, event: &str, enabled: bool) -> Verdict {
    if !enabled {
        return pass(format!("trigger '{}' ({}) is disabled", trigger_name, event));
    }
    warn(
        Risk::Low,
        format!("trigger '{}' fires on {}", trigger_name, event),
        "review the trigger body for unexpected actions",
    )
}

fn rule_backup(
    database: &str,
    recovery_model: &str,
    days_since_full: Option<i64>,
    days_since_log: Option<i64>,
    thresholds: &BackupThresholds,
) -> Verdict {
    let max_days = thresholds.full_backup_max_days;
    match days_since_full {
        None => fail(
            Risk::High,
            format!("database '{}' has never had a full backup", database),
            "schedule full backups",
        ),
        Some(days) if days > max_days => fail(
            Risk::High,
            format!("last full backup of '{}' is {} days old", database, days),
            "take a full backup and fix the schedule",
        ),
        Some(days) if days * 2 > max_days => warn(
            Risk::Medium,
            format!("last full backup of '{}' is {} days old", database, days),
            "verify the backup schedule",
        ),
        Some(_) => {
            if recovery_model.eq_ignore_ascii_case("full")
                && days_since_log.map_or(true, |d| d > thresholds.log_backup_max_days)
            {
                warn(
                    Risk::Medium,
                    format!("'{}' uses FULL recovery without recent log backups", database),
                    "schedule log backups or switch to SIMPLE recovery",
                )
            } else {
                pass(format!("backups of '{}' are current", database))
            }
        }
    }
}

fn rule_client_protocol(protocol: &str, enabled: bool) -> Verdict {
    if !enabled {
        return pass(format!("protocol '{}' is disabled", protocol));
    }
    let protocol_lc = protocol.to_lowercase();
    if protocol_lc.contains("via") {
        return warn(
            Risk::Medium,
            "deprecated VIA protocol is enabled",
            "disable the VIA protocol",
        );
    }
    if protocol_lc.contains("named pipes") {
        return warn(
            Risk::Low,
            "Named Pipes protocol is enabled",
            "disable Named Pipes unless a client depends on it",
        );
    }
    pass(format!("protocol '{}' is enabled", protocol))
}

const WEAK_ALGORITHMS: &[&str] = &["rc4", "rc4_128", "des", "triple_des", "triple_des_3key", "desx"];

fn rule_encryption(
    key_type: EncryptionKeyType,
    key_name: &str,
    algorithm: &str,
    key_length: Option<i32>,
) -> Verdict {
    let algorithm_lc = algorithm.to_lowercase();
    if WEAK_ALGORITHMS.contains(&algorithm_lc.as_str()) {
        return fail(
            Risk::High,
            format!("{} '{}' uses weak algorithm {}", key_type.as_str(), key_name, algorithm),
            "recreate the key with AES-256",
        );
    }
    if key_type == EncryptionKeyType::Certificate && key_length.is_some_and(|l| l < 2048) {
        return warn(
            Risk::Medium,
            format!("certificate '{}' has a {}-bit key", key_name, key_length.unwrap_or(0)),
            "reissue the certificate with at least a 2048-bit key",
        );
    }
    pass(format!("{} '{}' uses {}", key_type.as_str(), key_name, algorithm))
}

fn rule_audit_settings(setting: &str, value: &str) -> Verdict {
    let setting_lc = setting.to_lowercase();
    let value_lc = value.to_lowercase();
    if setting_lc.contains("login audit") {
        return match value_lc.as_str() {
            "none" => fail(
                Risk::Medium,
                "login auditing is disabled",
                "audit failed logins at minimum",
            ),
            "success" => warn(
                Risk::Low,
                "only successful logins are audited",
                "audit failed logins as well",
            ),
            _ => pass(format!("login auditing: {}", value)),
        };
    }
    if setting_lc.contains("default trace") && value_lc != "1" && value_lc != "enabled" {
        return warn(
            Risk::Medium,
            "the default trace is disabled",
            "re-enable the default trace",
        );
    }
    pass(format!("'{}' = {}", setting, value))
}

fn parse_build(build: &str) -> Vec<u32> {
    build
        .split('.')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

fn rule_instance_info(
    version_family: &str,
    build: &str,
    expected: &BTreeMap<String, String>,
) -> Verdict {
    let Some(target) = expected.get(version_family) else {
        return pass(format!("SQL Server {} build {}", version_family, build));
    };
    if parse_build(build) < parse_build(target) {
        warn(
            Risk::Medium,
            format!(
                "SQL Server {} build {} lags the expected build {}",
                version_family, build, target
            ),
            "apply the current cumulative update",
        )
    } else {
        pass(format!("SQL Server {} build {} is current", version_family, build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ctx() -> (BTreeMap<String, SettingRule>, BTreeMap<String, String>, BackupThresholds) {
        (BTreeMap::new(), BTreeMap::new(), BackupThresholds::default())
    }

    fn ctx<'a>(
        settings: &'a BTreeMap<String, SettingRule>,
        builds: &'a BTreeMap<String, String>,
        thresholds: &'a BackupThresholds,
    ) -> RuleContext<'a> {
        RuleContext {
            security_settings: settings,
            expected_builds: builds,
            backup_thresholds: thresholds,
        }
    }

    #[test]
    fn sa_account_states() {
        assert_eq!(rule_sa_account("sa", true).status, FindingStatus::Fail);
        assert_eq!(rule_sa_account("sa", true).risk, Risk::Critical);
        assert_eq!(rule_sa_account("admin_x", true).status, FindingStatus::Warn);
        assert_eq!(rule_sa_account("sa", false).status, FindingStatus::Pass);
    }

    #[test]
    fn sql_login_without_policy_fails() {
        let verdict = rule_login("app_reader", LoginAuth::Sql, true, false, false, "master", false);
        assert_eq!(verdict.status, FindingStatus::Fail);
        assert_eq!(verdict.risk, Risk::High);
    }

    #[test]
    fn system_logins_are_excluded() {
        let verdict = rule_login(
            "##MS_PolicyEventProcessingLogin##",
            LoginAuth::Sql,
            true,
            false,
            false,
            "master",
            false,
        );
        assert_eq!(verdict.status, FindingStatus::Pass);
    }

    #[test]
    fn sysadmin_default_db_warns() {
        let verdict =
            rule_login("dba_admin", LoginAuth::Windows, true, true, true, "sales", true);
        assert_eq!(verdict.status, FindingStatus::Warn);
    }

    #[test]
    fn config_rule_risk_splits_fail_and_warn() {
        let mut settings = BTreeMap::new();
        settings.insert(
            "xp_cmdshell".to_string(),
            SettingRule { required: 0, risk: Risk::High },
        );
        settings.insert(
            "remote access".to_string(),
            SettingRule { required: 0, risk: Risk::Medium },
        );
        let (_, builds, thresholds) = empty_ctx();
        let rule_ctx = ctx(&settings, &builds, &thresholds);

        let high = classify(
            &FindingFacts::ConfigSetting { setting: "xp_cmdshell".into(), value_in_use: 1 },
            &rule_ctx,
        );
        assert_eq!(high.status, FindingStatus::Fail);

        let medium = classify(
            &FindingFacts::ConfigSetting { setting: "remote access".into(), value_in_use: 1 },
            &rule_ctx,
        );
        assert_eq!(medium.status, FindingStatus::Warn);

        let equal = classify(
            &FindingFacts::ConfigSetting { setting: "xp_cmdshell".into(), value_in_use: 0 },
            &rule_ctx,
        );
        assert_eq!(equal.status, FindingStatus::Pass);
    }

    #[test]
    fn trustworthy_user_database_fails_system_passes() {
        assert_eq!(
            rule_database("accounting", "sa", true, false).status,
            FindingStatus::Fail
        );
        assert_eq!(
            rule_database("msdb", "sa", true, true).status,
            FindingStatus::Pass
        );
    }

    #[test]
    fn guest_rules_follow_database() {
        assert_eq!(
            rule_db_user("sales", "guest", true, false).status,
            FindingStatus::Fail
        );
        assert_eq!(
            rule_db_user("msdb", "guest", true, true).status,
            FindingStatus::Pass
        );
        assert_eq!(
            rule_db_user("sales", "app_user", true, false).status,
            FindingStatus::Pass
        );
    }

    #[test]
    fn linked_server_as_sa_is_critical() {
        let verdict = rule_linked_server("legacy", Some("sa"), false, true);
        assert_eq!(verdict.status, FindingStatus::Fail);
        assert_eq!(verdict.risk, Risk::Critical);

        let self_mapped = rule_linked_server("legacy", None, true, true);
        assert_eq!(self_mapped.status, FindingStatus::Fail);

        let plain = rule_linked_server("reporting", Some("rpt_user"), false, false);
        assert_eq!(plain.status, FindingStatus::Warn);
        assert_eq!(plain.risk, Risk::Low);
    }

    #[test]
    fn backup_staleness_thresholds() {
        let thresholds = BackupThresholds {
            full_backup_max_days: 7,
            log_backup_max_days: 1,
        };
        assert_eq!(
            rule_backup("sales", "SIMPLE", Some(10), None, &thresholds).status,
            FindingStatus::Fail
        );
        assert_eq!(
            rule_backup("sales", "SIMPLE", Some(5), None, &thresholds).status,
            FindingStatus::Warn
        );
        assert_eq!(
            rule_backup("sales", "SIMPLE", Some(1), None, &thresholds).status,
            FindingStatus::Pass
        );
        assert_eq!(
            rule_backup("sales", "SIMPLE", None, None, &thresholds).status,
            FindingStatus::Fail
        );
        // FULL recovery without log backups is flagged even when fulls are fresh.
        assert_eq!(
            rule_backup("sales", "FULL", Some(1), Some(3), &thresholds).status,
            FindingStatus::Warn
        );
    }

    #[test]
    fn agent_stopped_is_warn_not_fail() {
        let verdict = rule_service(
            "SQLSERVERAGENT",
            ServiceKind::Agent,
            ServiceState::Stopped,
            "Auto",
            "NT Service\\SQLSERVERAGENT",
        );
        assert_eq!(verdict.status, FindingStatus::Warn);
    }

    #[test]
    fn build_lag_warns() {
        let mut builds = BTreeMap::new();
        builds.insert("2019".to_string(), "15.0.4375.4".to_string());
        let (settings, _, thresholds) = empty_ctx();
        let rule_ctx = ctx(&settings, &builds, &thresholds);

        let lagging = classify(
            &FindingFacts::InstanceInfo {
                version_family: "2019".into(),
                build: "15.0.4236.7".into(),
                edition: "Standard".into(),
                product_level: "RTM".into(),
            },
            &rule_ctx,
        );
        assert_eq!(lagging.status, FindingStatus::Warn);

        let current = classify(
            &FindingFacts::InstanceInfo {
                version_family: "2019".into(),
                build: "15.0.4375.4".into(),
                edition: "Standard".into(),
                product_level: "RTM".into(),
            },
            &rule_ctx,
        );
        assert_eq!(current.status, FindingStatus::Pass);
    }

    #[test]
    fn control_server_and_public_grants() {
        let control = rule_permission(
            PermissionScope::Server,
            "app_login",
            "CONTROL SERVER",
            "server",
            PermissionState::Grant,
        );
        assert_eq!(control.status, FindingStatus::Fail);
        assert_eq!(control.risk, Risk::Critical);

        let to_public = rule_permission(
            PermissionScope::Server,
            "public",
            "CONNECT SQL",
            "endpoint",
            PermissionState::Grant,
        );
        assert_eq!(to_public.status, FindingStatus::Fail);

        let deny = rule_permission(
            PermissionScope::Server,
            "public",
            "CONNECT SQL",
            "endpoint",
            PermissionState::Deny,
        );
        assert_eq!(deny.status, FindingStatus::Pass);
    }
}
