use std::fmt::Write as _;

use colored::*;

use sqlwarden_core::store::findings;
use sqlwarden_core::{AuditConfig, AuditError, Result, Store};
use sqlwarden_engine::lifecycle;

/// Generate a T-SQL remediation script from the current run's open
/// findings. Documented exceptions are skipped. Generation only.
pub async fn execute(config: &AuditConfig, output: &str) -> Result<()> {
    let store = Store::open(&config.store_path).await?;
    let status = lifecycle::cycle_status(&store, config).await?;
    let current = status
        .runs
        .last()
        .ok_or(AuditError::NoBaseline)?;

    let mut conn = store.acquire().await?;
    let rows = findings::findings_for_run(&mut conn, current.id, None).await?;

    let mut script = String::new();
    writeln!(script, "-- Remediation script for {}", config.organization).ok();
    writeln!(script, "-- Generated from run {} ({})", current.id, current.audit_date).ok();
    writeln!(script, "-- Review every statement before executing.").ok();

    let mut emitted = 0;
    for row in rows
        .iter()
        .filter(|r| r.finding.status.is_discrepancy() && !r.finding.has_exception)
    {
        let finding = &row.finding;
        writeln!(script).ok();
        writeln!(
            script,
            "-- [{}] {}\\{} {}",
            finding.risk, row.server, row.instance, finding.entity_key
        )
        .ok();
        writeln!(script, "-- {}", finding.description).ok();
        if finding.recommendation.is_empty() {
            writeln!(script, "-- (manual remediation required)").ok();
        } else if looks_like_sql(&finding.recommendation) {
            writeln!(script, "{};", finding.recommendation.trim_end_matches(';')).ok();
        } else {
            writeln!(script, "-- {}", finding.recommendation).ok();
        }
        emitted += 1;
    }

    if emitted == 0 {
        writeln!(script).ok();
        writeln!(script, "-- No open findings without documented exceptions.").ok();
    }

    std::fs::write(output, script)?;
    println!(
        "wrote remediation script covering {} finding(s) to {}",
        emitted,
        output.bold()
    );
    Ok(())
}

fn looks_like_sql(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    ["ALTER ", "REVOKE ", "DENY ", "DROP ", "EXEC ", "SP_CONFIGURE", "USE "]
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_executable_recommendations() {
        assert!(looks_like_sql("sp_configure 'xp_cmdshell', 0; RECONFIGURE"));
        assert!(looks_like_sql("ALTER DATABASE x SET TRUSTWORTHY OFF"));
        assert!(looks_like_sql("REVOKE CONNECT FROM guest"));
        assert!(!looks_like_sql("disable the sa login"));
    }
}
