use sqlwarden_core::{AuditConfig, Result};

/// Print the effective merged configuration (file plus environment).
pub fn execute(config: &AuditConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
