use colored::*;

use sqlwarden_core::store::runs;
use sqlwarden_core::{AuditConfig, Result, Store};

pub async fn execute(config: &AuditConfig, format: &str) -> Result<()> {
    let store = Store::open(&config.store_path).await?;
    let mut conn = store.acquire().await?;
    let all_runs = runs::list_runs(&mut conn, &config.organization).await?;

    if format.eq_ignore_ascii_case("json") {
        println!("{}", serde_json::to_string_pretty(&all_runs)?);
        return Ok(());
    }

    if all_runs.is_empty() {
        println!("no runs recorded for {}", config.organization.bold());
        return Ok(());
    }

    println!(
        "{:<5} {:<10} {:<10} {:<12} {:<17} {}",
        "id".bold(),
        "type".bold(),
        "status".bold(),
        "audit date".bold(),
        "started".bold(),
        "parent".bold()
    );
    for run in all_runs {
        println!(
            "{:<5} {:<10} {:<10} {:<12} {:<17} {}",
            run.id,
            run.run_type.as_str(),
            run.status.as_str(),
            run.audit_date.to_string(),
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.parent_run_id
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}
