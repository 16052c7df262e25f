use colored::*;

use sqlwarden_core::{AuditConfig, Result, Store};
use sqlwarden_engine::lifecycle;

use super::print_stats;

pub async fn execute(config: &AuditConfig, format: &str) -> Result<()> {
    let store = Store::open(&config.store_path).await?;
    let status = lifecycle::cycle_status(&store, config).await?;

    if format.eq_ignore_ascii_case("json") {
        let payload = serde_json::json!({
            "organization": config.organization,
            "baseline": status.baseline,
            "runs": status.runs,
            "stats": status.stats,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let Some(baseline) = &status.baseline else {
        println!("no audit cycle for {} yet; run `sqlwarden audit`", config.organization.bold());
        return Ok(());
    };

    println!(
        "{} cycle rooted at run {} ({}, {})",
        config.organization.bold(),
        baseline.id,
        baseline.audit_date,
        baseline.status
    );
    for run in &status.runs {
        println!(
            "  run {:>3}  {:<9} {:<10} started {}",
            run.id,
            run.run_type.as_str(),
            run.status.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M")
        );
    }
    if let Some(stats) = &status.stats {
        print_stats(stats);
    }
    Ok(())
}
