use colored::*;

use sqlwarden_core::{AuditConfig, Result, Store};
use sqlwarden_engine::lifecycle;

use super::print_stats;

pub async fn execute(config: &AuditConfig, force: bool) -> Result<()> {
    let store = Store::open(&config.store_path).await?;
    let outcome = lifecycle::finalize(&store, config, force).await?;

    println!(
        "cycle {} finalized at run {}",
        outcome.baseline_id, outcome.final_run_id
    );
    if !outcome.snapshot_hash.is_empty() {
        println!("report snapshot sha256: {}", outcome.snapshot_hash);
    }
    if force && outcome.stats.active_issues > 0 {
        println!(
            "{}",
            format!(
                "finalized with {} active issue(s) outstanding",
                outcome.stats.active_issues
            )
            .yellow()
            .bold()
        );
    }
    print_stats(&outcome.stats);
    Ok(())
}
