use std::sync::Arc;

use colored::*;

use sqlwarden_collect::json::JsonCollector;
use sqlwarden_core::{AuditConfig, Result, Store};
use sqlwarden_engine::lifecycle;

use super::print_stats;

pub async fn execute(config: &AuditConfig, facts_dir: &str) -> Result<()> {
    let store = Store::open(&config.store_path).await?;
    let collector = Arc::new(JsonCollector::new(facts_dir));

    println!(
        "starting baseline audit for {} ({})",
        config.organization.bold(),
        config.audit_date()
    );
    let outcome = lifecycle::begin_baseline(&store, config, collector).await?;

    println!(
        "baseline run {} recorded {} action(s)",
        outcome.run_id, outcome.actions_recorded
    );
    if !outcome.report_written {
        println!("{}", "report could not be written; marked stale".yellow());
    }
    print_stats(&outcome.stats);
    Ok(())
}
