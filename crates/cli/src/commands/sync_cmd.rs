use std::sync::Arc;

use colored::*;

use sqlwarden_collect::json::JsonCollector;
use sqlwarden_core::{AuditConfig, Result, Store};
use sqlwarden_engine::lifecycle;

use super::print_stats;

pub async fn execute(config: &AuditConfig, facts_dir: &str, reopen: bool) -> Result<()> {
    let store = Store::open(&config.store_path).await?;
    let collector = Arc::new(JsonCollector::new(facts_dir));

    let outcome = if reopen {
        println!("{}", "reopening finalized cycle".yellow().bold());
        lifecycle::reopen(&store, config, collector).await?
    } else {
        lifecycle::begin_sync(&store, config, collector).await?
    };

    println!(
        "sync run {} recorded {} action(s), {} annotation(s) reconciled",
        outcome.run_id, outcome.actions_recorded, outcome.annotations.upserted
    );
    if outcome.annotations.date_warnings > 0 {
        println!(
            "{}",
            format!(
                "{} review date(s) could not be parsed; original text kept",
                outcome.annotations.date_warnings
            )
            .yellow()
        );
    }
    if !outcome.report_written {
        println!("{}", "report could not be written; marked stale".yellow());
    }
    print_stats(&outcome.stats);
    Ok(())
}
