//! Audit lifecycle: baseline → sync* → finalize, with the reopen escape
//! hatch.
//!
//! Finalize marks the cycle's baseline run, because the baseline id is what
//! findings, syncs, and action log entries of the cycle hang off: one
//! finalized root makes every later mutation attempt fail with
//! `FinalizedRun` regardless of which surface tries it.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;

use sqlwarden_collect::Collector;
use sqlwarden_core::config::AuditConfig;
use sqlwarden_core::model::{AuditRun, Stats};
use sqlwarden_core::store::{runs, Store};
use sqlwarden_core::types::RunStatus;
use sqlwarden_core::{AuditError, Result};

use crate::stats;
use crate::sync::{Orchestrator, RunOutcome};

#[derive(Debug)]
pub struct FinalizeOutcome {
    pub baseline_id: i64,
    pub final_run_id: i64,
    pub stats: Stats,
    pub snapshot_hash: String,
}

#[derive(Debug)]
pub struct CycleStatus {
    pub baseline: Option<AuditRun>,
    pub runs: Vec<AuditRun>,
    pub stats: Option<Stats>,
}

/// Start a baseline run. Fails when a run is already in progress for the
/// organization and audit date.
pub async fn begin_baseline(
    store: &Store,
    config: &AuditConfig,
    collector: Arc<dyn Collector>,
) -> Result<RunOutcome> {
    Orchestrator::new(store, config, collector)
        .run_baseline()
        .await
}

/// Chain a sync onto the current baseline.
pub async fn begin_sync(
    store: &Store,
    config: &AuditConfig,
    collector: Arc<dyn Collector>,
) -> Result<RunOutcome> {
    Orchestrator::new(store, config, collector)
        .run_sync(false)
        .await
}

/// Explicit operator-initiated reopen of a finalized cycle: a new sync run
/// chained to the original baseline.
pub async fn reopen(
    store: &Store,
    config: &AuditConfig,
    collector: Arc<dyn Collector>,
) -> Result<RunOutcome> {
    let mut conn = store.acquire().await?;
    let baseline = runs::latest_baseline(&mut conn, &config.organization)
        .await?
        .ok_or(AuditError::NoBaseline)?;
    if baseline.status != RunStatus::Finalized {
        return Err(AuditError::internal(format!(
            "cycle {} is not finalized; use sync",
            baseline.id
        )));
    }
    drop(conn);

    info!(baseline_id = baseline.id, "reopening finalized cycle");
    Orchestrator::new(store, config, collector)
        .run_sync(true)
        .await
}

/// Close the cycle. Refused while active issues without documented
/// exceptions remain, unless `force` is set. Snapshots the workbook hash
/// onto the run record.
pub async fn finalize(store: &Store, config: &AuditConfig, force: bool) -> Result<FinalizeOutcome> {
    let mut conn = store.acquire().await?;
    let baseline = runs::latest_baseline(&mut conn, &config.organization)
        .await?
        .ok_or(AuditError::NoBaseline)?;
    if baseline.status == RunStatus::Finalized {
        return Err(AuditError::FinalizedRun {
            run_id: baseline.id,
        });
    }

    let chain = runs::chain_runs(&mut conn, baseline.id).await?;
    let current = chain.last().ok_or(AuditError::internal(
        "cycle has no completed runs to finalize",
    ))?;
    let previous_id = if current.id == baseline.id {
        None
    } else {
        Some(baseline.id)
    };
    let computed = stats::calculate(&mut conn, baseline.id, current.id, previous_id).await?;

    if computed.active_issues > 0 && !force {
        return Err(AuditError::FinalizeRefused {
            active_issues: computed.active_issues,
        });
    }

    let snapshot_hash = hash_report(Path::new(&config.report_path));
    runs::finalize_run(&mut conn, baseline.id, &snapshot_hash).await?;
    info!(
        baseline_id = baseline.id,
        final_run_id = current.id,
        forced = force,
        "cycle finalized"
    );
    Ok(FinalizeOutcome {
        baseline_id: baseline.id,
        final_run_id: current.id,
        stats: computed,
        snapshot_hash,
    })
}

/// Current cycle summary for the status/list surfaces.
pub async fn cycle_status(store: &Store, config: &AuditConfig) -> Result<CycleStatus> {
    let mut conn = store.acquire().await?;
    let baseline = runs::latest_baseline(&mut conn, &config.organization).await?;
    let Some(baseline) = baseline else {
        return Ok(CycleStatus {
            baseline: None,
            runs: Vec::new(),
            stats: None,
        });
    };
    let chain = runs::chain_runs(&mut conn, baseline.id).await?;
    let computed = match chain.last() {
        Some(current) => {
            let previous_id = if current.id == baseline.id {
                None
            } else {
                Some(baseline.id)
            };
            Some(stats::calculate(&mut conn, baseline.id, current.id, previous_id).await?)
        }
        None => None,
    };
    Ok(CycleStatus {
        baseline: Some(baseline),
        runs: chain,
        stats: computed,
    })
}

fn hash_report(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => format!("{:x}", Sha256::digest(&bytes)),
        Err(_) => String::new(),
    }
}
