//! Sync orchestration: the deterministic read → collect → diff → classify →
//! record → regenerate sequence.
//!
//! All store writes of one run are committed in a single transaction; the
//! run record itself is created first so a rolled-back run still leaves a
//! `failed` row behind. Workbook regeneration runs after commit and is
//! best-effort: its failure marks the run's report stale instead of undoing
//! the sync.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use sqlwarden_collect::{Collector, CollectionRunner, RunnerOptions};
use sqlwarden_core::config::AuditConfig;
use sqlwarden_core::identity::{compose_key, new_row_uuid};
use sqlwarden_core::model::facts::InstanceAudit;
use sqlwarden_core::model::{Annotation, AuditRun, FindingRow, Stats};
use sqlwarden_core::store::findings::NewFinding;
use sqlwarden_core::store::{actions, annotations as annotation_store, findings, runs, servers, Store};
use sqlwarden_core::types::{
    ActionStatus, ChangeType, FindingStatus, FindingType, RunStatus, RunType,
};
use sqlwarden_core::{AuditError, Result};
use sqlwarden_report::{self as report, ActionRowEdit, ReportContext, SheetRow, WorkbookRead};

use crate::annotations::{self, ReconcileOutcome};
use crate::classifier::{self, RuleContext};
use crate::diff;
use crate::recorder::{self, ActionRecorder};
use crate::stats;
use crate::transition::{self, TransitionInput};

#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: i64,
    pub baseline_id: i64,
    pub stats: Stats,
    pub report_written: bool,
    pub annotations: ReconcileOutcome,
    pub actions_recorded: usize,
}

pub struct Orchestrator<'a> {
    store: &'a Store,
    config: &'a AuditConfig,
    collector: Arc<dyn Collector>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(store: &'a Store, config: &'a AuditConfig, collector: Arc<dyn Collector>) -> Self {
        Self {
            store,
            config,
            collector,
        }
    }

    /// First run of a compliance cycle. An existing workbook (a prior
    /// cycle's report) is read for annotations; every FAIL/WARN finding is
    /// logged once as NEW_ISSUE.
    pub async fn run_baseline(&self) -> Result<RunOutcome> {
        let report_path = Path::new(&self.config.report_path);
        report::ensure_writable(report_path)?;

        let workbook = self.read_workbook_if_present(report_path)?;
        let collection = self.collect().await?;
        self.execute_run(RunType::Baseline, None, workbook, collection)
            .await
    }

    /// Subsequent run of the cycle: diffs against last known state and
    /// records classified transitions. `reopen` is the explicit
    /// operator-initiated path past a finalized cycle.
    pub async fn run_sync(&self, reopen: bool) -> Result<RunOutcome> {
        let mut conn = self.store.acquire().await?;
        let baseline = runs::latest_baseline(&mut conn, &self.config.organization)
            .await?
            .ok_or(AuditError::NoBaseline)?;
        if baseline.status == RunStatus::Finalized && !reopen {
            return Err(AuditError::FinalizedRun {
                run_id: baseline.id,
            });
        }
        drop(conn);

        let report_path = Path::new(&self.config.report_path);
        report::ensure_writable(report_path)?;

        let workbook = self.read_workbook_if_present(report_path)?;
        let collection = self.collect().await?;
        self.execute_run(RunType::Sync, Some(baseline), workbook, collection)
            .await
    }

    fn read_workbook_if_present(&self, path: &Path) -> Result<WorkbookRead> {
        if path.exists() {
            report::read_workbook(path)
        } else {
            Ok(WorkbookRead::default())
        }
    }

    async fn collect(&self) -> Result<sqlwarden_collect::CollectionReport> {
        let runner = CollectionRunner::new(
            Arc::clone(&self.collector),
            RunnerOptions::from_performance(&self.config.performance),
        );
        let targets: Vec<_> = self
            .config
            .enabled_targets()
            .into_iter()
            .cloned()
            .collect();
        runner.run(&targets).await
    }

    async fn execute_run(
        &self,
        run_type: RunType,
        baseline: Option<AuditRun>,
        workbook: WorkbookRead,
        collection: sqlwarden_collect::CollectionReport,
    ) -> Result<RunOutcome> {
        // The run record is committed on its own so a failure below still
        // leaves a failed run behind after the transaction rolls back.
        let mut conn = self.store.acquire().await?;
        let run_id = runs::begin_run(
            &mut conn,
            &self.config.organization,
            self.config.audit_date(),
            run_type,
            baseline.as_ref().map(|b| b.id),
            &self.config.config_hash(),
        )
        .await?;
        drop(conn);

        let baseline_id = baseline.as_ref().map(|b| b.id).unwrap_or(run_id);

        let mut tx = self.store.begin().await?;
        let result = self
            .run_steps(&mut *tx, run_id, baseline_id, &workbook, &collection)
            .await;

        match result {
            Ok((reconciled, recorded, computed_stats)) => {
                tx.commit().await?;
                let report_written = self
                    .regenerate_report(run_id, baseline_id, &computed_stats)
                    .await;
                info!(
                    run_id,
                    run_type = %run_type,
                    actions = recorded,
                    report_written,
                    "run completed"
                );
                Ok(RunOutcome {
                    run_id,
                    baseline_id,
                    stats: computed_stats,
                    report_written,
                    annotations: reconciled,
                    actions_recorded: recorded,
                })
            }
            Err(err) => {
                drop(tx);
                let mut conn = self.store.acquire().await?;
                runs::fail_run(&mut conn, run_id).await?;
                Err(err)
            }
        }
    }

    /// Steps 2–7: everything here happens inside the sync transaction.
    async fn run_steps(
        &self,
        conn: &mut SqliteConnection,
        run_id: i64,
        baseline_id: i64,
        workbook: &WorkbookRead,
        collection: &sqlwarden_collect::CollectionReport,
    ) -> Result<(ReconcileOutcome, usize, Stats)> {
        let is_baseline = run_id == baseline_id;

        // Operator input first, before any classification.
        let reconciled = annotations::reconcile(
            conn,
            &workbook.rows,
            self.config.identity.resurrection_window_days,
            &self.config.organization,
        )
        .await?;
        recorder::apply_action_edits(conn, &workbook.action_edits).await?;

        // Last known state per entity across the completed chain, captured
        // before this run's findings are persisted.
        let prev_rows = if is_baseline {
            Vec::new()
        } else {
            let chain: Vec<i64> = runs::chain_runs(conn, baseline_id)
                .await?
                .iter()
                .map(|r| r.id)
                .collect();
            findings::latest_findings_across(conn, &chain).await?
        };

        self.persist_findings(conn, run_id, &collection.audits).await?;
        let annotation_index = AnnotationIndex::load(conn).await?;
        let curr_rows =
            self.freeze_exceptions(conn, run_id, &annotation_index).await?;

        let mut scanned: HashSet<String> = collection
            .outcomes
            .iter()
            .filter(|o| o.scanned)
            .map(|o| o.instance_ref())
            .collect();
        let diff_result = diff::diff(&prev_rows, &curr_rows);
        scanned.extend(diff_result.scanned_instances.iter().cloned());

        let curr_exceptions: HashMap<(FindingType, String), (bool, String)> = curr_rows
            .iter()
            .map(|row| {
                (
                    (row.finding.finding_type, row.finding.entity_key.clone()),
                    (row.finding.has_exception, row.finding.exception_text.clone()),
                )
            })
            .collect();
        let prev_exceptions: HashMap<(FindingType, String), (bool, String)> = prev_rows
            .iter()
            .map(|row| {
                (
                    (row.finding.finding_type, row.finding.entity_key.clone()),
                    (row.finding.has_exception, row.finding.exception_text.clone()),
                )
            })
            .collect();

        let sync_run_id = if is_baseline { None } else { Some(run_id) };
        let mut action_recorder = ActionRecorder::new(baseline_id, sync_run_id);

        for t in &diff_result.transitions {
            let lookup = (t.finding_type, t.entity_key.clone());
            let (old_exc, old_text) = prev_exceptions
                .get(&lookup)
                .cloned()
                .unwrap_or((false, String::new()));
            let (new_exc, new_text) = curr_exceptions
                .get(&lookup)
                .cloned()
                .unwrap_or((false, String::new()));

            let outcome = transition::classify(&TransitionInput {
                old_status: t.old_status,
                new_status: t.new_status,
                old_exception: old_exc,
                new_exception: new_exc,
                exception_text_changed: old_text != new_text,
                scanned: scanned.contains(&t.instance_ref),
            });
            if !outcome.should_log {
                continue;
            }
            let status = action_status_for(outcome.change);
            let description = transition_description(t.old_status, t.new_status, outcome.change);
            action_recorder
                .record(
                    conn,
                    t.finding_type,
                    &t.entity_key,
                    outcome.change,
                    status,
                    description,
                )
                .await?;
        }

        runs::save_scan_outcomes(conn, run_id, &collection.outcomes).await?;
        runs::complete_run(conn, run_id).await?;

        let previous_id = if is_baseline { None } else { Some(baseline_id) };
        let computed = stats::calculate(conn, baseline_id, run_id, previous_id).await?;

        Ok((reconciled, action_recorder.recorded(), computed))
    }

    async fn persist_findings(
        &self,
        conn: &mut SqliteConnection,
        run_id: i64,
        audits: &[InstanceAudit],
    ) -> Result<()> {
        let rule_ctx = RuleContext {
            security_settings: &self.config.security_settings,
            expected_builds: &self.config.expected_builds,
            backup_thresholds: &self.config.backup_thresholds,
        };
        let window_start =
            Utc::now() - Duration::days(self.config.identity.resurrection_window_days);

        for audit in audits {
            let server_id = servers::upsert_server(conn, &audit.server).await?;
            let instance_id =
                servers::upsert_instance(conn, server_id, &audit.instance, audit.port).await?;

            for fact in &audit.facts {
                let finding_type = fact.finding_type();
                let tail = fact.key_tail();
                let mut parts: Vec<&str> = vec![&audit.server, &audit.instance];
                parts.extend(tail.iter().map(String::as_str));
                let entity_key = compose_key(finding_type, &parts);

                let verdict = classifier::classify(fact, &rule_ctx);
                let row_uuid = match findings::recent_uuid_for_key(
                    conn,
                    finding_type,
                    &entity_key,
                    Some(window_start),
                )
                .await?
                {
                    Some(existing) => existing,
                    None => new_row_uuid(),
                };

                findings::save_finding(
                    conn,
                    &NewFinding {
                        run_id,
                        instance_id,
                        finding_type,
                        entity_key,
                        row_uuid: Some(row_uuid),
                        status: verdict.status,
                        risk: verdict.risk,
                        description: verdict.description,
                        recommendation: verdict.recommendation,
                        details: serde_json::to_value(fact)?,
                    },
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Step 6 prerequisite: compute each current finding's documented
    /// exception against the **current** findings and freeze it on the row.
    async fn freeze_exceptions(
        &self,
        conn: &mut SqliteConnection,
        run_id: i64,
        annotation_index: &AnnotationIndex,
    ) -> Result<Vec<FindingRow>> {
        let rows = findings::findings_for_run(conn, run_id, None).await?;
        let mut frozen = Vec::with_capacity(rows.len());
        for mut row in rows {
            let annotation = annotation_index.lookup(&row);
            let (has_exception, text) = match annotation {
                Some(a) if a.is_documented_exception(row.finding.status) => {
                    (true, a.justification.trim().to_string())
                }
                _ => (false, String::new()),
            };
            if has_exception || row.finding.has_exception {
                findings::update_exception_state(
                    conn,
                    run_id,
                    row.finding.finding_type,
                    &row.finding.entity_key,
                    has_exception,
                    &text,
                )
                .await?;
            }
            row.finding.has_exception = has_exception;
            row.finding.exception_text = text;
            frozen.push(row);
        }
        Ok(frozen)
    }

    /// Step 8. Never fails the sync; a write error marks the run's report
    /// stale so the next sync regenerates regardless.
    async fn regenerate_report(&self, run_id: i64, baseline_id: i64, stats: &Stats) -> bool {
        let result = self.try_regenerate(run_id, baseline_id, stats).await;
        let written = result.is_ok();
        if let Err(err) = result {
            warn!(run_id, error = %err, "workbook regeneration failed; marking report stale");
        }
        if let Ok(mut conn) = self.store.acquire().await {
            let _ = runs::mark_report_stale(&mut conn, run_id, !written).await;
        }
        written
    }

    async fn try_regenerate(&self, run_id: i64, baseline_id: i64, stats: &Stats) -> Result<()> {
        let mut conn = self.store.acquire().await?;
        let rows = findings::findings_for_run(&mut conn, run_id, None).await?;
        let annotation_rows = annotation_store::all(&mut conn).await?;
        let outcomes = runs::scan_outcomes(&mut conn, run_id).await?;
        let action_rows = actions::for_cycle(&mut conn, baseline_id).await?;
        drop(conn);

        let annotation_map: HashMap<(FindingType, String), Annotation> = annotation_rows
            .into_iter()
            .map(|a| ((a.entity_type, a.entity_key.clone()), a))
            .collect();

        report::write_workbook(
            Path::new(&self.config.report_path),
            &ReportContext {
                organization: &self.config.organization,
                audit_date: self.config.audit_date(),
                stats,
                findings: &rows,
                annotations: &annotation_map,
                outcomes: &outcomes,
                actions: &action_rows,
            },
        )
    }
}

/// Annotation lookup with UUID-first, composite-key-second resolution.
struct AnnotationIndex {
    by_uuid: HashMap<uuid::Uuid, Annotation>,
    by_key: HashMap<(FindingType, String), Annotation>,
}

impl AnnotationIndex {
    async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let rows = annotation_store::all(conn).await?;
        let mut by_uuid = HashMap::new();
        let mut by_key = HashMap::new();
        for annotation in rows {
            if let Some(uuid) = annotation.row_uuid {
                by_uuid.insert(uuid, annotation.clone());
            }
            by_key.insert(
                (annotation.entity_type, annotation.entity_key.clone()),
                annotation,
            );
        }
        Ok(Self { by_uuid, by_key })
    }

    fn lookup(&self, row: &FindingRow) -> Option<&Annotation> {
        if let Some(uuid) = row.finding.row_uuid {
            if let Some(found) = self.by_uuid.get(&uuid) {
                return Some(found);
            }
        }
        self.by_key
            .get(&(row.finding.finding_type, row.finding.entity_key.clone()))
    }
}

fn action_status_for(change: ChangeType) -> ActionStatus {
    match change {
        ChangeType::Fixed => ActionStatus::Closed,
        ChangeType::ExceptionAdded | ChangeType::ExceptionUpdated => ActionStatus::Exception,
        _ => ActionStatus::Open,
    }
}

fn transition_description(
    old: Option<FindingStatus>,
    new: Option<FindingStatus>,
    change: ChangeType,
) -> String {
    let old_text = old.map(|s| s.as_str()).unwrap_or("absent");
    let new_text = new.map(|s| s.as_str()).unwrap_or("absent");
    format!("{}: {} -> {}", change, old_text, new_text)
}

/// Test seam: run a sync with workbook rows supplied directly instead of a
/// file on disk. Mirrors `run_sync` exactly apart from the read.
pub async fn run_sync_with_rows(
    store: &Store,
    config: &AuditConfig,
    collector: Arc<dyn Collector>,
    rows: Vec<SheetRow>,
    action_edits: Vec<ActionRowEdit>,
    reopen: bool,
) -> Result<RunOutcome> {
    let orchestrator = Orchestrator::new(store, config, collector);

    let mut conn = store.acquire().await?;
    let baseline = runs::latest_baseline(&mut conn, &config.organization)
        .await?
        .ok_or(AuditError::NoBaseline)?;
    if baseline.status == RunStatus::Finalized && !reopen {
        return Err(AuditError::FinalizedRun {
            run_id: baseline.id,
        });
    }
    drop(conn);

    let collection = orchestrator.collect().await?;
    orchestrator
        .execute_run(
            RunType::Sync,
            Some(baseline),
            WorkbookRead { rows, action_edits },
            collection,
        )
        .await
}

/// Test seam for baselines, mirroring `run_baseline` without the workbook.
pub async fn run_baseline_with_rows(
    store: &Store,
    config: &AuditConfig,
    collector: Arc<dyn Collector>,
    rows: Vec<SheetRow>,
) -> Result<RunOutcome> {
    let orchestrator = Orchestrator::new(store, config, collector);
    let collection = orchestrator.collect().await?;
    orchestrator
        .execute_run(
            RunType::Baseline,
            None,
            WorkbookRead {
                rows,
                action_edits: Vec::new(),
            },
            collection,
        )
        .await
}
