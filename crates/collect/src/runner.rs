//! Bounded fan-out over targets with timeout, retry, and a wall-clock cap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use sqlwarden_core::config::{PerformanceConfig, TargetConfig};
use sqlwarden_core::model::facts::InstanceAudit;
use sqlwarden_core::model::ScanOutcome;
use sqlwarden_core::{AuditError, Result};

use crate::Collector;

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub max_parallel: usize,
    pub target_timeout: Duration,
    pub retries: u32,
    pub wall_clock_cap: Duration,
}

impl RunnerOptions {
    pub fn from_performance(perf: &PerformanceConfig) -> Self {
        Self {
            max_parallel: perf.max_parallel_tasks.max(1),
            target_timeout: Duration::from_secs(perf.target_timeout_seconds),
            retries: perf.collection_retries,
            wall_clock_cap: Duration::from_secs(perf.sync_wall_clock_minutes * 60),
        }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            target_timeout: Duration::from_secs(120),
            retries: 2,
            wall_clock_cap: Duration::from_secs(60 * 60),
        }
    }
}

/// Merged result of one collection pass. `outcomes` covers every enabled
/// target; `audits` only the ones that scanned.
#[derive(Debug)]
pub struct CollectionReport {
    pub audits: Vec<InstanceAudit>,
    pub outcomes: Vec<ScanOutcome>,
}

pub struct CollectionRunner {
    collector: Arc<dyn Collector>,
    options: RunnerOptions,
}

impl CollectionRunner {
    pub fn new(collector: Arc<dyn Collector>, options: RunnerOptions) -> Self {
        Self { collector, options }
    }

    /// Collect all targets. Per-target failures are demoted to warnings and
    /// recorded in the outcome list; only the wall-clock cap aborts with
    /// [`AuditError::Cancelled`].
    pub async fn run(&self, targets: &[TargetConfig]) -> Result<CollectionReport> {
        let work = self.fan_out(targets);
        match timeout(self.options.wall_clock_cap, work).await {
            Ok(report) => Ok(report),
            Err(_) => {
                warn!(
                    cap_secs = self.options.wall_clock_cap.as_secs(),
                    "collection exceeded wall-clock cap"
                );
                Err(AuditError::Cancelled)
            }
        }
    }

    async fn fan_out(&self, targets: &[TargetConfig]) -> CollectionReport {
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel));
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            let target = target.clone();
            let collector = Arc::clone(&self.collector);
            let semaphore = Arc::clone(&semaphore);
            let per_target = self.options.target_timeout;
            let retries = self.options.retries;

            handles.push(tokio::spawn(async move {
                // Semaphore closed only on runtime shutdown.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                collect_one(collector.as_ref(), &target, per_target, retries).await
            }));
        }

        let mut audits = Vec::new();
        let mut outcomes = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((outcome, audit)) => {
                    if let Some(audit) = audit {
                        audits.push(audit);
                    }
                    outcomes.push(outcome);
                }
                Err(join_err) => {
                    warn!(error = %join_err, "collection task panicked");
                }
            }
        }

        info!(
            scanned = outcomes.iter().filter(|o| o.scanned).count(),
            unreachable = outcomes.iter().filter(|o| !o.scanned).count(),
            "collection pass finished"
        );
        CollectionReport { audits, outcomes }
    }
}

async fn collect_one(
    collector: &dyn Collector,
    target: &TargetConfig,
    per_target: Duration,
    retries: u32,
) -> (ScanOutcome, Option<InstanceAudit>) {
    let mut last_error = String::new();
    for attempt in 0..=retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, ...
            let backoff = Duration::from_secs(1u64 << (attempt - 1).min(5));
            tokio::time::sleep(backoff).await;
        }
        match timeout(per_target, collector.collect(target)).await {
            Ok(Ok(audit)) => {
                return (
                    ScanOutcome {
                        target_id: target.id.clone(),
                        server: audit.server.clone(),
                        instance: audit.instance.clone(),
                        scanned: true,
                        error: None,
                    },
                    Some(audit),
                );
            }
            Ok(Err(err)) => {
                last_error = err.to_string();
                warn!(target = %target.display(), attempt, error = %last_error, "collection failed");
            }
            Err(_) => {
                last_error = format!("timed out after {}s", per_target.as_secs());
                warn!(target = %target.display(), attempt, "collection timed out");
            }
        }
    }
    (
        ScanOutcome {
            target_id: target.id.clone(),
            server: target.server.clone(),
            instance: target.instance_label(),
            scanned: false,
            error: Some(last_error),
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCollector;
    use sqlwarden_core::config::AuthMode;
    use sqlwarden_core::model::facts::FindingFacts;

    fn target(id: &str, server: &str) -> TargetConfig {
        TargetConfig {
            id: id.into(),
            display_name: None,
            server: server.into(),
            instance: None,
            port: None,
            auth: AuthMode::Integrated,
            username: None,
            credential_ref: None,
            connect_timeout_seconds: 15,
            enabled: true,
            tags: vec![],
        }
    }

    fn audit(server: &str) -> InstanceAudit {
        InstanceAudit {
            server: server.into(),
            instance: "DEFAULT".into(),
            port: None,
            facts: vec![FindingFacts::SaAccount {
                principal_id: 1,
                current_name: "sa".into(),
                enabled: false,
            }],
        }
    }

    #[tokio::test]
    async fn unreachable_target_becomes_unscanned_outcome() {
        let collector = MockCollector::new()
            .with_audit("t1", audit("srv1"))
            .with_failure("t2", "connection refused");
        let runner = CollectionRunner::new(
            Arc::new(collector),
            RunnerOptions {
                retries: 0,
                ..RunnerOptions::default()
            },
        );

        let report = runner
            .run(&[target("t1", "srv1"), target("t2", "srv2")])
            .await
            .unwrap();

        assert_eq!(report.audits.len(), 1);
        assert_eq!(report.outcomes.len(), 2);
        let failed = report.outcomes.iter().find(|o| o.target_id == "t2").unwrap();
        assert!(!failed.scanned);
        assert!(failed.error.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn all_targets_scanned_in_bounded_parallel() {
        let mut collector = MockCollector::new();
        let mut targets = Vec::new();
        for n in 0..12 {
            let id = format!("t{}", n);
            let server = format!("srv{}", n);
            collector = collector.with_audit(&id, audit(&server));
            targets.push(target(&id, &server));
        }
        let runner = CollectionRunner::new(
            Arc::new(collector),
            RunnerOptions {
                max_parallel: 3,
                retries: 0,
                ..RunnerOptions::default()
            },
        );
        let report = runner.run(&targets).await.unwrap();
        assert_eq!(report.audits.len(), 12);
        assert!(report.outcomes.iter().all(|o| o.scanned));
    }
}
