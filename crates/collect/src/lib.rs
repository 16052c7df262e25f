//! Collection interface and fan-out runner.
//!
//! The SQL query layer itself lives outside this repository; anything that
//! can produce an [`InstanceAudit`](sqlwarden_core::model::facts::InstanceAudit)
//! per target plugs in through the [`Collector`] trait. The runner owns the
//! concurrency, timeout, retry, and cancellation policy around it.

pub mod json;
pub mod mock;
pub mod runner;

use async_trait::async_trait;

use sqlwarden_core::config::TargetConfig;
use sqlwarden_core::model::facts::InstanceAudit;
use sqlwarden_core::Result;

/// Source of collected security facts for one target.
///
/// Implementations must be read-only against the target and return
/// [`AuditError::TargetUnreachable`](sqlwarden_core::AuditError::TargetUnreachable)
/// (or any error) on failure so the runner can record the instance as not
/// scanned instead of inventing an empty fact set.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, target: &TargetConfig) -> Result<InstanceAudit>;
}

pub use runner::{CollectionReport, CollectionRunner, RunnerOptions};
