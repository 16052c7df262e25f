//! Scripted collector for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use sqlwarden_core::config::TargetConfig;
use sqlwarden_core::model::facts::InstanceAudit;
use sqlwarden_core::{AuditError, Result};

use crate::Collector;

/// Returns pre-scripted audits (or failures) per target id. Unknown targets
/// fail as unreachable.
#[derive(Default)]
pub struct MockCollector {
    scripted: Mutex<HashMap<String, std::result::Result<InstanceAudit, String>>>,
}

impl MockCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audit(self, target_id: &str, audit: InstanceAudit) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(target_id.to_string(), Ok(audit));
        self
    }

    pub fn with_failure(self, target_id: &str, reason: &str) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(target_id.to_string(), Err(reason.to_string()));
        self
    }

    /// Replace the scripted audit for a target between runs.
    pub fn set_audit(&self, target_id: &str, audit: InstanceAudit) {
        self.scripted
            .lock()
            .unwrap()
            .insert(target_id.to_string(), Ok(audit));
    }

    pub fn set_failure(&self, target_id: &str, reason: &str) {
        self.scripted
            .lock()
            .unwrap()
            .insert(target_id.to_string(), Err(reason.to_string()));
    }
}

#[async_trait]
impl Collector for MockCollector {
    async fn collect(&self, target: &TargetConfig) -> Result<InstanceAudit> {
        let scripted = self.scripted.lock().unwrap();
        match scripted.get(&target.id) {
            Some(Ok(audit)) => Ok(audit.clone()),
            Some(Err(reason)) => Err(AuditError::TargetUnreachable {
                target: target.display(),
                reason: reason.clone(),
            }),
            None => Err(AuditError::TargetUnreachable {
                target: target.display(),
                reason: "no scripted response".to_string(),
            }),
        }
    }
}
