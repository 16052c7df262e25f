//! Fact-file collector.
//!
//! The external collection agent queries each instance and drops one JSON
//! document per target (`<dir>/<target_id>.json`) in the
//! [`InstanceAudit`] schema. This collector hands those documents to the
//! audit pipeline; a missing or malformed file marks the target unreachable
//! so its prior findings are preserved.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use sqlwarden_core::config::TargetConfig;
use sqlwarden_core::model::facts::InstanceAudit;
use sqlwarden_core::{AuditError, Result};

use crate::Collector;

pub struct JsonCollector {
    root: PathBuf,
}

impl JsonCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Collector for JsonCollector {
    async fn collect(&self, target: &TargetConfig) -> Result<InstanceAudit> {
        let path = self.root.join(format!("{}.json", target.id));
        debug!(target = %target.display(), path = %path.display(), "reading fact file");

        let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
            AuditError::TargetUnreachable {
                target: target.display(),
                reason: format!("fact file {}: {}", path.display(), err),
            }
        })?;

        let audit: InstanceAudit =
            serde_json::from_str(&raw).map_err(|err| AuditError::TargetUnreachable {
                target: target.display(),
                reason: format!("fact file {}: {}", path.display(), err),
            })?;
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlwarden_core::config::AuthMode;
    use sqlwarden_core::model::facts::FindingFacts;

    fn target(id: &str) -> TargetConfig {
        TargetConfig {
            id: id.into(),
            display_name: None,
            server: "srv1".into(),
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

    #[tokio::test]
    async fn reads_fact_file_for_target() {
        let dir = tempfile::tempdir().unwrap();
        let audit = InstanceAudit {
            server: "srv1".into(),
            instance: "DEFAULT".into(),
            port: Some(1433),
            facts: vec![FindingFacts::ConfigSetting {
                setting: "xp_cmdshell".into(),
                value_in_use: 0,
            }],
        };
        std::fs::write(
            dir.path().join("t1.json"),
            serde_json::to_string(&audit).unwrap(),
        )
        .unwrap();

        let collector = JsonCollector::new(dir.path());
        let loaded = collector.collect(&target("t1")).await.unwrap();
        assert_eq!(loaded.server, "srv1");
        assert_eq!(loaded.facts.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let collector = JsonCollector::new(dir.path());
        let result = collector.collect(&target("absent")).await;
        assert!(matches!(result, Err(AuditError::TargetUnreachable { .. })));
    }
}
