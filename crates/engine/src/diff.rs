//! Pure diff of two finding sets.

use std::collections::{BTreeMap, HashSet};

use sqlwarden_core::model::FindingRow;
use sqlwarden_core::types::{FindingStatus, FindingType};

/// One entity's status across the two runs. `None` on either side means the
/// entity was absent from that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub finding_type: FindingType,
    pub entity_key: String,
    pub old_status: Option<FindingStatus>,
    pub new_status: Option<FindingStatus>,
    /// `server|instance` the entity lives on, from whichever side has it.
    pub instance_ref: String,
}

#[derive(Debug)]
pub struct DiffResult {
    /// Transitions in stable `(finding_type, entity_key)` order so action
    /// log ids are reproducible across identical syncs.
    pub transitions: Vec<Transition>,
    /// Instances that produced findings this run; derived from `curr`. An
    /// entity absent under an instance outside this set was not observed,
    /// not fixed.
    pub scanned_instances: HashSet<String>,
}

/// Compare two runs' findings. Pure; consults nothing but its arguments.
pub fn diff(prev: &[FindingRow], curr: &[FindingRow]) -> DiffResult {
    let scanned_instances: HashSet<String> = curr.iter().map(|f| f.instance_ref()).collect();

    let mut merged: BTreeMap<(FindingType, String), Transition> = BTreeMap::new();

    for row in prev {
        let key = (row.finding.finding_type, row.finding.entity_key.clone());
        merged.insert(
            key,
            Transition {
                finding_type: row.finding.finding_type,
                entity_key: row.finding.entity_key.clone(),
                old_status: Some(row.finding.status),
                new_status: None,
                instance_ref: row.instance_ref(),
            },
        );
    }

    for row in curr {
        let key = (row.finding.finding_type, row.finding.entity_key.clone());
        merged
            .entry(key)
            .and_modify(|t| {
                t.new_status = Some(row.finding.status);
                t.instance_ref = row.instance_ref();
            })
            .or_insert_with(|| Transition {
                finding_type: row.finding.finding_type,
                entity_key: row.finding.entity_key.clone(),
                old_status: None,
                new_status: Some(row.finding.status),
                instance_ref: row.instance_ref(),
            });
    }

    DiffResult {
        transitions: merged.into_values().collect(),
        scanned_instances,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlwarden_core::model::Finding;
    use sqlwarden_core::types::Risk;

    fn row(finding_type: FindingType, key: &str, server: &str, status: FindingStatus) -> FindingRow {
        FindingRow {
            finding: Finding {
                id: 0,
                run_id: 1,
                instance_id: 1,
                finding_type,
                entity_key: key.to_string(),
                row_uuid: None,
                status,
                risk: Risk::Medium,
                description: String::new(),
                recommendation: String::new(),
                details: serde_json::Value::Null,
                has_exception: false,
                exception_text: String::new(),
            },
            server: server.to_string(),
            instance: "DEFAULT".to_string(),
        }
    }

    #[test]
    fn union_of_keys_with_status_pairs() {
        let prev = vec![
            row(FindingType::Config, "config|srv1|default|a", "srv1", FindingStatus::Fail),
            row(FindingType::Config, "config|srv1|default|b", "srv1", FindingStatus::Pass),
        ];
        let curr = vec![
            row(FindingType::Config, "config|srv1|default|a", "srv1", FindingStatus::Pass),
            row(FindingType::Config, "config|srv1|default|c", "srv1", FindingStatus::Fail),
        ];

        let result = diff(&prev, &curr);
        assert_eq!(result.transitions.len(), 3);

        let a = &result.transitions[0];
        assert_eq!(a.entity_key, "config|srv1|default|a");
        assert_eq!(a.old_status, Some(FindingStatus::Fail));
        assert_eq!(a.new_status, Some(FindingStatus::Pass));

        let b = &result.transitions[1];
        assert_eq!(b.new_status, None);

        let c = &result.transitions[2];
        assert_eq!(c.old_status, None);
        assert_eq!(c.new_status, Some(FindingStatus::Fail));
    }

    #[test]
    fn scanned_set_derives_from_current() {
        let prev = vec![row(FindingType::Config, "config|srv2|default|a", "srv2", FindingStatus::Fail)];
        let curr = vec![row(FindingType::Config, "config|srv1|default|a", "srv1", FindingStatus::Pass)];

        let result = diff(&prev, &curr);
        assert!(result.scanned_instances.contains("srv1|default"));
        assert!(!result.scanned_instances.contains("srv2|default"));
    }

    #[test]
    fn transitions_are_ordered_and_deterministic() {
        let curr = vec![
            row(FindingType::Login, "login|srv1|default|z", "srv1", FindingStatus::Fail),
            row(FindingType::Config, "config|srv1|default|m", "srv1", FindingStatus::Fail),
        ];
        let first = diff(&[], &curr);
        let second = diff(&[], &curr);
        let keys: Vec<&str> = first.transitions.iter().map(|t| t.entity_key.as_str()).collect();
        let keys2: Vec<&str> = second.transitions.iter().map(|t| t.entity_key.as_str()).collect();
        assert_eq!(keys, keys2);
        // Config sorts before Login in the finding type order.
        assert_eq!(keys[0], "config|srv1|default|m");
    }
}
