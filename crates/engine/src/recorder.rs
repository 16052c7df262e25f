//! Action recorder: the only writer of the action log during a sync.

use std::collections::HashSet;

use sqlx::SqliteConnection;
use tracing::warn;

use sqlwarden_core::store::actions::{self, NewAction};
use sqlwarden_core::types::{ActionStatus, ChangeType, FindingType};
use sqlwarden_core::util::parse_loose_date;
use sqlwarden_core::Result;
use sqlwarden_report::ActionRowEdit;

/// Deduplicates within one sync before the store's unique index ever sees a
/// conflict, so insertion order (and therefore log id order) stays exactly
/// the processing order.
pub struct ActionRecorder {
    initial_run_id: i64,
    sync_run_id: Option<i64>,
    seen: HashSet<(String, ChangeType)>,
    recorded: usize,
}

impl ActionRecorder {
    pub fn new(initial_run_id: i64, sync_run_id: Option<i64>) -> Self {
        Self {
            initial_run_id,
            sync_run_id,
            seen: HashSet::new(),
            recorded: 0,
        }
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Append one classified transition. Returns false when the entry was a
    /// duplicate (already seen this sync, or already in the log).
    pub async fn record(
        &mut self,
        conn: &mut SqliteConnection,
        finding_type: FindingType,
        entity_key: &str,
        change_type: ChangeType,
        status: ActionStatus,
        description: String,
    ) -> Result<bool> {
        if !self.seen.insert((entity_key.to_string(), change_type)) {
            return Ok(false);
        }
        let inserted = actions::append(
            conn,
            &NewAction {
                initial_run_id: self.initial_run_id,
                sync_run_id: self.sync_run_id,
                entity_key: entity_key.to_string(),
                finding_type,
                change_type,
                status,
                description,
            },
        )
        .await?;
        if inserted {
            self.recorded += 1;
        }
        Ok(inserted)
    }
}

/// Round-trip operator edits from the workbook's Actions sheet. Rows are
/// matched by id; unknown ids and unparseable override dates are logged and
/// skipped, never fatal.
pub async fn apply_action_edits(
    conn: &mut SqliteConnection,
    edits: &[ActionRowEdit],
) -> Result<usize> {
    let mut applied = 0;
    for edit in edits {
        let override_date = if edit.date_override.trim().is_empty() {
            None
        } else {
            match parse_loose_date(&edit.date_override) {
                Some(date) => Some(date),
                None => {
                    warn!(
                        id = edit.id,
                        raw = %edit.date_override,
                        "unparseable action date override, ignoring"
                    );
                    None
                }
            }
        };
        let notes = if edit.notes.trim().is_empty() {
            None
        } else {
            Some(edit.notes.as_str())
        };
        if notes.is_none() && override_date.is_none() {
            continue;
        }
        if actions::apply_operator_edit(conn, edit.id, notes, override_date).await? {
            applied += 1;
        } else {
            warn!(id = edit.id, "action edit references unknown entry");
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlwarden_core::store::{runs, Store};
    use sqlwarden_core::types::RunType;

    #[tokio::test]
    async fn recorder_dedups_within_sync() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let baseline = runs::begin_run(
            &mut conn,
            "Contoso",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            RunType::Baseline,
            None,
            "h",
        )
        .await
        .unwrap();

        let mut recorder = ActionRecorder::new(baseline, Some(baseline + 1));
        let first = recorder
            .record(
                &mut conn,
                FindingType::Config,
                "config|srv1|default|xp_cmdshell",
                ChangeType::Fixed,
                ActionStatus::Closed,
                "fixed".into(),
            )
            .await
            .unwrap();
        let second = recorder
            .record(
                &mut conn,
                FindingType::Config,
                "config|srv1|default|xp_cmdshell",
                ChangeType::Fixed,
                ActionStatus::Closed,
                "fixed again".into(),
            )
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(recorder.recorded(), 1);
    }

    #[tokio::test]
    async fn action_edit_with_bad_date_keeps_notes() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let baseline = runs::begin_run(
            &mut conn,
            "Contoso",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            RunType::Baseline,
            None,
            "h",
        )
        .await
        .unwrap();
        let mut recorder = ActionRecorder::new(baseline, None);
        recorder
            .record(
                &mut conn,
                FindingType::Login,
                "login|srv1|default|app_reader",
                ChangeType::NewIssue,
                ActionStatus::Open,
                "new".into(),
            )
            .await
            .unwrap();
        let entry = sqlwarden_core::store::actions::for_cycle(&mut conn, baseline)
            .await
            .unwrap()
            .remove(0);

        let applied = apply_action_edits(
            &mut conn,
            &[ActionRowEdit {
                id: entry.id,
                notes: "tracked in TICKET-1".into(),
                date_override: "sometime soon".into(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(applied, 1);

        let after = sqlwarden_core::store::actions::get(&mut conn, entry.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.notes.as_deref(), Some("tracked in TICKET-1"));
        assert_eq!(after.user_date_override, None);
    }
}
