//! The single source for all aggregate counts.
//!
//! Console output, the cover sheet, and the finalize gate all call
//! [`calculate`]; nothing else counts findings or log entries.

use sqlx::SqliteConnection;

use sqlwarden_core::model::Stats;
use sqlwarden_core::store::{actions, findings, runs};
use sqlwarden_core::types::ChangeType;
use sqlwarden_core::Result;

/// Compute the stats block for `current_id` within the cycle rooted at
/// `baseline_id`. `previous_id` is the preceding completed sync, when one
/// exists. Same store state in, same stats out.
pub async fn calculate(
    conn: &mut SqliteConnection,
    baseline_id: i64,
    current_id: i64,
    previous_id: Option<i64>,
) -> Result<Stats> {
    let (total_findings, active_issues, documented_exceptions, compliant) =
        findings::status_counts(conn, current_id).await?;

    let fixed_since_baseline =
        actions::count_for_cycle(conn, baseline_id, ChangeType::Fixed).await?;
    let regressions_since_baseline =
        actions::count_for_cycle(conn, baseline_id, ChangeType::Regression).await?;
    let new_issues_since_baseline =
        actions::count_for_cycle(conn, baseline_id, ChangeType::NewIssue).await?;

    let (fixed_since_last, regressions_since_last, new_issues_since_last) = match previous_id {
        Some(_) => (
            actions::count_for_sync(conn, current_id, ChangeType::Fixed).await?,
            actions::count_for_sync(conn, current_id, ChangeType::Regression).await?,
            actions::count_for_sync(conn, current_id, ChangeType::NewIssue).await?,
        ),
        None => (
            fixed_since_baseline,
            regressions_since_baseline,
            new_issues_since_baseline,
        ),
    };

    let outcomes = runs::scan_outcomes(conn, current_id).await?;
    let instances_scanned = outcomes.iter().filter(|o| o.scanned).count() as i64;
    let instances_unreachable = outcomes.iter().filter(|o| !o.scanned).count() as i64;

    Ok(Stats {
        total_findings,
        active_issues,
        documented_exceptions,
        compliant,
        fixed_since_baseline,
        regressions_since_baseline,
        new_issues_since_baseline,
        fixed_since_last,
        regressions_since_last,
        new_issues_since_last,
        instances_scanned,
        instances_unreachable,
    })
}
