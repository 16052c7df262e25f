//! The authoritative transition classifier.
//!
//! Single pure function from `(old, new, old_exc, new_exc, scanned)` to a
//! change type, a log decision, and a tally bucket. Every consumer of
//! transition semantics goes through here; nothing else interprets status
//! pairs.

use sqlwarden_core::types::{ChangeType, FindingStatus, Tally};

#[derive(Debug, Clone, Copy)]
pub struct TransitionInput {
    pub old_status: Option<FindingStatus>,
    pub new_status: Option<FindingStatus>,
    /// Documented-exception state frozen on the last known finding.
    pub old_exception: bool,
    /// Documented-exception state against the current finding.
    pub new_exception: bool,
    /// Justification text differs between the two runs.
    pub exception_text_changed: bool,
    /// The entity's instance completed collection this run.
    pub scanned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub change: ChangeType,
    pub should_log: bool,
    pub tally: Tally,
}

const fn outcome(change: ChangeType, should_log: bool, tally: Tally) -> TransitionOutcome {
    TransitionOutcome {
        change,
        should_log,
        tally,
    }
}

/// Classify one entity's transition between two runs.
///
/// Precedence when several conditions hold in one sync:
/// FIXED > REGRESSION > EXCEPTION_ADDED > EXCEPTION_REMOVED > STILL_FAILING.
/// A fix wins over a concurrently added exception; the exception is dropped
/// without being logged.
pub fn classify(input: &TransitionInput) -> TransitionOutcome {
    use FindingStatus::*;

    // No current observation. Only a scanned instance may testify that an
    // entity is gone; otherwise prior state is preserved untouched.
    let Some(new) = input.new_status else {
        if !input.scanned {
            return outcome(ChangeType::Unknown, false, Tally::Preserve);
        }
        return match input.old_status {
            // Entity removed from a scanned instance resolves its issue.
            Some(Fail) | Some(Warn) => outcome(ChangeType::Fixed, true, Tally::Compliant),
            _ => outcome(ChangeType::NoChange, false, Tally::Compliant),
        };
    };

    match (input.old_status, new) {
        (None, Pass) => outcome(ChangeType::NoChange, false, Tally::Compliant),
        (None, Fail | Warn) => outcome(ChangeType::NewIssue, true, Tally::Active),
        (Some(Pass), Pass) => outcome(ChangeType::NoChange, false, Tally::Compliant),
        (Some(Pass), Fail | Warn) => outcome(ChangeType::Regression, true, Tally::Active),
        (Some(Fail | Warn), Pass) => outcome(ChangeType::Fixed, true, Tally::Compliant),
        (Some(Fail | Warn), Fail | Warn) => match (input.old_exception, input.new_exception) {
            (false, true) => outcome(ChangeType::ExceptionAdded, true, Tally::Exception),
            (true, false) => outcome(ChangeType::ExceptionRemoved, true, Tally::Active),
            (true, true) if input.exception_text_changed => {
                outcome(ChangeType::ExceptionUpdated, true, Tally::Exception)
            }
            (true, true) => outcome(ChangeType::StillFailing, false, Tally::Exception),
            (false, false) => outcome(ChangeType::StillFailing, false, Tally::Active),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlwarden_core::types::FindingStatus::*;

    fn input(
        old: Option<FindingStatus>,
        new: Option<FindingStatus>,
        old_exc: bool,
        new_exc: bool,
        scanned: bool,
    ) -> TransitionInput {
        TransitionInput {
            old_status: old,
            new_status: new,
            old_exception: old_exc,
            new_exception: new_exc,
            exception_text_changed: false,
            scanned,
        }
    }

    #[test]
    fn new_discrepancy_is_logged_active() {
        let out = classify(&input(None, Some(Fail), false, false, true));
        assert_eq!(out.change, ChangeType::NewIssue);
        assert!(out.should_log);
        assert_eq!(out.tally, Tally::Active);

        let warn = classify(&input(None, Some(Warn), false, true, true));
        assert_eq!(warn.change, ChangeType::NewIssue);
    }

    #[test]
    fn new_pass_is_silent() {
        let out = classify(&input(None, Some(Pass), false, false, true));
        assert_eq!(out.change, ChangeType::NoChange);
        assert!(!out.should_log);
        assert_eq!(out.tally, Tally::Compliant);
    }

    #[test]
    fn fix_is_logged_compliant() {
        let out = classify(&input(Some(Fail), Some(Pass), false, false, true));
        assert_eq!(out.change, ChangeType::Fixed);
        assert!(out.should_log);
        assert_eq!(out.tally, Tally::Compliant);
    }

    #[test]
    fn fix_beats_concurrent_exception() {
        // Operator justified the finding in the same workbook that the
        // re-audit turned PASS: the fix wins, the exception is dropped.
        let out = classify(&input(Some(Fail), Some(Pass), false, true, true));
        assert_eq!(out.change, ChangeType::Fixed);
        assert_eq!(out.tally, Tally::Compliant);
    }

    #[test]
    fn regression_is_logged() {
        let out = classify(&input(Some(Pass), Some(Fail), false, false, true));
        assert_eq!(out.change, ChangeType::Regression);
        assert!(out.should_log);
        assert_eq!(out.tally, Tally::Active);
    }

    #[test]
    fn exception_added_and_removed() {
        let added = classify(&input(Some(Fail), Some(Fail), false, true, true));
        assert_eq!(added.change, ChangeType::ExceptionAdded);
        assert!(added.should_log);
        assert_eq!(added.tally, Tally::Exception);

        let removed = classify(&input(Some(Warn), Some(Warn), true, false, true));
        assert_eq!(removed.change, ChangeType::ExceptionRemoved);
        assert!(removed.should_log);
        assert_eq!(removed.tally, Tally::Active);
    }

    #[test]
    fn exception_text_change_is_update() {
        let mut stable = input(Some(Fail), Some(Fail), true, true, true);
        let unchanged = classify(&stable);
        assert_eq!(unchanged.change, ChangeType::StillFailing);
        assert!(!unchanged.should_log);
        assert_eq!(unchanged.tally, Tally::Exception);

        stable.exception_text_changed = true;
        let updated = classify(&stable);
        assert_eq!(updated.change, ChangeType::ExceptionUpdated);
        assert!(updated.should_log);
    }

    #[test]
    fn still_failing_is_silent() {
        let out = classify(&input(Some(Fail), Some(Warn), false, false, true));
        assert_eq!(out.change, ChangeType::StillFailing);
        assert!(!out.should_log);
        assert_eq!(out.tally, Tally::Active);
    }

    #[test]
    fn unscanned_instance_preserves_prior_state() {
        let out = classify(&input(Some(Fail), None, true, false, false));
        assert_eq!(out.change, ChangeType::Unknown);
        assert!(!out.should_log);
        assert_eq!(out.tally, Tally::Preserve);
    }

    #[test]
    fn entity_gone_from_scanned_instance_counts_fixed() {
        let out = classify(&input(Some(Fail), None, false, false, true));
        assert_eq!(out.change, ChangeType::Fixed);
        assert!(out.should_log);

        let pass_gone = classify(&input(Some(Pass), None, false, false, true));
        assert_eq!(pass_gone.change, ChangeType::NoChange);
        assert!(!pass_gone.should_log);
    }
}
