//! Audit engine: classification rules, the diff and transition machinery,
//! annotation sync, the action recorder, stats, and the run orchestrator.

pub mod annotations;
pub mod classifier;
pub mod diff;
pub mod lifecycle;
pub mod recorder;
pub mod stats;
pub mod sync;
pub mod transition;

pub use classifier::{RuleContext, Verdict};
pub use lifecycle::{begin_baseline, begin_sync, cycle_status, finalize, reopen, FinalizeOutcome};
pub use sync::{Orchestrator, RunOutcome};
pub use transition::{classify as classify_transition, TransitionInput, TransitionOutcome};
