pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod store;
pub mod types;
pub mod util;

pub use config::{AuditConfig, TargetConfig};
pub use error::{AuditError, Result};
pub use model::{ActionLogEntry, Annotation, AuditRun, Finding, FindingRow, ScanOutcome, Stats};
pub use store::Store;
pub use types::*;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, NaiveDate, Utc};
pub use uuid::Uuid;
