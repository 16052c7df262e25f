//! Workbook lock precheck.
//!
//! Runs before any read-modify-write of the report so a half-written file is
//! never left behind. Two signals: Excel's owner sentinel (`~$name.xlsx`)
//! next to the workbook, and an exclusive-lock probe on the file itself.

use std::fs::OpenOptions;
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use sqlwarden_core::{AuditError, Result};

pub fn ensure_writable(path: &Path) -> Result<()> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        let sentinel = path.with_file_name(format!("~${}", name));
        if sentinel.exists() {
            return Err(AuditError::WorkbookLocked {
                path: path.display().to_string(),
            });
        }
    }

    if path.exists() {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| AuditError::WorkbookLocked {
                path: path.display().to_string(),
            })?;
        file.try_lock_exclusive()
            .map_err(|_| AuditError::WorkbookLocked {
                path: path.display().to_string(),
            })?;
        let _ = FileExt::unlock(&file);
    }

    debug!(path = %path.display(), "workbook writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_writable(&dir.path().join("new.xlsx")).is_ok());
    }

    #[test]
    fn owner_sentinel_blocks_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        std::fs::write(&path, b"stub").unwrap();
        std::fs::write(dir.path().join("~$report.xlsx"), b"owner").unwrap();
        assert!(matches!(
            ensure_writable(&path),
            Err(AuditError::WorkbookLocked { .. })
        ));
    }

    #[test]
    fn plain_file_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        std::fs::write(&path, b"stub").unwrap();
        assert!(ensure_writable(&path).is_ok());
    }
}
