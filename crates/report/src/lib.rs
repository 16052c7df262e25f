//! Spreadsheet I/O for the audit report.
//!
//! The sheet layout is data ([`schema`]), shared by [`reader`] and
//! [`writer`], so the writer cannot emit a column the reader does not know.
//! [`lock`] is the precheck that keeps a locked workbook from being half
//! rewritten.

pub mod lock;
pub mod reader;
pub mod schema;
pub mod writer;

pub use lock::ensure_writable;
pub use reader::{read_workbook, ActionRowEdit, EditableValues, SheetRow, WorkbookRead};
pub use writer::{write_workbook, ReportContext};
