//! CSV export: header writer, providers, audit and the orchestrating service.

pub mod audit;
pub mod header;
pub mod provider;
pub mod service;

pub use audit::{ExportAuditEvent, ExportAuditSink, LogAuditSink};
pub use header::{escape_field, header_line, resolve_columns, write_header};
pub use provider::{ExportCsvProvider, ProviderRegistry, SQL_PROVIDER, SqlCopyProvider};
pub use service::{ExportService, suggested_filename, suggested_filename_today};
