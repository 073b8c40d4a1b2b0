//! copyexport Library
//!
//! A configuration-driven CSV export engine over PostgreSQL `COPY`.
//! Operators declare named, parameterized exports backed by SQL templates;
//! requests supply untyped string parameters that are validated, typed and
//! rendered as SQL literals, and the result is streamed as CSV without
//! buffering the result set.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `definition`: Export, parameter and column definitions
//! - `error`: Error types and handling
//! - `export`: Header writer, providers, audit and the export service
//! - `registry`: Definition registry and its configuration sources
//! - `sql`: Placeholder rendering and the COPY exporter
//! - `validator`: Request validation and typed values
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use copyexport::{Config, ExportService, ProviderRegistry, RawParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("exports.toml")?;
//!     let registry = config.build_registry(ProviderRegistry::new())?;
//!     let service = ExportService::new(Arc::new(registry));
//!
//!     let mut raw = RawParams::new();
//!     raw.insert("status".into(), vec!["LOANED".into()]);
//!
//!     let mut out = tokio::io::stdout();
//!     service.stream_csv("library_books", &raw, &mut out).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod definition;
pub mod error;
pub mod export;
pub mod registry;
pub mod sql;
pub mod validator;

// Re-export commonly used types
pub use config::Config;
pub use definition::{ColumnDefinition, ExportDefinition, ParamDefinition, ParamType};
pub use error::{ExportError, Result};
pub use export::{ExportCsvProvider, ExportService, ProviderRegistry, SqlCopyProvider};
pub use registry::{DefinitionSource, EnumRegistry, ExportRegistry};
pub use sql::{BulkCopy, PostgresCopyExporter};
pub use validator::{ParamValue, RawParams, RequestValidator, ValidatedExportRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
