//! Error handling for the export engine.
//!
//! Every fallible operation returns [`Result`], whose error is the crate-wide
//! [`ExportError`]. The variants mirror how a boundary layer maps failures:
//!
//! - `Validation` and `DefinitionNotFound` are client errors (4xx / 404)
//! - `Configuration` aborts startup
//! - `Execution` and `Io` are server errors (5xx)
//!
//! # Example
//!
//! ```rust
//! use copyexport::error::{ExportError, ValidationError};
//!
//! let err: ExportError = ValidationError::MissingRequired("asOfDate".into()).into();
//! assert!(err.is_client_error());
//! assert_eq!(err.to_string(), "Missing required param: asOfDate");
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ConfigurationError, ErrorClass, ExecutionError, ExportError, Result, ValidationError,
};
