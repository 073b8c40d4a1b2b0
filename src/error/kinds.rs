use std::io;

use thiserror::Error;

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// Wraps the more specific error kinds so that every layer of the engine
/// can propagate a single type with `?`.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Invalid or incomplete export configuration, detected at startup.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The requested export key is not registered.
    #[error("Export not found: {key}")]
    DefinitionNotFound { key: String },

    /// A request parameter failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The bulk copy failed.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Writing to the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Config or definition file not found.
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// A file could not be parsed.
    #[error("Invalid config format in {source_name}: {message}")]
    InvalidFormat {
        source_name: String,
        message: String,
    },

    /// A definition does not name a provider.
    #[error("Export {0} missing provider")]
    MissingProvider(String),

    /// A definition references a provider that was never registered.
    #[error("Export {key} references missing provider: {provider}")]
    UnknownProvider { key: String, provider: String },

    /// The same export key is defined by two resource sources.
    #[error("Duplicate export key: {0}")]
    DuplicateKey(String),

    /// A parameter declares no type.
    #[error("Param {param} of export {key} has no type")]
    MissingParamType { key: String, param: String },

    /// A parameter declares a type outside the supported set.
    #[error("Invalid param type: {0}")]
    UnsupportedParamType(String),

    /// Catch-all for invalid definition content.
    #[error("Export {key}: {message}")]
    InvalidDefinition { key: String, message: String },

    /// Invalid value for an application setting.
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },
}

/// Request validation errors. Messages name the offending parameter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown param: {0}")]
    UnknownParam(String),

    #[error("Missing required param: {0}")]
    MissingRequired(String),

    #[error("Param {param} value not allowed: {value}")]
    NotAllowed { param: String, value: String },

    #[error("Param {param} must be {expected}")]
    InvalidValue {
        param: String,
        expected: &'static str,
    },

    #[error("Param {0} enumClass missing")]
    MissingEnumReference(String),

    #[error("Param {0} enum value invalid")]
    InvalidEnumValue(String),

    #[error("maxRows must be an integer")]
    MaxRowsNotInteger,

    #[error("maxRows must be positive")]
    MaxRowsNotPositive,
}

/// Bulk copy execution errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Could not open the dedicated connection.
    #[error("Failed to connect: {0}")]
    ConnectionFailed(#[source] tokio_postgres::Error),

    /// Connecting took longer than the configured timeout.
    #[error("Connection timeout after {0} seconds")]
    ConnectTimeout(u64),

    /// The COPY statement or its transaction failed.
    #[error("CSV export failed: {0}")]
    CopyFailed(#[source] tokio_postgres::Error),

    /// The export has no copy exporter configured.
    #[error("No database configured for export {0}")]
    NotConfigured(String),
}

/// Coarse classification of an [`ExportError`], recorded in audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Configuration,
    NotFound,
    Validation,
    Execution,
    Io,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "ConfigurationError",
            ErrorClass::NotFound => "DefinitionNotFoundError",
            ErrorClass::Validation => "ValidationError",
            ErrorClass::Execution => "ExecutionError",
            ErrorClass::Io => "IoError",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExportError {
    /// Classify this error for auditing and status mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            ExportError::Configuration(_) => ErrorClass::Configuration,
            ExportError::DefinitionNotFound { .. } => ErrorClass::NotFound,
            ExportError::Validation(_) => ErrorClass::Validation,
            ExportError::Execution(_) => ErrorClass::Execution,
            ExportError::Io(_) => ErrorClass::Io,
        }
    }

    /// True for failures caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self.class(), ErrorClass::NotFound | ErrorClass::Validation)
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        ExportError::DefinitionNotFound { key: key.into() }
    }
}

impl ConfigurationError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigurationError::InvalidDefinition {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl ValidationError {
    pub(crate) fn invalid(param: &str, expected: &'static str) -> Self {
        ValidationError::InvalidValue {
            param: param.to_string(),
            expected,
        }
    }
}
