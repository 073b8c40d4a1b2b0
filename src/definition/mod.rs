//! Export definitions
//!
//! An [`ExportDefinition`] describes one named, parameterized, row-capped CSV
//! export: which provider produces it, which request parameters it accepts
//! and how its header columns are labelled. Definitions are built once by the
//! [`ExportRegistry`](crate::registry::ExportRegistry) and never change
//! afterwards.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

pub mod descriptor;

pub use descriptor::{ColumnDescriptor, DefinitionDescriptor, ParamDescriptor};

/// Declared type of a request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Uuid,
    Int,
    Long,
    Boolean,
    Date,
    Enum,
}

impl ParamType {
    pub const ALL: [ParamType; 7] = [
        ParamType::String,
        ParamType::Uuid,
        ParamType::Int,
        ParamType::Long,
        ParamType::Boolean,
        ParamType::Date,
        ParamType::Enum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "STRING",
            ParamType::Uuid => "UUID",
            ParamType::Int => "INT",
            ParamType::Long => "LONG",
            ParamType::Boolean => "BOOLEAN",
            ParamType::Date => "DATE",
            ParamType::Enum => "ENUM",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = ConfigurationError;

    /// Parse a configured type name, case-insensitively and ignoring
    /// surrounding whitespace.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_uppercase();
        ParamType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ConfigurationError::UnsupportedParamType(raw.to_string()))
    }
}

/// Header metadata for one CSV column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub key: String,
    pub header: Option<String>,
    pub format: Option<String>,
}

impl ColumnDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: None,
            format: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Text written to the header line: the configured header, else the key.
    pub fn header_text(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.key)
    }
}

/// Declaration of one request parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDefinition {
    name: String,
    request_name: Option<String>,
    param_type: ParamType,
    enum_ref: Option<String>,
    allowed: Vec<String>,
    required: bool,
    default_value: Option<String>,
}

impl ParamDefinition {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            request_name: None,
            param_type,
            enum_ref: None,
            allowed: Vec::new(),
            required: false,
            default_value: None,
        }
    }

    pub fn with_request_name(mut self, request_name: impl Into<String>) -> Self {
        self.request_name = Some(request_name.into());
        self
    }

    pub fn with_enum_ref(mut self, enum_ref: impl Into<String>) -> Self {
        self.enum_ref = Some(enum_ref.into());
        self
    }

    pub fn with_allowed<I, S>(mut self, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = allowed.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Internal name, used as the placeholder name in SQL templates.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name the parameter is looked up under in the raw request.
    /// Defaults to the internal name.
    pub fn request_name(&self) -> &str {
        self.request_name.as_deref().unwrap_or(&self.name)
    }

    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    pub fn enum_ref(&self) -> Option<&str> {
        self.enum_ref.as_deref()
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

/// One configured export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDefinition {
    key: String,
    description: Option<String>,
    max_rows: u32,
    provider: String,
    sql: Option<String>,
    column_order: Vec<String>,
    columns: Vec<ColumnDefinition>,
    params: Vec<ParamDefinition>,
}

impl ExportDefinition {
    pub fn new(key: impl Into<String>, provider: impl Into<String>, max_rows: u32) -> Self {
        Self {
            key: key.into(),
            description: None,
            max_rows,
            provider: provider.into(),
            sql: None,
            column_order: Vec::new(),
            columns: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_column_order(mut self, column_order: Vec<String>) -> Self {
        self.column_order = column_order;
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_params(mut self, params: Vec<ParamDefinition>) -> Self {
        self.params = params;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Row ceiling; a request may lower it but never raise it.
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Canonical key order of the output columns; empty when the header
    /// follows the configured columns as given.
    pub fn column_order(&self) -> &[String] {
        &self.column_order
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn params(&self) -> &[ParamDefinition] {
        &self.params
    }

    /// Find a parameter by the name it is requested under.
    pub fn param_by_request_name(&self, request_name: &str) -> Option<&ParamDefinition> {
        self.params.iter().find(|p| p.request_name() == request_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_type_parsing() {
        assert_eq!(" date ".parse::<ParamType>().unwrap(), ParamType::Date);
        assert_eq!("enum".parse::<ParamType>().unwrap(), ParamType::Enum);
        let err = "DECIMAL".parse::<ParamType>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid param type: DECIMAL");
    }

    #[test]
    fn test_request_name_defaults_to_name() {
        let automatic = ParamDefinition::new("submissionId", ParamType::Long);
        let overridden =
            ParamDefinition::new("accountId", ParamType::Long).with_request_name("account-id");
        assert_eq!(automatic.request_name(), "submissionId");
        assert_eq!(overridden.request_name(), "account-id");
        assert_eq!(overridden.name(), "accountId");
    }

    #[test]
    fn test_column_header_text() {
        assert_eq!(ColumnDefinition::new("id").header_text(), "id");
        assert_eq!(
            ColumnDefinition::new("name").with_header("Full Name").header_text(),
            "Full Name"
        );
    }

    #[test]
    fn test_param_lookup_by_request_name() {
        let def = ExportDefinition::new("loans", "sql", 100).with_params(vec![
            ParamDefinition::new("branchCode", ParamType::String).with_request_name("branch"),
        ]);
        assert!(def.param_by_request_name("branch").is_some());
        assert!(def.param_by_request_name("branchCode").is_none());
    }
}
