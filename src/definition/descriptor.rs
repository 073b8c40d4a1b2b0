//! Serde shapes of definitions as they appear in configuration files.
//!
//! Field names follow the external camelCase form (`maxRows`, `requestName`,
//! `enumClass`, `defaultValue`) in both TOML and YAML sources.

use serde::{Deserialize, Serialize};

/// Unvalidated definition as read from a configuration source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefinitionDescriptor {
    pub description: Option<String>,
    pub max_rows: Option<i64>,
    pub provider: Option<String>,
    pub sql: Option<String>,
    /// Keys of the columns the query produces, in output order.
    pub column_order: Vec<String>,
    pub columns: Vec<ColumnDescriptor>,
    pub params: Vec<ParamDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDescriptor {
    pub key: String,
    pub header: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamDescriptor {
    pub name: String,
    pub request_name: Option<String>,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub enum_class: Option<String>,
    pub allowed: Vec<String>,
    pub required: bool,
    pub default_value: Option<String>,
}

impl DefinitionDescriptor {
    /// Whether a root-level document looks like a single definition.
    pub(crate) fn looks_like_definition(value: &serde_json::Value) -> bool {
        value.get("sql").is_some() || value.get("provider").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_toml() {
        let descriptor: DefinitionDescriptor = toml::from_str(
            r#"
            description = "Overdue loans"
            maxRows = 200
            provider = "sql"
            sql = "select 1"
            columnOrder = ["loanId", "dueDate"]

            [[columns]]
            key = "loanId"
            header = "Loan ID"

            [[params]]
            name = "asOfDate"
            type = "DATE"
            required = true

            [[params]]
            name = "branchCode"
            requestName = "branch"
            type = "STRING"
            allowed = ["NORTH", "SOUTH"]
            defaultValue = "NORTH"
            "#,
        )
        .unwrap();

        assert_eq!(descriptor.max_rows, Some(200));
        assert_eq!(descriptor.column_order, vec!["loanId", "dueDate"]);
        assert_eq!(descriptor.columns[0].header.as_deref(), Some("Loan ID"));
        assert_eq!(descriptor.params.len(), 2);
        assert!(descriptor.params[0].required);
        assert_eq!(descriptor.params[1].request_name.as_deref(), Some("branch"));
        assert_eq!(descriptor.params[1].default_value.as_deref(), Some("NORTH"));
    }

    #[test]
    fn test_deserialize_yaml_defaults() {
        let descriptor: DefinitionDescriptor =
            serde_yaml::from_str("provider: booksProvider\n").unwrap();
        assert_eq!(descriptor.provider.as_deref(), Some("booksProvider"));
        assert!(descriptor.params.is_empty());
        assert!(descriptor.max_rows.is_none());
    }
}
