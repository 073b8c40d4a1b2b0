//! Request validation
//!
//! Turns the untyped, possibly repeated string parameters of a request into a
//! [`ValidatedExportRequest`] for one [`ExportDefinition`]. Validation is all
//! or nothing: the first offending parameter aborts with a
//! [`ValidationError`] naming it.
//!
//! # Example
//!
//! ```rust
//! use copyexport::definition::{ExportDefinition, ParamDefinition, ParamType};
//! use copyexport::validator::{RawParams, RequestValidator};
//!
//! let def = ExportDefinition::new("library_books", "sql", 200)
//!     .with_params(vec![ParamDefinition::new("status", ParamType::String)]);
//! let mut raw = RawParams::new();
//! raw.insert("maxRows".into(), vec!["999".into()]);
//!
//! let validated = RequestValidator::default().validate(&def, &raw).unwrap();
//! assert_eq!(validated.max_rows(), 200);
//! assert!(validated.get("status").is_none());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::definition::{ExportDefinition, ParamDefinition, ParamType};
use crate::error::{Result, ValidationError};
use crate::registry::EnumRegistry;

pub mod value;

pub use value::{MAX_ROWS_PARAM, ParamValue, RawParams, ValidatedExportRequest};

type Parsed<T> = std::result::Result<T, ValidationError>;

/// Stateless validator; cheap to clone and share between concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct RequestValidator {
    enums: Arc<EnumRegistry>,
}

impl RequestValidator {
    /// Create a validator resolving ENUM parameters against `enums`.
    pub fn new(enums: Arc<EnumRegistry>) -> Self {
        Self { enums }
    }

    pub fn enums(&self) -> &EnumRegistry {
        &self.enums
    }

    /// Validate raw request parameters against a definition.
    ///
    /// # Arguments
    /// * `def` - Definition declaring the accepted parameters
    /// * `raw` - Raw parameters, including the optional `maxRows` override
    ///
    /// # Returns
    /// * `Result<ValidatedExportRequest>` - Typed request or the first validation error
    pub fn validate(
        &self,
        def: &ExportDefinition,
        raw: &RawParams,
    ) -> Result<ValidatedExportRequest> {
        Self::reject_unknown(def, raw)?;

        let mut params = BTreeMap::new();
        for param in def.params() {
            let supplied = match raw.get(param.request_name()) {
                Some(values) if !values.is_empty() => self.parse_values(param, values)?,
                _ => None,
            };
            let value = match supplied {
                Some(value) => Some(value),
                None => self.parse_default(param)?,
            };
            match value {
                Some(value) => {
                    params.insert(param.name().to_string(), value);
                }
                None if param.is_required() => {
                    let name = param.request_name().to_string();
                    return Err(ValidationError::MissingRequired(name).into());
                }
                None => {}
            }
        }

        let (max_rows, requested) =
            negotiate_max_rows(def.max_rows(), raw.get(MAX_ROWS_PARAM))?;
        debug!(
            "Validated export {}: {} params, maxRows={}",
            def.key(),
            params.len(),
            max_rows
        );

        Ok(ValidatedExportRequest::new(params, max_rows, requested, raw.clone()))
    }

    /// Parse one raw value for a parameter.
    ///
    /// Blank input is treated as "not supplied" and yields `Ok(None)`.
    pub fn parse_value(&self, param: &ParamDefinition, raw: &str) -> Parsed<Option<ParamValue>> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let normalized = match param.param_type() {
            ParamType::Enum => value.to_uppercase(),
            _ => value.to_string(),
        };
        if !param.allowed().is_empty() && !param.allowed().iter().any(|a| *a == normalized) {
            return Err(ValidationError::NotAllowed {
                param: param.request_name().to_string(),
                value: value.to_string(),
            });
        }

        let name = param.request_name();
        let parsed = match param.param_type() {
            ParamType::String => ParamValue::Str(value.to_string()),
            ParamType::Uuid => Uuid::parse_str(value)
                .map(ParamValue::Uuid)
                .map_err(|_| ValidationError::invalid(name, "a UUID"))?,
            ParamType::Int => value
                .parse::<i32>()
                .map(ParamValue::Int)
                .map_err(|_| ValidationError::invalid(name, "an integer"))?,
            ParamType::Long => value
                .parse::<i64>()
                .map(ParamValue::Long)
                .map_err(|_| ValidationError::invalid(name, "a long"))?,
            ParamType::Boolean => parse_bool(value)
                .map(ParamValue::Bool)
                .ok_or_else(|| ValidationError::invalid(name, "true or false"))?,
            ParamType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(ParamValue::Date)
                .map_err(|_| ValidationError::invalid(name, "a date (yyyy-MM-dd)"))?,
            ParamType::Enum => self.parse_enum(param, &normalized)?,
        };
        Ok(Some(parsed))
    }

    /// Parse the configured default of a parameter, if any.
    pub fn parse_default(&self, param: &ParamDefinition) -> Parsed<Option<ParamValue>> {
        match param.default_value() {
            Some(default) => self.parse_value(param, default),
            None => Ok(None),
        }
    }

    fn parse_values(
        &self,
        param: &ParamDefinition,
        values: &[String],
    ) -> Parsed<Option<ParamValue>> {
        if let [single] = values {
            return self.parse_value(param, single);
        }

        let mut items = Vec::with_capacity(values.len());
        for raw in values {
            if let Some(value) = self.parse_value(param, raw)? {
                items.push(value);
            }
        }
        Ok((!items.is_empty()).then_some(ParamValue::List(items)))
    }

    fn parse_enum(&self, param: &ParamDefinition, normalized: &str) -> Parsed<ParamValue> {
        let enum_ref = param
            .enum_ref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ValidationError::MissingEnumReference(param.request_name().to_string())
            })?;

        self.enums
            .resolve(enum_ref, normalized)
            .map(|v| ParamValue::Enum(v.to_string()))
            .ok_or_else(|| ValidationError::InvalidEnumValue(param.request_name().to_string()))
    }

    fn reject_unknown(def: &ExportDefinition, raw: &RawParams) -> Parsed<()> {
        let mut unknown: Vec<&String> = raw
            .keys()
            .filter(|name| name.as_str() != MAX_ROWS_PARAM)
            .filter(|name| def.param_by_request_name(name).is_none())
            .collect();
        unknown.sort();
        match unknown.first() {
            Some(name) => Err(ValidationError::UnknownParam((*name).clone())),
            None => Ok(()),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Resolve the row cap for a request: `min(requested, ceiling)`, or the
/// ceiling when no override was supplied.
fn negotiate_max_rows(ceiling: u32, raw: Option<&Vec<String>>) -> Parsed<(u32, Option<u64>)> {
    let Some(first) = raw.and_then(|values| values.first()) else {
        return Ok((ceiling, None));
    };

    let requested: i64 = first
        .trim()
        .parse()
        .map_err(|_| ValidationError::MaxRowsNotInteger)?;
    if requested <= 0 {
        return Err(ValidationError::MaxRowsNotPositive);
    }

    let requested = requested as u64;
    let negotiated = requested.min(u64::from(ceiling)) as u32;
    Ok((negotiated, Some(requested)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    /// Build raw params from query-string style pairs; repeated names
    /// accumulate in order.
    fn raw(pairs: &[(&str, &str)]) -> RawParams {
        let mut params = RawParams::new();
        for (name, value) in pairs {
            params
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        params
    }

    fn validator() -> RequestValidator {
        let enums = EnumRegistry::new().with_enum("LoanStatus", ["active", "returned", "overdue"]);
        RequestValidator::new(Arc::new(enums))
    }

    fn validation_message(result: Result<ValidatedExportRequest>) -> String {
        match result {
            Err(ExportError::Validation(e)) => e.to_string(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_param_absent_uses_definition_cap() {
        let def = ExportDefinition::new("library_books", "sql", 50000)
            .with_params(vec![ParamDefinition::new("status", ParamType::String)]);

        let validated = validator().validate(&def, &RawParams::new()).unwrap();
        assert!(validated.get("status").is_none());
        assert_eq!(validated.max_rows(), 50000);
        assert_eq!(validated.requested_max_rows(), None);
    }

    #[test]
    fn test_missing_required_param() {
        let def = ExportDefinition::new("loans", "sql", 100)
            .with_params(vec![ParamDefinition::new("asOfDate", ParamType::Date).required(true)]);

        let msg = validation_message(validator().validate(&def, &RawParams::new()));
        assert_eq!(msg, "Missing required param: asOfDate");
    }

    #[test]
    fn test_blank_required_value_is_missing() {
        let def = ExportDefinition::new("loans", "sql", 100)
            .with_params(vec![ParamDefinition::new("asOfDate", ParamType::Date).required(true)]);

        let result = validator().validate(&def, &raw(&[("asOfDate", "  ")]));
        let msg = validation_message(result);
        assert_eq!(msg, "Missing required param: asOfDate");
    }

    #[test]
    fn test_required_param_falls_back_to_default() {
        let def = ExportDefinition::new("loans", "sql", 100).with_params(vec![
            ParamDefinition::new("asOfDate", ParamType::Date)
                .required(true)
                .with_default("2024-01-31"),
        ]);

        let validated = validator().validate(&def, &RawParams::new()).unwrap();
        assert_eq!(validated.get_date("asOfDate"), NaiveDate::from_ymd_opt(2024, 1, 31));
    }

    #[test]
    fn test_max_rows_negotiation() {
        let def = ExportDefinition::new("books", "sql", 200);
        let v = validator();

        let capped = v.validate(&def, &raw(&[("maxRows", "999")])).unwrap();
        assert_eq!(capped.max_rows(), 200);
        assert_eq!(capped.requested_max_rows(), Some(999));

        let lowered = v.validate(&def, &raw(&[("maxRows", "50")])).unwrap();
        assert_eq!(lowered.max_rows(), 50);

        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("maxRows", "0")]))),
            "maxRows must be positive"
        );
        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("maxRows", "-3")]))),
            "maxRows must be positive"
        );
        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("maxRows", "lots")]))),
            "maxRows must be an integer"
        );
    }

    #[test]
    fn test_unknown_param_rejected() {
        let def = ExportDefinition::new("books", "sql", 10)
            .with_params(vec![ParamDefinition::new("status", ParamType::String)]);

        let msg = validation_message(
            validator().validate(&def, &raw(&[("zeta", "1"), ("alpha", "2")])),
        );
        assert_eq!(msg, "Unknown param: alpha");
    }

    #[test]
    fn test_request_name_alias() {
        let def = ExportDefinition::new("accounts", "sql", 10).with_params(vec![
            ParamDefinition::new("accountId", ParamType::Long).with_request_name("account-id"),
        ]);
        let v = validator();

        let validated = v.validate(&def, &raw(&[("account-id", "42")])).unwrap();
        assert_eq!(validated.get("accountId"), Some(&ParamValue::Long(42)));

        let msg = validation_message(v.validate(&def, &raw(&[("accountId", "42")])));
        assert_eq!(msg, "Unknown param: accountId");
    }

    #[test]
    fn test_type_parsing() {
        let def = ExportDefinition::new("typed", "sql", 10).with_params(vec![
            ParamDefinition::new("id", ParamType::Uuid),
            ParamDefinition::new("count", ParamType::Int),
            ParamDefinition::new("total", ParamType::Long),
            ParamDefinition::new("active", ParamType::Boolean),
            ParamDefinition::new("day", ParamType::Date),
            ParamDefinition::new("name", ParamType::String),
        ]);
        let id = "6f1c2d1e-9a0b-4c7d-8e2f-0a1b2c3d4e5f";

        let validated = validator()
            .validate(
                &def,
                &raw(&[
                    ("id", id),
                    ("count", "7"),
                    ("total", "9000000000"),
                    ("active", "TRUE"),
                    ("day", "2024-02-29"),
                    ("name", "  O'Hara  "),
                ]),
            )
            .unwrap();

        assert_eq!(validated.get_uuid("id"), Some(Uuid::parse_str(id).unwrap()));
        assert_eq!(validated.get("count"), Some(&ParamValue::Int(7)));
        assert_eq!(validated.get("total"), Some(&ParamValue::Long(9_000_000_000)));
        assert_eq!(validated.get_bool("active"), Some(true));
        assert_eq!(validated.get_date("day"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(validated.get_str("name"), Some("O'Hara"));
    }

    #[test]
    fn test_malformed_values_name_the_param() {
        let cases: &[(ParamType, &str, &str)] = &[
            (ParamType::Uuid, "not-a-uuid", "Param p must be a UUID"),
            (ParamType::Int, "9000000000", "Param p must be an integer"),
            (ParamType::Long, "1.5", "Param p must be a long"),
            (ParamType::Boolean, "yes", "Param p must be true or false"),
            (ParamType::Date, "01/02/2024", "Param p must be a date (yyyy-MM-dd)"),
        ];
        for (param_type, input, expected) in cases {
            let def = ExportDefinition::new("typed", "sql", 10)
                .with_params(vec![ParamDefinition::new("p", *param_type)]);
            let msg = validation_message(validator().validate(&def, &raw(&[("p", *input)])));
            assert_eq!(msg, *expected);
        }
    }

    #[test]
    fn test_enum_normalized_and_resolved() {
        let def = ExportDefinition::new("loans", "sql", 10).with_params(vec![
            ParamDefinition::new("status", ParamType::Enum).with_enum_ref("LoanStatus"),
        ]);
        let v = validator();

        let validated = v.validate(&def, &raw(&[("status", "overdue")])).unwrap();
        assert_eq!(validated.get("status"), Some(&ParamValue::Enum("OVERDUE".into())));

        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("status", "lost")]))),
            "Param status enum value invalid"
        );
    }

    #[test]
    fn test_enum_without_reference() {
        let def = ExportDefinition::new("loans", "sql", 10)
            .with_params(vec![ParamDefinition::new("status", ParamType::Enum)]);

        assert_eq!(
            validation_message(validator().validate(&def, &raw(&[("status", "active")]))),
            "Param status enumClass missing"
        );
    }

    #[test]
    fn test_allow_list_checked_before_parsing() {
        let def = ExportDefinition::new("loans", "sql", 10).with_params(vec![
            ParamDefinition::new("status", ParamType::Enum)
                .with_enum_ref("LoanStatus")
                .with_allowed(["ACTIVE", "RETURNED"]),
            ParamDefinition::new("branch", ParamType::String).with_allowed(["NORTH"]),
        ]);
        let v = validator();

        assert!(v.validate(&def, &raw(&[("status", "active")])).is_ok());
        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("status", "overdue")]))),
            "Param status value not allowed: overdue"
        );
        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("branch", "north")]))),
            "Param branch value not allowed: north"
        );
    }

    #[test]
    fn test_repeated_params_become_ordered_list() {
        let def = ExportDefinition::new("books", "sql", 10).with_params(vec![
            ParamDefinition::new("ids", ParamType::Int).with_allowed(["3", "1", "2"]),
        ]);
        let v = validator();

        let validated = v
            .validate(&def, &raw(&[("ids", "3"), ("ids", " "), ("ids", "1")]))
            .unwrap();
        assert_eq!(
            validated.get_list("ids"),
            Some(&[ParamValue::Int(3), ParamValue::Int(1)][..])
        );

        assert_eq!(
            validation_message(v.validate(&def, &raw(&[("ids", "1"), ("ids", "4")]))),
            "Param ids value not allowed: 4"
        );
    }

    #[test]
    fn test_failure_returns_no_partial_request() {
        let def = ExportDefinition::new("books", "sql", 10).with_params(vec![
            ParamDefinition::new("a", ParamType::Int),
            ParamDefinition::new("b", ParamType::Int),
        ]);

        let result = validator().validate(&def, &raw(&[("a", "1"), ("b", "x")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_params_preserved() {
        let def = ExportDefinition::new("books", "sql", 10)
            .with_params(vec![ParamDefinition::new("status", ParamType::String)]);
        let input = raw(&[("status", "open"), ("maxRows", "5")]);

        let validated = validator().validate(&def, &input).unwrap();
        assert_eq!(validated.raw_params(), &input);
    }
}
