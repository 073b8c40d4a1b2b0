//! Typed parameter values and the validated request handed to providers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Raw request parameters: name to the ordered list of values supplied for
/// it, so repeated query parameters survive decoding.
pub type RawParams = HashMap<String, Vec<String>>;

/// Reserved raw parameter that lowers the row cap of a single request.
pub const MAX_ROWS_PARAM: &str = "maxRows";

/// A typed parameter value.
///
/// The validator produces the `Str` to `Enum` variants and `List`;
/// `Timestamp` and `Float` exist for providers that add computed values
/// before rendering SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Uuid(Uuid),
    Int(i32),
    Long(i64),
    Bool(bool),
    Date(NaiveDate),
    Enum(String),
    Timestamp(DateTime<Utc>),
    Float(f64),
    List(Vec<ParamValue>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) | ParamValue::Enum(s) => f.write_str(s),
            ParamValue::Uuid(u) => write!(f, "{u}"),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Long(n) => write!(f, "{n}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ParamValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            ParamValue::Float(n) => write!(f, "{n}"),
            ParamValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Long(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Long(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Uuid> for ParamValue {
    fn from(value: Uuid) -> Self {
        ParamValue::Uuid(value)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        ParamValue::Date(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::Timestamp(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Outcome of a successful validation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedExportRequest {
    params: BTreeMap<String, ParamValue>,
    max_rows: u32,
    requested_max_rows: Option<u64>,
    raw_params: RawParams,
}

impl ValidatedExportRequest {
    pub(crate) fn new(
        params: BTreeMap<String, ParamValue>,
        max_rows: u32,
        requested_max_rows: Option<u64>,
        raw_params: RawParams,
    ) -> Self {
        Self {
            params,
            max_rows,
            requested_max_rows,
            raw_params,
        }
    }

    /// Typed values keyed by internal parameter name. Absent parameters
    /// have no entry.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Negotiated row cap, never above the definition's ceiling.
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// Row cap the client asked for, before negotiation.
    pub fn requested_max_rows(&self) -> Option<u64> {
        self.requested_max_rows
    }

    pub fn raw_params(&self) -> &RawParams {
        &self.raw_params
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ParamValue::Str(s) | ParamValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ParamValue::Int(n) => Some(i64::from(*n)),
            ParamValue::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_uuid(&self, name: &str) -> Option<Uuid> {
        match self.get(name)? {
            ParamValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn get_date(&self, name: &str) -> Option<NaiveDate> {
        match self.get(name)? {
            ParamValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Values of a repeated parameter. A parameter supplied once is not a
    /// list; use the scalar getters for it.
    pub fn get_list(&self, name: &str) -> Option<&[ParamValue]> {
        match self.get(name)? {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }
}
