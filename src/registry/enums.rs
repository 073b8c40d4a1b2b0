//! Closed set of enum types that ENUM parameters resolve against.

use std::collections::{BTreeMap, HashMap};

/// Enum type name to its ordered, uppercase values.
///
/// Supplied by the embedding application at startup; nothing is loaded at
/// request time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumRegistry {
    types: HashMap<String, Vec<String>>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enum type. Values are stored uppercase, in the given order.
    pub fn with_enum<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = values
            .into_iter()
            .map(|v| v.as_ref().trim().to_uppercase())
            .collect();
        self.types.insert(name.into(), values);
        self
    }

    /// Build from the `[enums]` table of the application config.
    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> Self {
        map.iter()
            .fold(Self::new(), |registry, (name, values)| registry.with_enum(name.clone(), values))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.types.get(name).map(Vec::as_slice)
    }

    /// Resolve an already uppercased value against an enum type.
    pub fn resolve(&self, name: &str, value: &str) -> Option<&str> {
        self.values(name)?
            .iter()
            .find(|v| v.as_str() == value)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
