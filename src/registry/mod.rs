//! Export definition registry
//!
//! Builds the immutable key to (definition, provider) map once at startup
//! from an ordered list of [`DefinitionSource`]s. Every configuration
//! problem surfaces from [`ExportRegistryBuilder::build`] as a
//! [`ConfigurationError`]; after that the registry is read-only and can be
//! shared freely between concurrent requests.
//!
//! # Example
//!
//! ```rust
//! use copyexport::registry::{DefinitionSource, ExportRegistry, SourceFormat};
//!
//! let source = DefinitionSource::text(
//!     "exports.yml",
//!     SourceFormat::Yaml,
//!     "library_books:\n  provider: sql\n  sql: select 1 as id\n  maxRows: 200\n",
//! );
//! let err = ExportRegistry::builder().source(source).build().unwrap_err();
//! // The built-in "sql" provider needs a copy exporter.
//! assert!(err.to_string().contains("library_books"));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::definition::{
    ColumnDefinition, DefinitionDescriptor, ExportDefinition, ParamDefinition, ParamDescriptor,
    ParamType,
};
use crate::error::{ConfigurationError, ExportError, Result};
use crate::export::{ExportCsvProvider, ProviderRegistry, SQL_PROVIDER, SqlCopyProvider};
use crate::sql::{BulkCopy, placeholders, select_columns};
use crate::validator::{MAX_ROWS_PARAM, RequestValidator};

pub mod enums;
pub mod sources;

pub use enums::EnumRegistry;
pub use sources::{DefinitionSource, SourceFormat};

/// Row cap applied to definitions that do not declare `maxRows`.
pub const DEFAULT_MAX_ROWS: u32 = 50_000;

/// Read-only map of export keys to definitions and providers.
pub struct ExportRegistry {
    definitions: HashMap<String, Arc<ExportDefinition>>,
    providers: HashMap<String, Arc<dyn ExportCsvProvider>>,
    enums: Arc<EnumRegistry>,
}

impl ExportRegistry {
    pub fn builder() -> ExportRegistryBuilder {
        ExportRegistryBuilder::default()
    }

    /// Definition for `key`, or [`ExportError::DefinitionNotFound`].
    pub fn get_required(&self, key: &str) -> Result<Arc<ExportDefinition>> {
        self.definitions
            .get(key)
            .cloned()
            .ok_or_else(|| ExportError::not_found(key))
    }

    /// Provider resolved for `key`, or [`ExportError::DefinitionNotFound`].
    pub fn get_provider(&self, key: &str) -> Result<Arc<dyn ExportCsvProvider>> {
        self.providers
            .get(key)
            .cloned()
            .ok_or_else(|| ExportError::not_found(key))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Definitions in key order.
    pub fn definitions(&self) -> Vec<&ExportDefinition> {
        let mut defs: Vec<&ExportDefinition> =
            self.definitions.values().map(Arc::as_ref).collect();
        defs.sort_unstable_by(|a, b| a.key().cmp(b.key()));
        defs
    }

    /// Enum types ENUM parameters were checked against.
    pub fn enums(&self) -> Arc<EnumRegistry> {
        Arc::clone(&self.enums)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl fmt::Debug for ExportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Collects sources and collaborators for [`ExportRegistry`].
pub struct ExportRegistryBuilder {
    sources: Vec<DefinitionSource>,
    providers: ProviderRegistry,
    enums: Arc<EnumRegistry>,
    copy: Option<Arc<dyn BulkCopy>>,
    default_max_rows: u32,
}

impl Default for ExportRegistryBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            providers: ProviderRegistry::default(),
            enums: Arc::new(EnumRegistry::default()),
            copy: None,
            default_max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl ExportRegistryBuilder {
    /// Append a source. Resource sources are merged in the order added.
    pub fn source(mut self, source: DefinitionSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(mut self, sources: impl IntoIterator<Item = DefinitionSource>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn enums(mut self, enums: Arc<EnumRegistry>) -> Self {
        self.enums = enums;
        self
    }

    /// Copy exporter backing definitions that use the built-in `sql` provider.
    pub fn copy_exporter(mut self, copy: Arc<dyn BulkCopy>) -> Self {
        self.copy = Some(copy);
        self
    }

    pub fn default_max_rows(mut self, max_rows: u32) -> Self {
        self.default_max_rows = max_rows;
        self
    }

    /// Merge all sources and build the registry.
    ///
    /// # Returns
    /// * `Result<ExportRegistry>` - The registry, or the first configuration error
    pub fn build(self) -> Result<ExportRegistry> {
        if self.default_max_rows == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "exports.max_rows".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let merged = self.merge_sources()?;
        let validator = RequestValidator::new(Arc::clone(&self.enums));

        let mut definitions = HashMap::with_capacity(merged.len());
        let mut providers = HashMap::with_capacity(merged.len());
        for (key, descriptor) in merged {
            let definition = self.build_definition(&validator, &key, &descriptor)?;
            let provider = self.resolve_provider(&definition)?;
            warn_undeclared_placeholders(&definition);
            debug!("Registered export {} (provider {})", key, definition.provider());
            providers.insert(key.clone(), provider);
            definitions.insert(key, Arc::new(definition));
        }

        info!("Export registry built with {} definitions", definitions.len());
        Ok(ExportRegistry {
            definitions,
            providers,
            enums: self.enums,
        })
    }

    /// Resource sources merge in order and may not repeat a key; inline
    /// sources then override whatever the resources declared.
    fn merge_sources(&self) -> Result<BTreeMap<String, DefinitionDescriptor>> {
        let mut resources = BTreeMap::new();
        let mut inline = BTreeMap::new();

        for source in &self.sources {
            let loaded = source.load()?;
            debug!("Loaded {} definitions from {}", loaded.len(), source.name());
            for (key, descriptor) in loaded {
                if key.trim().is_empty() {
                    return Err(ConfigurationError::invalid(source.name(), "blank export key").into());
                }
                if source.is_inline() {
                    if inline.insert(key.clone(), descriptor).is_some() {
                        return Err(ConfigurationError::DuplicateKey(key).into());
                    }
                } else if resources.insert(key.clone(), descriptor).is_some() {
                    return Err(ConfigurationError::DuplicateKey(key).into());
                }
            }
        }

        for (key, descriptor) in inline {
            if resources.insert(key.clone(), descriptor).is_some() {
                debug!("Configuration overrides resource definition {}", key);
            }
        }
        Ok(resources)
    }

    fn build_definition(
        &self,
        validator: &RequestValidator,
        key: &str,
        descriptor: &DefinitionDescriptor,
    ) -> Result<ExportDefinition> {
        let provider = descriptor
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigurationError::MissingProvider(key.to_string()))?;

        let max_rows = match descriptor.max_rows {
            None => self.default_max_rows,
            Some(n) if n <= 0 => {
                return Err(ConfigurationError::invalid(key, "maxRows must be positive").into());
            }
            Some(n) => u32::try_from(n)
                .map_err(|_| ConfigurationError::invalid(key, format!("maxRows {n} is too large")))?,
        };

        let columns = build_columns(key, descriptor)?;
        let column_order = build_column_order(key, provider, descriptor, &columns)?;
        let params = descriptor
            .params
            .iter()
            .map(|p| self.build_param(key, p))
            .collect::<Result<Vec<_>>>()?;
        check_unique_params(key, &params)?;

        for param in &params {
            validator.parse_default(param).map_err(|e| {
                ConfigurationError::invalid(
                    key,
                    format!("default value of param {} is invalid: {e}", param.name()),
                )
            })?;
        }

        let mut definition = ExportDefinition::new(key, provider, max_rows)
            .with_column_order(column_order)
            .with_columns(columns)
            .with_params(params);
        if let Some(description) = &descriptor.description {
            definition = definition.with_description(description.clone());
        }
        if let Some(sql) = descriptor.sql.as_deref().filter(|s| !s.trim().is_empty()) {
            definition = definition.with_sql(sql);
        }
        Ok(definition)
    }

    fn build_param(&self, key: &str, descriptor: &ParamDescriptor) -> Result<ParamDefinition> {
        let name = descriptor.name.trim();
        if name.is_empty() {
            return Err(ConfigurationError::invalid(key, "param without name").into());
        }
        let raw_type = descriptor
            .param_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigurationError::MissingParamType {
                key: key.to_string(),
                param: name.to_string(),
            })?;
        let param_type: ParamType = raw_type.parse()?;

        let mut param = ParamDefinition::new(name, param_type)
            .with_allowed(&descriptor.allowed)
            .required(descriptor.required);
        if let Some(request_name) = descriptor.request_name.as_deref().map(str::trim) {
            if !request_name.is_empty() {
                param = param.with_request_name(request_name);
            }
        }
        if let Some(default_value) = &descriptor.default_value {
            param = param.with_default(default_value.clone());
        }

        match (param_type, descriptor.enum_class.as_deref().map(str::trim)) {
            (ParamType::Enum, None | Some("")) => {
                return Err(ConfigurationError::invalid(
                    key,
                    format!("param {name} enumClass missing"),
                )
                .into());
            }
            (ParamType::Enum, Some(enum_ref)) if !self.enums.contains(enum_ref) => {
                return Err(ConfigurationError::invalid(
                    key,
                    format!("param {name} references unknown enum {enum_ref}"),
                )
                .into());
            }
            (_, Some(enum_ref)) if !enum_ref.is_empty() => {
                param = param.with_enum_ref(enum_ref);
            }
            _ => {}
        }
        Ok(param)
    }

    fn resolve_provider(&self, definition: &ExportDefinition) -> Result<Arc<dyn ExportCsvProvider>> {
        let key = definition.key();
        let name = definition.provider();
        if let Some(provider) = self.providers.get(name) {
            return Ok(provider);
        }
        if name != SQL_PROVIDER {
            return Err(ConfigurationError::UnknownProvider {
                key: key.to_string(),
                provider: name.to_string(),
            }
            .into());
        }

        let sql = definition
            .sql()
            .ok_or_else(|| ConfigurationError::invalid(key, "sql provider requires sql"))?;
        let copy = self.copy.as_ref().ok_or_else(|| {
            ConfigurationError::invalid(key, "sql provider requires a database configuration")
        })?;
        let provider = SqlCopyProvider::new(Arc::clone(copy), sql)
            .with_column_order(definition.column_order().iter().cloned());
        Ok(Arc::new(provider))
    }
}

fn build_columns(key: &str, descriptor: &DefinitionDescriptor) -> Result<Vec<ColumnDefinition>> {
    let mut seen = HashSet::new();
    descriptor
        .columns
        .iter()
        .map(|c| {
            let column_key = c.key.trim();
            if column_key.is_empty() {
                return Err(ConfigurationError::invalid(key, "column without key").into());
            }
            if !seen.insert(column_key.to_string()) {
                return Err(ConfigurationError::invalid(
                    key,
                    format!("duplicate column {column_key}"),
                )
                .into());
            }
            let mut column = ColumnDefinition::new(column_key);
            column.header = c.header.clone();
            column.format = c.format.clone();
            Ok(column)
        })
        .collect()
}

/// Canonical output order for the header: `columnOrder` when declared,
/// otherwise the SELECT's column names for SQL exports with column metadata.
/// A SQL export's header must line up with its rows, so every configured
/// column has to be part of that order.
fn build_column_order(
    key: &str,
    provider: &str,
    descriptor: &DefinitionDescriptor,
    columns: &[ColumnDefinition],
) -> Result<Vec<String>> {
    let mut order = Vec::with_capacity(descriptor.column_order.len());
    for column_key in &descriptor.column_order {
        let column_key = column_key.trim();
        if column_key.is_empty() {
            return Err(ConfigurationError::invalid(key, "blank key in columnOrder").into());
        }
        order.push(column_key.to_string());
    }

    if provider != SQL_PROVIDER {
        if !order.is_empty() {
            return Err(ConfigurationError::invalid(
                key,
                "columnOrder applies only to the sql provider",
            )
            .into());
        }
        return Ok(order);
    }
    if columns.is_empty() {
        return Ok(order);
    }

    if order.is_empty() {
        let Some(sql) = descriptor.sql.as_deref() else {
            return Ok(order);
        };
        order = select_columns(sql).ok_or_else(|| {
            ConfigurationError::invalid(
                key,
                "cannot derive the column order from sql; declare columnOrder",
            )
        })?;
    }

    if let Some(stray) = columns.iter().find(|c| !order.contains(&c.key)) {
        return Err(ConfigurationError::invalid(
            key,
            format!("column {} is not in the query output", stray.key),
        )
        .into());
    }
    Ok(order)
}

fn check_unique_params(key: &str, params: &[ParamDefinition]) -> Result<()> {
    let mut names = HashSet::new();
    let mut request_names = HashSet::new();
    for param in params {
        if !names.insert(param.name()) {
            return Err(
                ConfigurationError::invalid(key, format!("duplicate param {}", param.name())).into(),
            );
        }
        if param.request_name() == MAX_ROWS_PARAM {
            return Err(
                ConfigurationError::invalid(key, format!("request name {MAX_ROWS_PARAM} is reserved"))
                    .into(),
            );
        }
        if !request_names.insert(param.request_name()) {
            return Err(ConfigurationError::invalid(
                key,
                format!("duplicate request name {}", param.request_name()),
            )
            .into());
        }
    }
    Ok(())
}

fn warn_undeclared_placeholders(definition: &ExportDefinition) {
    let Some(sql) = definition.sql() else {
        return;
    };
    let mut reported = HashSet::new();
    for name in placeholders(sql) {
        let declared = name == MAX_ROWS_PARAM || definition.params().iter().any(|p| p.name() == name);
        if !declared && reported.insert(name) {
            warn!(
                "Export {} uses undeclared placeholder :{} (renders as NULL)",
                definition.key(),
                name
            );
        }
    }
}
