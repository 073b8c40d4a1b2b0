//! Configuration management for copyexport
//!
//! This module handles loading, parsing, and validating the application
//! configuration from these sources:
//! - Configuration file (TOML format)
//! - Environment variables
//! - Command-line arguments (applied by the CLI)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::definition::DefinitionDescriptor;
use crate::error::{ConfigurationError, Result};
use crate::export::ProviderRegistry;
use crate::registry::{DEFAULT_MAX_ROWS, DefinitionSource, EnumRegistry, ExportRegistry};
use crate::sql::{DEFAULT_CONNECT_TIMEOUT_SECS, PostgresCopyExporter};

/// Environment variable overriding `database.url`.
pub const ENV_DATABASE_URL: &str = "COPYEXPORT_DATABASE_URL";

/// Environment variable overriding `exports.max_rows`.
pub const ENV_MAX_ROWS: &str = "COPYEXPORT_MAX_ROWS";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Database used by the built-in SQL provider
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Export definitions and defaults
    #[serde(default)]
    pub exports: ExportsConfig,

    /// Enum types available to ENUM parameters
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,

    /// Directory of the file this configuration was read from
    #[serde(skip)]
    source_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// tokio-postgres connection string or `postgresql://` URL
    #[serde(default)]
    pub url: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Reported to the server as `application_name`
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

/// Export definition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportsConfig {
    /// Row cap for definitions that do not declare `maxRows`
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,

    /// Resource documents holding definitions, merged in order
    #[serde(default)]
    pub definition_files: Vec<PathBuf>,

    /// Inline definitions; these override resource documents
    #[serde(default)]
    pub definitions: BTreeMap<String, DefinitionDescriptor>,
}

// Default value functions
fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_application_name() -> String {
    "copyexport".to_string()
}

fn default_max_rows() -> u32 {
    DEFAULT_MAX_ROWS
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: default_connect_timeout(),
            application_name: default_application_name(),
        }
    }
}

impl Default for ExportsConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            definition_files: Vec::new(),
            definitions: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigurationError::FileNotFound(path.display().to_string()),
            _ => ConfigurationError::InvalidFormat {
                source_name: path.display().to_string(),
                message: e.to_string(),
            },
        })?;

        let mut config = Self::from_toml(&path.display().to_string(), &content)?;
        config.source_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text. Relative definition files resolve against
    /// the working directory.
    pub fn from_toml(source_name: &str, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigurationError::InvalidFormat {
                source_name: source_name.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load configuration from the given file, or the default location,
    /// then apply environment overrides
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("No configuration file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".copyexport")
            .join("config.toml")
    }

    /// Apply `COPYEXPORT_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|u| !u.trim().is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(raw) = lookup(ENV_MAX_ROWS) {
            self.exports.max_rows = raw.trim().parse().map_err(|_| ConfigurationError::InvalidValue {
                field: ENV_MAX_ROWS.to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.exports.max_rows == 0 {
            return Err(invalid_value("exports.max_rows", "0"));
        }
        if self.database.connect_timeout == 0 {
            return Err(invalid_value("database.connect_timeout", "0"));
        }
        if let Some(url) = &self.database.url {
            if url.trim().is_empty() {
                return Err(invalid_value("database.url", ""));
            }
            PostgresCopyExporter::from_conninfo(url)?;
        }
        for (name, values) in &self.enums {
            if values.iter().all(|v| v.trim().is_empty()) {
                return Err(invalid_value(&format!("enums.{name}"), "[]"));
            }
        }
        Ok(())
    }

    /// Definition sources in merge order: resource files, then the inline
    /// definitions.
    pub fn definition_sources(&self) -> Vec<DefinitionSource> {
        let mut sources: Vec<DefinitionSource> = self
            .exports
            .definition_files
            .iter()
            .map(|path| DefinitionSource::File(self.resolve_path(path)))
            .collect();
        if !self.exports.definitions.is_empty() {
            sources.push(DefinitionSource::Inline(self.exports.definitions.clone()));
        }
        sources
    }

    pub fn enum_registry(&self) -> EnumRegistry {
        EnumRegistry::from_map(&self.enums)
    }

    /// Copy exporter for the configured database, if any
    pub fn copy_exporter(&self) -> Result<Option<PostgresCopyExporter>> {
        let Some(url) = self.database.url.as_deref() else {
            return Ok(None);
        };
        let exporter = PostgresCopyExporter::from_conninfo(url)?
            .with_connect_timeout(self.connect_timeout())
            .with_application_name(&self.database.application_name);
        Ok(Some(exporter))
    }

    /// Build the export registry described by this configuration
    ///
    /// # Arguments
    /// * `providers` - Application providers, in addition to the built-in `sql`
    pub fn build_registry(&self, providers: ProviderRegistry) -> Result<ExportRegistry> {
        let mut builder = ExportRegistry::builder()
            .sources(self.definition_sources())
            .providers(providers)
            .enums(Arc::new(self.enum_registry()))
            .default_max_rows(self.exports.max_rows);
        if let Some(exporter) = self.copy_exporter()? {
            builder = builder.copy_exporter(Arc::new(exporter));
        }
        builder.build()
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout)
    }

    /// Render as TOML with the database URL hidden
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.database.url.is_some() {
            shown.database.url = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| {
            ConfigurationError::InvalidFormat {
                source_name: "configuration".to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.source_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn invalid_value(field: &str, value: &str) -> crate::error::ExportError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
