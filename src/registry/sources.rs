//! Configuration sources feeding the export registry.
//!
//! Sources are passed to the registry explicitly, in order; nothing is
//! discovered by scanning the filesystem. A resource document (file or
//! embedded text) is read in one of three shapes:
//!
//! 1. A nested section holding many definitions, either
//!    `[exports.definitions.<key>]` or a top-level `definitions` table
//! 2. A single definition at the root (it has `sql` or `provider`), keyed
//!    by the file stem
//! 3. A root table mapping keys to definitions

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::definition::DefinitionDescriptor;
use crate::error::{ConfigurationError, Result};

/// Serialization format of a resource document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Toml,
    Yaml,
}

impl SourceFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "toml" => Some(SourceFormat::Toml),
            "yml" | "yaml" => Some(SourceFormat::Yaml),
            _ => None,
        }
    }

    fn parse(&self, content: &str) -> std::result::Result<Value, String> {
        match self {
            SourceFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            SourceFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// One ordered source of export definitions.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    /// Structured definitions from the application configuration. These
    /// take precedence over every resource source.
    Inline(BTreeMap<String, DefinitionDescriptor>),

    /// A resource document on disk; the format follows the extension.
    File(PathBuf),

    /// A resource document already in memory, e.g. from `include_str!`.
    /// `name` plays the role of the file name.
    Text {
        name: String,
        format: SourceFormat,
        content: String,
    },
}

impl DefinitionSource {
    pub fn text(name: impl Into<String>, format: SourceFormat, content: impl Into<String>) -> Self {
        DefinitionSource::Text {
            name: name.into(),
            format,
            content: content.into(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, DefinitionSource::Inline(_))
    }

    /// Human-readable name for log and error messages.
    pub fn name(&self) -> String {
        match self {
            DefinitionSource::Inline(_) => "configuration".to_string(),
            DefinitionSource::File(path) => path.display().to_string(),
            DefinitionSource::Text { name, .. } => name.clone(),
        }
    }

    /// Read all key/descriptor pairs this source declares.
    pub fn load(&self) -> Result<Vec<(String, DefinitionDescriptor)>> {
        match self {
            DefinitionSource::Inline(map) => Ok(map
                .iter()
                .map(|(key, descriptor)| (key.clone(), descriptor.clone()))
                .collect()),
            DefinitionSource::File(path) => {
                let format = SourceFormat::from_path(path).ok_or_else(|| {
                    ConfigurationError::InvalidFormat {
                        source_name: path.display().to_string(),
                        message: "expected a .toml, .yml or .yaml file".to_string(),
                    }
                })?;
                let content = fs::read_to_string(path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => {
                        ConfigurationError::FileNotFound(path.display().to_string())
                    }
                    _ => ConfigurationError::InvalidFormat {
                        source_name: path.display().to_string(),
                        message: e.to_string(),
                    },
                })?;
                parse_document(&self.name(), &file_stem(path), format, &content)
            }
            DefinitionSource::Text {
                name,
                format,
                content,
            } => parse_document(name, &file_stem(Path::new(name)), *format, content),
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("export")
        .to_string()
}

fn parse_document(
    source_name: &str,
    stem: &str,
    format: SourceFormat,
    content: &str,
) -> Result<Vec<(String, DefinitionDescriptor)>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let invalid = |message: String| ConfigurationError::InvalidFormat {
        source_name: source_name.to_string(),
        message,
    };
    let root = format.parse(content).map_err(invalid)?;

    let loaded = match &root {
        Value::Null => Vec::new(),
        Value::Object(_) => {
            if let Some(section) = nested_section(&root) {
                debug!("Reading definition section from {}", source_name);
                descriptors_from_table(section).map_err(invalid)?
            } else if DefinitionDescriptor::looks_like_definition(&root) {
                debug!("Reading single definition {} from {}", stem, source_name);
                let descriptor = serde_json::from_value(root.clone())
                    .map_err(|e| invalid(format!("{stem}: {e}")))?;
                vec![(stem.to_string(), descriptor)]
            } else {
                descriptors_from_table(&root).map_err(invalid)?
            }
        }
        _ => return Err(invalid("expected a table of export definitions".to_string()).into()),
    };

    Ok(loaded)
}

fn nested_section(root: &Value) -> Option<&Value> {
    root.pointer("/exports/definitions")
        .or_else(|| root.get("definitions"))
        .filter(|v| v.is_object())
}

fn descriptors_from_table(
    table: &Value,
) -> std::result::Result<Vec<(String, DefinitionDescriptor)>, String> {
    let Value::Object(entries) = table else {
        return Err("expected a table of export definitions".to_string());
    };
    entries
        .iter()
        .map(|(key, value)| {
            serde_json::from_value(value.clone())
                .map(|descriptor| (key.clone(), descriptor))
                .map_err(|e| format!("{key}: {e}"))
        })
        .collect()
}
