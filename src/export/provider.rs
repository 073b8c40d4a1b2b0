//! Provider contract and the built-in SQL copy provider.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::definition::ColumnDefinition;
use crate::error::Result;
use crate::sql::BulkCopy;
use crate::validator::{MAX_ROWS_PARAM, ParamValue, ValidatedExportRequest};

use super::header::write_header;

/// Provider name under which definitions select [`SqlCopyProvider`].
pub const SQL_PROVIDER: &str = "sql";

/// Handler that executes one export and streams its CSV into a sink.
#[async_trait]
pub trait ExportCsvProvider: Send + Sync {
    /// Write the CSV for a validated request.
    ///
    /// # Arguments
    /// * `request` - Validated parameters and negotiated row cap
    /// * `sink` - Destination of the CSV bytes
    /// * `columns` - Column metadata of the definition, possibly empty
    ///
    /// # Returns
    /// * `Result<Option<u64>>` - Data rows written, `None` when unknown
    async fn write_csv(
        &self,
        request: &ValidatedExportRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        columns: &[ColumnDefinition],
    ) -> Result<Option<u64>>;
}

/// Explicit provider name to handler map, assembled by the embedding
/// application before the export registry is built.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ExportCsvProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration under the same name wins.
    pub fn register(mut self, name: impl Into<String>, provider: Arc<dyn ExportCsvProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExportCsvProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Runs a definition's SQL template through a [`BulkCopy`].
///
/// `maxRows` is available to the template as `:maxRows`. When the definition
/// has column metadata the header comes from the header writer, otherwise
/// the database emits its own.
pub struct SqlCopyProvider {
    copy: Arc<dyn BulkCopy>,
    sql: String,
    column_order: Vec<String>,
}

impl SqlCopyProvider {
    pub fn new(copy: Arc<dyn BulkCopy>, sql: impl Into<String>) -> Self {
        Self {
            copy,
            sql: sql.into(),
            column_order: Vec::new(),
        }
    }

    /// Canonical column keys, in the order the SELECT produces them.
    pub fn with_column_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl ExportCsvProvider for SqlCopyProvider {
    async fn write_csv(
        &self,
        request: &ValidatedExportRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        columns: &[ColumnDefinition],
    ) -> Result<Option<u64>> {
        let mut params = request.params().clone();
        params.insert(MAX_ROWS_PARAM.to_string(), ParamValue::from(request.max_rows()));

        let header_written = write_header(sink, &self.column_order, columns).await?;
        debug!("Header written by provider: {}", header_written);

        let rows = self
            .copy
            .copy_csv(&self.sql, &params, sink, !header_written)
            .await?;
        Ok(Some(rows))
    }
}
