//! Bulk CSV export through PostgreSQL `COPY ... TO STDOUT`.
//!
//! Each call opens its own connection, runs the rendered statement inside a
//! read-only transaction and streams the CSV chunks straight into the
//! caller's sink. Nothing is pooled and nothing outlives the call.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::{TryStreamExt, pin_mut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::error::{ConfigurationError, ExecutionError, Result};
use crate::validator::ParamValue;

use super::render::render;

/// Executes one rendered SELECT as a bulk CSV copy into a sink.
///
/// Implemented by [`PostgresCopyExporter`]; the seam exists so providers can
/// be exercised without a database.
#[async_trait]
pub trait BulkCopy: Send + Sync {
    /// Render `sql` with `params`, run it as a CSV copy and write the output
    /// to `sink`.
    ///
    /// # Arguments
    /// * `sql` - SELECT template with `:name` placeholders
    /// * `params` - Values substituted into the template
    /// * `sink` - Destination of the CSV bytes
    /// * `include_header` - Ask the database to emit its own header line
    ///
    /// # Returns
    /// * `Result<u64>` - Number of data rows streamed
    async fn copy_csv(
        &self,
        sql: &str,
        params: &BTreeMap<String, ParamValue>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        include_header: bool,
    ) -> Result<u64>;
}

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// [`BulkCopy`] over a dedicated `tokio-postgres` connection per call.
#[derive(Debug, Clone)]
pub struct PostgresCopyExporter {
    config: tokio_postgres::Config,
    connect_timeout: Duration,
}

impl PostgresCopyExporter {
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self {
            config,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Build from a libpq-style connection string or `postgresql://` URL.
    pub fn from_conninfo(conninfo: &str) -> Result<Self> {
        let config = tokio_postgres::Config::from_str(conninfo).map_err(|e| {
            ConfigurationError::InvalidValue {
                field: "database.url".to_string(),
                value: format!("<redacted> ({e})"),
            }
        })?;
        Ok(Self::new(config))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_application_name(mut self, name: &str) -> Self {
        self.config.application_name(name);
        self
    }

    async fn connect(&self) -> Result<ScopedConnection> {
        let connect = self.config.connect(NoTls);
        let (client, connection) = match tokio::time::timeout(self.connect_timeout, connect).await
        {
            Ok(result) => result.map_err(ExecutionError::ConnectionFailed)?,
            Err(_) => {
                return Err(ExecutionError::ConnectTimeout(self.connect_timeout.as_secs()).into());
            }
        };

        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Export connection error: {}", e);
            }
        });

        Ok(ScopedConnection { client, task })
    }
}

#[async_trait]
impl BulkCopy for PostgresCopyExporter {
    async fn copy_csv(
        &self,
        sql: &str,
        params: &BTreeMap<String, ParamValue>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        include_header: bool,
    ) -> Result<u64> {
        let copy_sql = build_copy_sql(&render(sql, params), include_header);
        debug!("Executing bulk copy: {}", copy_sql);

        let conn = self.connect().await?;
        conn.client
            .batch_execute("START TRANSACTION READ ONLY; SET LOCAL standard_conforming_strings TO on")
            .await
            .map_err(ExecutionError::CopyFailed)?;

        let stream = conn
            .client
            .copy_out(copy_sql.as_str())
            .await
            .map_err(ExecutionError::CopyFailed)?;
        pin_mut!(stream);

        let mut counter = RecordCounter::default();
        while let Some(chunk) = stream.try_next().await.map_err(ExecutionError::CopyFailed)? {
            counter.feed(&chunk);
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        conn.client
            .batch_execute("COMMIT")
            .await
            .map_err(ExecutionError::CopyFailed)?;

        let mut rows = counter.finish();
        if include_header {
            rows = rows.saturating_sub(1);
        }
        debug!("Bulk copy streamed {} rows", rows);
        Ok(rows)
    }
}

/// Wrap a SELECT in the `COPY` form, dropping one trailing `;`.
pub fn build_copy_sql(rendered: &str, include_header: bool) -> String {
    let base = rendered.trim();
    let base = base.strip_suffix(';').unwrap_or(base).trim_end();
    let header = if include_header { " HEADER" } else { "" };
    format!("COPY ({base}) TO STDOUT WITH CSV{header}")
}

/// Connection owned by exactly one copy call. Dropping it closes the client
/// and stops the connection task, whichever way the call exits.
struct ScopedConnection {
    client: Client,
    task: JoinHandle<()>,
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Counts CSV records in a byte stream: line feeds outside quoted fields.
#[derive(Debug, Default)]
struct RecordCounter {
    records: u64,
    in_quotes: bool,
    open_record: bool,
}

impl RecordCounter {
    fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            match b {
                b'"' => {
                    self.in_quotes = !self.in_quotes;
                    self.open_record = true;
                }
                b'\n' if !self.in_quotes => {
                    self.records += 1;
                    self.open_record = false;
                }
                _ => self.open_record = true,
            }
        }
    }

    fn finish(self) -> u64 {
        self.records + u64::from(self.open_record)
    }
}
