//! Audit events emitted once per export attempt.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::ErrorClass;

/// Outcome of one export attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportAuditEvent {
    pub export_key: String,
    pub success: bool,
    /// Data rows written; `None` when the provider could not tell or the
    /// attempt failed before streaming.
    pub rows: Option<u64>,
    /// Negotiated row cap, 0 when validation did not complete.
    pub max_rows: u32,
    pub requested_max_rows: Option<u64>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub error: Option<ErrorClass>,
}

impl ExportAuditEvent {
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock start of an attempt plus a monotonic timer for its duration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stopwatch {
    started_at: DateTime<Utc>,
    start: Instant,
}

impl Stopwatch {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub(crate) fn event(
        &self,
        export_key: &str,
        max_rows: u32,
        requested_max_rows: Option<u64>,
        outcome: std::result::Result<Option<u64>, ErrorClass>,
    ) -> ExportAuditEvent {
        let (success, rows, error) = match outcome {
            Ok(rows) => (true, rows, None),
            Err(class) => (false, None, Some(class)),
        };
        ExportAuditEvent {
            export_key: export_key.to_string(),
            success,
            rows,
            max_rows,
            requested_max_rows,
            duration: self.start.elapsed(),
            started_at: self.started_at,
            error,
        }
    }
}

/// Receives every audit event. Implementations must not fail the export.
pub trait ExportAuditSink: Send + Sync {
    fn record(&self, event: &ExportAuditEvent);
}

/// Default sink: one structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

impl ExportAuditSink for LogAuditSink {
    fn record(&self, event: &ExportAuditEvent) {
        if event.success {
            info!(
                key = %event.export_key,
                rows = ?event.rows,
                max_rows = event.max_rows,
                requested_max_rows = ?event.requested_max_rows,
                duration_ms = event.duration_ms(),
                started_at = %event.started_at.to_rfc3339(),
                "export_success"
            );
        } else {
            warn!(
                key = %event.export_key,
                rows = ?event.rows,
                max_rows = event.max_rows,
                requested_max_rows = ?event.requested_max_rows,
                duration_ms = event.duration_ms(),
                started_at = %event.started_at.to_rfc3339(),
                error = event.error.map(|e| e.as_str()).unwrap_or("unknown"),
                "export_failure"
            );
        }
    }
}
