//! Export orchestration
//!
//! [`ExportService`] ties the registry, validator and providers together
//! and records exactly one audit event per attempt. Failures are recorded
//! and then returned unchanged; nothing is retried, since a failed copy may
//! already have written part of its output.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::definition::ExportDefinition;
use crate::error::Result;
use crate::registry::ExportRegistry;
use crate::validator::{RawParams, RequestValidator, ValidatedExportRequest};

use super::audit::{ExportAuditSink, LogAuditSink, Stopwatch};

/// Entry point for running exports.
pub struct ExportService {
    registry: Arc<ExportRegistry>,
    validator: RequestValidator,
    audit: Arc<dyn ExportAuditSink>,
}

impl ExportService {
    /// Create a service that audits through [`LogAuditSink`].
    pub fn new(registry: Arc<ExportRegistry>) -> Self {
        let validator = RequestValidator::new(registry.enums());
        Self {
            registry,
            validator,
            audit: Arc::new(LogAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn ExportAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &ExportRegistry {
        &self.registry
    }

    /// Resolve and validate without streaming. Not audited.
    ///
    /// # Arguments
    /// * `key` - Export key
    /// * `raw` - Raw request parameters
    ///
    /// # Returns
    /// * `Result<(Arc<ExportDefinition>, ValidatedExportRequest)>` - The definition and validated request
    pub fn validate(
        &self,
        key: &str,
        raw: &RawParams,
    ) -> Result<(Arc<ExportDefinition>, ValidatedExportRequest)> {
        let definition = self.registry.get_required(key)?;
        let validated = self.validator.validate(&definition, raw)?;
        Ok((definition, validated))
    }

    /// Stream an already validated request into `sink`.
    ///
    /// # Returns
    /// * `Result<Option<u64>>` - Rows written, `None` when the provider does not know
    pub async fn stream_validated(
        &self,
        key: &str,
        validated: &ValidatedExportRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Option<u64>> {
        let watch = Stopwatch::start();
        let result = self.execute(key, validated, sink).await;
        self.audit.record(&watch.event(
            key,
            validated.max_rows(),
            validated.requested_max_rows(),
            result.as_ref().map(|rows| *rows).map_err(|e| e.class()),
        ));
        result
    }

    /// Validate `raw` and stream the export into `sink`.
    ///
    /// Every attempt is audited, including unknown keys and rejected
    /// parameters.
    pub async fn stream_csv(
        &self,
        key: &str,
        raw: &RawParams,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Option<u64>> {
        let watch = Stopwatch::start();
        let validated = match self.validate(key, raw) {
            Ok((_, validated)) => validated,
            Err(e) => {
                debug!("Export {} rejected: {}", key, e);
                self.audit.record(&watch.event(key, 0, None, Err(e.class())));
                return Err(e);
            }
        };

        let result = self.execute(key, &validated, sink).await;
        self.audit.record(&watch.event(
            key,
            validated.max_rows(),
            validated.requested_max_rows(),
            result.as_ref().map(|rows| *rows).map_err(|e| e.class()),
        ));
        result
    }

    async fn execute(
        &self,
        key: &str,
        validated: &ValidatedExportRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Option<u64>> {
        let definition = self.registry.get_required(key)?;
        let provider = self.registry.get_provider(key)?;

        info!("Starting export {} (maxRows={})", key, validated.max_rows());
        let rows = provider
            .write_csv(validated, sink, definition.columns())
            .await?;
        info!("Export {} finished: {:?} rows", key, rows);
        Ok(rows)
    }
}

/// File name for an export produced on `date`: `<key>-<yyyy-MM-dd>.csv`.
pub fn suggested_filename(key: &str, date: NaiveDate) -> String {
    format!("{key}-{}.csv", date.format("%Y-%m-%d"))
}

/// [`suggested_filename`] for today (UTC).
pub fn suggested_filename_today(key: &str) -> String {
    suggested_filename(key, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::io::AsyncWriteExt;

    use crate::definition::ColumnDefinition;
    use crate::error::{ErrorClass, ExecutionError, ExportError};
    use crate::export::audit::ExportAuditEvent;
    use crate::export::{ExportCsvProvider, ProviderRegistry};
    use crate::registry::{DefinitionSource, SourceFormat};

    #[derive(Default)]
    struct MemoryAuditSink {
        events: Mutex<Vec<ExportAuditEvent>>,
    }

    impl MemoryAuditSink {
        fn events(&self) -> Vec<ExportAuditEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ExportAuditSink for MemoryAuditSink {
        fn record(&self, event: &ExportAuditEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    /// Writes the header line and one row per `status` value.
    struct BooksProvider;

    #[async_trait]
    impl ExportCsvProvider for BooksProvider {
        async fn write_csv(
            &self,
            request: &ValidatedExportRequest,
            sink: &mut (dyn AsyncWrite + Unpin + Send),
            columns: &[ColumnDefinition],
        ) -> Result<Option<u64>> {
            let header: Vec<&str> = columns.iter().map(|c| c.header_text()).collect();
            sink.write_all(format!("{}\n", header.join(",")).as_bytes()).await?;
            let status = request.get_str("status").unwrap_or("ANY");
            sink.write_all(format!("1,{status}\n2,{status}\n").as_bytes()).await?;
            Ok(Some(2))
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl ExportCsvProvider for BrokenProvider {
        async fn write_csv(
            &self,
            _request: &ValidatedExportRequest,
            _sink: &mut (dyn AsyncWrite + Unpin + Send),
            _columns: &[ColumnDefinition],
        ) -> Result<Option<u64>> {
            Err(ExecutionError::NotConfigured("loans".to_string()).into())
        }
    }

    const DEFINITIONS: &str = "\
library_books:
  provider: books
  maxRows: 200
  columns:
    - key: id
    - key: status
      header: Status
  params:
    - name: status
      type: STRING
loans:
  provider: broken
  params:
    - name: asOfDate
      type: DATE
      required: true
";

    fn service() -> (ExportService, Arc<MemoryAuditSink>) {
        let registry = ExportRegistry::builder()
            .providers(
                ProviderRegistry::new()
                    .register("books", Arc::new(BooksProvider))
                    .register("broken", Arc::new(BrokenProvider)),
            )
            .source(DefinitionSource::text("exports.yml", SourceFormat::Yaml, DEFINITIONS))
            .build()
            .unwrap();
        let audit = Arc::new(MemoryAuditSink::default());
        let service = ExportService::new(Arc::new(registry)).with_audit_sink(audit.clone());
        (service, audit)
    }

    fn raw(pairs: &[(&str, &str)]) -> RawParams {
        let mut raw = RawParams::new();
        for (name, value) in pairs {
            raw.entry(name.to_string()).or_default().push(value.to_string());
        }
        raw
    }

    #[tokio::test]
    async fn test_stream_csv_success_is_audited() {
        let (service, audit) = service();
        let mut sink = Vec::new();

        let rows = service
            .stream_csv(
                "library_books",
                &raw(&[("status", "loaned"), ("maxRows", "999")]),
                &mut sink,
            )
            .await
            .unwrap();

        assert_eq!(rows, Some(2));
        assert_eq!(
            String::from_utf8(sink).unwrap(),
            "id,Status\n1,loaned\n2,loaned\n"
        );

        let events = audit.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.success);
        assert_eq!(event.export_key, "library_books");
        assert_eq!(event.rows, Some(2));
        assert_eq!(event.max_rows, 200);
        assert_eq!(event.requested_max_rows, Some(999));
        assert_eq!(event.error, None);
    }

    #[tokio::test]
    async fn test_unknown_key_is_audited_and_returned() {
        let (service, audit) = service();
        let mut sink = Vec::new();

        let err = service
            .stream_csv("missing", &RawParams::new(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::DefinitionNotFound { ref key } if key == "missing"));
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].max_rows, 0);
        assert_eq!(events[0].error, Some(ErrorClass::NotFound));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_is_audited() {
        let (service, audit) = service();
        let mut sink = Vec::new();

        let err = service
            .stream_csv("loans", &RawParams::new(), &mut sink)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Missing required param: asOfDate");
        assert!(err.is_client_error());
        assert_eq!(audit.events()[0].error, Some(ErrorClass::Validation));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates_unchanged() {
        let (service, audit) = service();
        let mut sink = Vec::new();

        let err = service
            .stream_csv("loans", &raw(&[("asOfDate", "2024-01-31")]), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Execution(ExecutionError::NotConfigured(_))
        ));
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].max_rows, 50_000);
        assert_eq!(events[0].rows, None);
        assert_eq!(events[0].error, Some(ErrorClass::Execution));
    }

    #[tokio::test]
    async fn test_sink_failure_is_io_error() {
        let (service, audit) = service();
        let mut sink = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
            .build();

        let err = service
            .stream_csv("library_books", &RawParams::new(), &mut sink)
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Io);
        assert_eq!(audit.events()[0].error, Some(ErrorClass::Io));
    }

    #[tokio::test]
    async fn test_two_step_audits_only_the_stream() {
        let (service, audit) = service();

        assert!(service.validate("loans", &raw(&[("asOfDate", "bad")])).is_err());
        assert!(audit.events().is_empty());

        let (definition, validated) = service
            .validate("library_books", &raw(&[("maxRows", "50")]))
            .unwrap();
        assert_eq!(definition.key(), "library_books");
        assert_eq!(validated.max_rows(), 50);

        let mut sink = tokio_test::io::Builder::new()
            .write(b"id,Status\n")
            .write(b"1,ANY\n2,ANY\n")
            .build();
        let rows = service
            .stream_validated("library_books", &validated, &mut sink)
            .await
            .unwrap();

        assert_eq!(rows, Some(2));
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].max_rows, 50);
    }

    #[test]
    fn test_suggested_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            suggested_filename("library_books", date),
            "library_books-2024-03-09.csv"
        );
        assert!(suggested_filename_today("x").starts_with("x-"));
    }
}
