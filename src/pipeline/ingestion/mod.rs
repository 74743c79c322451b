//! Ingestion: raw report rows in, one atomic invoice replacement out.
//!
//! Every accepted row is mapped to a `TransactionRecord`. The distinct invoice
//! numbers of the batch are deleted from storage and the new rows inserted in
//! one commit, so re-sending a report replaces earlier rows for the same
//! invoices instead of duplicating them. Each run leaves one sync-log entry.

pub mod footfall;
pub mod inbox;
pub mod reader;

use crate::error::{DashboardError, Result};
use crate::metrics::IngestionMetrics;
use crate::pipeline::mapper::{FieldMapper, RawRow};
use crate::pipeline::storage::Storage;
use crate::types::{SyncLogEntry, SyncSource, SyncStatus, TransactionRecord};
use chrono::{DateTime, Utc};
use reader::ReportFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of one successful ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub rows_seen: usize,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub invoices_replaced: usize,
    pub rows_deleted: usize,
    pub sync_log_id: Uuid,
}

/// Who triggered a run and what it is reading.
#[derive(Debug, Clone)]
struct RunContext {
    actor: String,
    source: SyncSource,
    file_name: Option<String>,
    file_sha256: Option<String>,
}

impl RunContext {
    fn new(actor: &str, source: SyncSource) -> Self {
        Self {
            actor: actor.to_string(),
            source,
            file_name: None,
            file_sha256: None,
        }
    }

    fn source_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| self.source.as_str().to_string())
    }
}

#[derive(Debug, Default)]
struct MappedBatch {
    records: Vec<TransactionRecord>,
    invoices: BTreeSet<String>,
    seen: usize,
    rejected: usize,
}

/// Hex SHA-256 of a file's bytes, hashed on the blocking pool.
pub async fn file_digest(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await?
}

/// Map rows until the source runs out. Rows without an invoice number and
/// records the CSV reader cannot decode are counted as rejected.
fn map_rows<I>(mapper: &FieldMapper, rows: I) -> Result<MappedBatch>
where
    I: Iterator<Item = Result<RawRow>>,
{
    let mut batch = MappedBatch::default();
    for (idx, row) in rows.enumerate() {
        batch.seen += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) if reader::is_skippable_row_error(&e) => {
                batch.rejected += 1;
                warn!(row = idx + 1, "Skipping unreadable row: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        match mapper.map_row(&row) {
            Some(record) => {
                batch.invoices.insert(record.invoice_number.clone());
                batch.records.push(record);
            }
            None => {
                batch.rejected += 1;
                warn!(row = idx + 1, "Skipping row without an invoice number");
            }
        }
    }
    Ok(batch)
}

/// Parse and map a whole report file. Blocking; run it off the runtime.
fn read_report(mapper: &FieldMapper, path: &Path) -> Result<MappedBatch> {
    match ReportFormat::from_path(path)? {
        ReportFormat::Csv => {
            let rows = reader::csv_rows(std::fs::File::open(path)?)?;
            map_rows(mapper, rows)
        }
        ReportFormat::Spreadsheet => {
            let rows = reader::spreadsheet_rows(path)?;
            map_rows(mapper, rows.into_iter().map(Ok))
        }
    }
}

pub struct IngestionPipeline {
    storage: Arc<dyn Storage>,
    mapper: Arc<FieldMapper>,
}

impl IngestionPipeline {
    pub fn new(storage: Arc<dyn Storage>, mapper: FieldMapper) -> Self {
        Self {
            storage,
            mapper: Arc::new(mapper),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Ingest already-parsed rows. Returns the number of records committed.
    pub async fn ingest_rows<I>(&self, rows: I, actor: &str, source: SyncSource) -> Result<usize>
    where
        I: IntoIterator<Item = RawRow>,
    {
        let report = self.ingest_rows_detailed(rows, actor, source).await?;
        Ok(report.rows_accepted)
    }

    pub async fn ingest_rows_detailed<I>(
        &self,
        rows: I,
        actor: &str,
        source: SyncSource,
    ) -> Result<IngestionReport>
    where
        I: IntoIterator<Item = RawRow>,
    {
        let ctx = RunContext::new(actor, source);
        let started_at = Utc::now();
        let batch = map_rows(&self.mapper, rows.into_iter().map(Ok));
        self.commit(batch, ctx, started_at).await
    }

    /// Ingest a CSV byte stream, e.g. an uploaded report body. The stream is
    /// parsed in place, so pass in-memory readers from async code.
    pub async fn ingest_reader<R: Read>(
        &self,
        reader: R,
        name: &str,
        actor: &str,
        source: SyncSource,
    ) -> Result<usize> {
        let report = self.ingest_reader_detailed(reader, name, actor, source).await?;
        Ok(report.rows_accepted)
    }

    #[instrument(skip_all, fields(name = %name, source = %source))]
    pub async fn ingest_reader_detailed<R: Read>(
        &self,
        reader: R,
        name: &str,
        actor: &str,
        source: SyncSource,
    ) -> Result<IngestionReport> {
        let mut ctx = RunContext::new(actor, source);
        ctx.file_name = Some(name.to_string());
        let started_at = Utc::now();
        let batch = reader::csv_rows(reader).and_then(|rows| map_rows(&self.mapper, rows));
        self.commit(batch, ctx, started_at).await
    }

    /// Ingest a CSV or spreadsheet file chosen by extension.
    pub async fn ingest_path(&self, path: &Path, actor: &str, source: SyncSource) -> Result<usize> {
        let report = self.ingest_path_detailed(path, actor, source).await?;
        Ok(report.rows_accepted)
    }

    pub async fn ingest_path_detailed(
        &self,
        path: &Path,
        actor: &str,
        source: SyncSource,
    ) -> Result<IngestionReport> {
        let digest = file_digest(path).await?;
        self.ingest_file(path, actor, source, Some(digest)).await
    }

    #[instrument(skip_all, fields(path = %path.display(), source = %source))]
    pub(crate) async fn ingest_file(
        &self,
        path: &Path,
        actor: &str,
        source: SyncSource,
        digest: Option<String>,
    ) -> Result<IngestionReport> {
        let mut ctx = RunContext::new(actor, source);
        ctx.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        ctx.file_sha256 = digest;
        let started_at = Utc::now();

        let mapper = Arc::clone(&self.mapper);
        let owned = path.to_path_buf();
        let batch = tokio::task::spawn_blocking(move || read_report(&mapper, &owned))
            .await
            .map_err(DashboardError::from)
            .and_then(|batch| batch);
        self.commit(batch, ctx, started_at).await
    }

    async fn commit(
        &self,
        batch: Result<MappedBatch>,
        ctx: RunContext,
        started_at: DateTime<Utc>,
    ) -> Result<IngestionReport> {
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => return Err(self.record_failure(&ctx, started_at, 0, e).await),
        };

        if batch.records.is_empty() {
            let err = DashboardError::EmptyIngestion {
                source_name: ctx.source_name(),
            };
            return Err(self.record_failure(&ctx, started_at, batch.rejected, err).await);
        }

        let rows_accepted = batch.records.len();
        let invoices_replaced = batch.invoices.len();
        let commit_started = Instant::now();
        let outcome = match self
            .storage
            .replace_invoices(&batch.invoices, batch.records)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.record_failure(&ctx, started_at, batch.rejected, e).await),
        };
        IngestionMetrics::record_run_completed(
            rows_accepted,
            batch.rejected,
            commit_started.elapsed().as_secs_f64(),
        );

        let entry = SyncLogEntry {
            id: Uuid::new_v4(),
            source: ctx.source,
            status: SyncStatus::Completed,
            records_processed: outcome.inserted,
            triggered_by: ctx.actor.clone(),
            started_at,
            completed_at: Utc::now(),
            file_name: ctx.file_name.clone(),
            file_sha256: ctx.file_sha256.clone(),
            error_message: None,
        };
        if let Err(e) = self.storage.append_sync_log(&entry).await {
            warn!("Ingested {} but could not record its sync log: {}", ctx.source_name(), e);
        }

        info!(
            "Ingested {} records for {} invoices from {} ({} rejected, {} replaced)",
            outcome.inserted,
            invoices_replaced,
            ctx.source_name(),
            batch.rejected,
            outcome.deleted
        );

        Ok(IngestionReport {
            rows_seen: batch.seen,
            rows_accepted,
            rows_rejected: batch.rejected,
            invoices_replaced,
            rows_deleted: outcome.deleted,
            sync_log_id: entry.id,
        })
    }

    /// Log a `failed` run and hand the original error back.
    async fn record_failure(
        &self,
        ctx: &RunContext,
        started_at: DateTime<Utc>,
        rejected: usize,
        err: DashboardError,
    ) -> DashboardError {
        IngestionMetrics::record_run_failed(rejected);
        warn!("Ingestion of {} failed: {}", ctx.source_name(), err);

        let entry = SyncLogEntry {
            id: Uuid::new_v4(),
            source: ctx.source,
            status: SyncStatus::Failed,
            records_processed: 0,
            triggered_by: ctx.actor.clone(),
            started_at,
            completed_at: Utc::now(),
            file_name: ctx.file_name.clone(),
            file_sha256: ctx.file_sha256.clone(),
            error_message: Some(err.to_string()),
        };
        if let Err(log_err) = self.storage.append_sync_log(&entry).await {
            warn!("Could not record failed sync log: {}", log_err);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregation::KpiFilter;
    use crate::pipeline::storage::InMemoryStorage;

    fn pipeline() -> (Arc<InMemoryStorage>, IngestionPipeline) {
        let storage = Arc::new(InMemoryStorage::new());
        let pipeline = IngestionPipeline::new(storage.clone(), FieldMapper::default());
        (storage, pipeline)
    }

    fn row(invoice: &str, value: &str) -> RawRow {
        [
            ("Invoice Number", invoice),
            ("Transaction Type", "IV"),
            ("Transaction Date", "2024-01-15"),
            ("Location", "MOA"),
            ("Nett Invoice Value", value),
            ("Gross Quantity", "1"),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn rejected_rows_are_counted_not_fatal() {
        let (storage, pipeline) = pipeline();
        let report = pipeline
            .ingest_rows_detailed(
                vec![row("INV1", "100"), row("  ", "5"), row("INV2", "50")],
                "tester",
                SyncSource::ManualUpload,
            )
            .await
            .unwrap();

        assert_eq!(report.rows_seen, 3);
        assert_eq!(report.rows_accepted, 2);
        assert_eq!(report.rows_rejected, 1);
        assert_eq!(storage.transaction_count().unwrap(), 2);

        let logs = storage.list_sync_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, report.sync_log_id);
        assert_eq!(logs[0].records_processed, 2);
        assert_eq!(logs[0].triggered_by, "tester");
    }

    #[tokio::test]
    async fn empty_batch_logs_failure_and_keeps_data() {
        let (storage, pipeline) = pipeline();
        pipeline
            .ingest_rows(vec![row("INV1", "100")], "a", SyncSource::ManualUpload)
            .await
            .unwrap();

        let err = pipeline
            .ingest_rows(vec![row("", "1")], "a", SyncSource::ManualUpload)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::EmptyIngestion { .. }));

        let stored = storage.query_transactions(&KpiFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        let logs = storage.list_sync_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().any(|l| l.status == SyncStatus::Failed
            && l.error_message.as_deref().unwrap_or_default().contains("No valid records")));
    }

    #[tokio::test]
    async fn reader_ingest_records_file_name() {
        let (storage, pipeline) = pipeline();
        let csv = "Invoice Number,Nett Invoice Value\nINV9,10\n";
        let count = pipeline
            .ingest_reader(csv.as_bytes(), "upload.csv", "web", SyncSource::ManualUpload)
            .await
            .unwrap();
        assert_eq!(count, 1);
        let logs = storage.list_sync_logs(1).await.unwrap();
        assert_eq!(logs[0].file_name.as_deref(), Some("upload.csv"));
        assert_eq!(logs[0].source, SyncSource::ManualUpload);
    }

    #[tokio::test]
    async fn digest_is_hex_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_digest(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
