use crate::error::Result;
use crate::pipeline::aggregation::KpiFilter;
use crate::types::{FootfallEntry, SyncLogEntry, TransactionRecord};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Counts from one delete-then-insert commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

/// Storage trait for transactions, sync logs and footfall
#[async_trait]
pub trait Storage: Send + Sync {
    // Transaction operations

    /// Delete every stored row whose invoice number is in `invoice_numbers`,
    /// then insert `records`. Readers never see the delete without the insert.
    async fn replace_invoices(
        &self,
        invoice_numbers: &BTreeSet<String>,
        records: Vec<TransactionRecord>,
    ) -> Result<ReplaceOutcome>;
    async fn query_transactions(&self, filter: &KpiFilter) -> Result<Vec<TransactionRecord>>;
    /// Greatest `YYYY-MM-DD` transaction date; raw unparsed dates are ignored.
    async fn latest_transaction_date(&self) -> Result<Option<String>>;

    // Sync log operations
    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()>;
    /// Most recent first.
    async fn list_sync_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>>;
    async fn has_completed_sync_for_digest(&self, sha256_hex: &str) -> Result<bool>;

    // Footfall operations
    /// Replace the count for each `(date, store_location)` pair.
    async fn upsert_footfall(&self, entries: Vec<FootfallEntry>) -> Result<usize>;
    async fn query_footfall(&self, filter: &KpiFilter) -> Result<Vec<FootfallEntry>>;
}

pub(crate) fn is_canonical_date(raw: &str) -> bool {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() && raw.len() == 10
}
