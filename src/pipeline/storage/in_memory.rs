use super::traits::{is_canonical_date, ReplaceOutcome, Storage};
use crate::error::{DashboardError, Result};
use crate::pipeline::aggregation::KpiFilter;
use crate::types::{FootfallEntry, SyncLogEntry, SyncStatus, TransactionRecord};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    transactions: Arc<Mutex<Vec<TransactionRecord>>>,
    sync_logs: Arc<Mutex<Vec<SyncLogEntry>>>,
    footfall: Arc<Mutex<HashMap<(String, String), FootfallEntry>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(Mutex::new(Vec::new())),
            sync_logs: Arc::new(Mutex::new(Vec::new())),
            footfall: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn transaction_count(&self) -> Result<usize> {
        Ok(lock(&self.transactions)?.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| DashboardError::Storage {
        message: "in-memory store lock poisoned".to_string(),
    })
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn replace_invoices(
        &self,
        invoice_numbers: &BTreeSet<String>,
        records: Vec<TransactionRecord>,
    ) -> Result<ReplaceOutcome> {
        // Holding the lock across both steps makes the swap atomic for readers
        let mut transactions = lock(&self.transactions)?;
        let before = transactions.len();
        transactions.retain(|r| !invoice_numbers.contains(&r.invoice_number));
        let deleted = before - transactions.len();
        let inserted = records.len();
        transactions.extend(records);

        debug!(deleted, inserted, "Replaced invoices in memory");
        Ok(ReplaceOutcome { deleted, inserted })
    }

    async fn query_transactions(&self, filter: &KpiFilter) -> Result<Vec<TransactionRecord>> {
        let transactions = lock(&self.transactions)?;
        Ok(transactions
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn latest_transaction_date(&self) -> Result<Option<String>> {
        let transactions = lock(&self.transactions)?;
        Ok(transactions
            .iter()
            .map(|r| r.transaction_date.as_str())
            .filter(|d| is_canonical_date(d))
            .max()
            .map(str::to_string))
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        lock(&self.sync_logs)?.push(entry.clone());
        debug!("Appended sync log {} ({})", entry.id, entry.status.as_str());
        Ok(())
    }

    async fn list_sync_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let logs = lock(&self.sync_logs)?;
        let mut newest_first: Vec<SyncLogEntry> = logs.iter().rev().cloned().collect();
        newest_first.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        newest_first.truncate(limit);
        Ok(newest_first)
    }

    async fn has_completed_sync_for_digest(&self, sha256_hex: &str) -> Result<bool> {
        let logs = lock(&self.sync_logs)?;
        Ok(logs.iter().any(|l| {
            l.status == SyncStatus::Completed && l.file_sha256.as_deref() == Some(sha256_hex)
        }))
    }

    async fn upsert_footfall(&self, entries: Vec<FootfallEntry>) -> Result<usize> {
        let mut footfall = lock(&self.footfall)?;
        let count = entries.len();
        for entry in entries {
            footfall.insert((entry.date.clone(), entry.store_location.clone()), entry);
        }
        Ok(count)
    }

    async fn query_footfall(&self, filter: &KpiFilter) -> Result<Vec<FootfallEntry>> {
        let footfall = lock(&self.footfall)?;
        let mut entries: Vec<FootfallEntry> = footfall
            .values()
            .filter(|f| filter.matches_footfall(f))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (&a.date, &a.store_location).cmp(&(&b.date, &b.store_location)));
        Ok(entries)
    }
}
