use super::traits::{ReplaceOutcome, Storage};
use crate::error::{DashboardError, Result};
use crate::pipeline::aggregation::KpiFilter;
use crate::types::{
    FootfallEntry, SyncLogEntry, SyncSource, SyncStatus, TransactionRecord, TransactionType,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sales_transactions (
    id                  TEXT PRIMARY KEY,
    invoice_number      TEXT NOT NULL,
    transaction_type    TEXT NOT NULL,
    transaction_date    TEXT NOT NULL,
    store_location      TEXT NOT NULL,
    sales_channel       TEXT NOT NULL,
    gross_quantity      INTEGER NOT NULL,
    returned_quantity   INTEGER NOT NULL,
    net_quantity        INTEGER NOT NULL,
    gross_value         REAL NOT NULL,
    nett_invoice_value  REAL NOT NULL,
    customer_name       TEXT,
    product_sku         TEXT,
    product_name        TEXT,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sales_invoice ON sales_transactions (invoice_number);
CREATE INDEX IF NOT EXISTS idx_sales_date ON sales_transactions (transaction_date);
CREATE TABLE IF NOT EXISTS sync_logs (
    id                 TEXT PRIMARY KEY,
    source             TEXT NOT NULL,
    status             TEXT NOT NULL,
    records_processed  INTEGER NOT NULL,
    triggered_by       TEXT NOT NULL,
    started_at         TEXT NOT NULL,
    completed_at       TEXT NOT NULL,
    file_name          TEXT,
    file_sha256        TEXT,
    error_message      TEXT
);
CREATE INDEX IF NOT EXISTS idx_sync_digest ON sync_logs (file_sha256);
CREATE TABLE IF NOT EXISTS footfall (
    id              TEXT PRIMARY KEY,
    date            TEXT NOT NULL,
    store_location  TEXT NOT NULL,
    footfall_count  INTEGER NOT NULL,
    UNIQUE (date, store_location)
);
"#;

const TRANSACTION_COLUMNS: &str = "id, invoice_number, transaction_type, transaction_date, \
    store_location, sales_channel, gross_quantity, returned_quantity, net_quantity, \
    gross_value, nett_invoice_value, customer_name, product_sku, product_name, created_at";

/// SQLite-backed store. One connection, serialized behind a mutex.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite store at {}", db_path.display());
        let conn = Connection::open(db_path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DashboardError::Storage {
            message: "SQLite connection lock poisoned".to_string(),
        })
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn unknown_label(idx: usize, label: String) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, label, Type::Text)
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    let kind: String = row.get(2)?;
    Ok(TransactionRecord {
        id: get_uuid(row, 0)?,
        invoice_number: row.get(1)?,
        transaction_type: TransactionType::from_code(&kind),
        transaction_date: row.get(3)?,
        store_location: row.get(4)?,
        sales_channel: row.get(5)?,
        gross_quantity: row.get(6)?,
        returned_quantity: row.get(7)?,
        net_quantity: row.get(8)?,
        gross_value: row.get(9)?,
        nett_invoice_value: row.get(10)?,
        customer_name: row.get(11)?,
        product_sku: row.get(12)?,
        product_name: row.get(13)?,
        created_at: get_timestamp(row, 14)?,
    })
}

fn row_to_sync_log(row: &Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    let source: String = row.get(1)?;
    let status: String = row.get(2)?;
    let records_processed: i64 = row.get(3)?;
    Ok(SyncLogEntry {
        id: get_uuid(row, 0)?,
        source: SyncSource::parse(&source).ok_or_else(|| unknown_label(1, source))?,
        status: SyncStatus::parse(&status).ok_or_else(|| unknown_label(2, status))?,
        records_processed: records_processed.max(0) as usize,
        triggered_by: row.get(4)?,
        started_at: get_timestamp(row, 5)?,
        completed_at: get_timestamp(row, 6)?,
        file_name: row.get(7)?,
        file_sha256: row.get(8)?,
        error_message: row.get(9)?,
    })
}

fn row_to_footfall(row: &Row<'_>) -> rusqlite::Result<FootfallEntry> {
    Ok(FootfallEntry {
        id: get_uuid(row, 0)?,
        date: row.get(1)?,
        store_location: row.get(2)?,
        footfall_count: row.get(3)?,
    })
}

/// WHERE clause and positional parameters for a filter.
fn filter_clause(filter: &KpiFilter, date_col: &str, with_channel: bool) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(start) = &filter.start_date {
        clauses.push(format!("{date_col} >= ?"));
        values.push(start.clone());
    }
    if let Some(end) = &filter.end_date {
        clauses.push(format!("{date_col} <= ?"));
        values.push(end.clone());
    }
    if let Some(store) = &filter.store_location {
        clauses.push("store_location = ?".to_string());
        values.push(store.clone());
    }
    if with_channel {
        if let Some(channel) = &filter.sales_channel {
            clauses.push("sales_channel = ?".to_string());
            values.push(channel.clone());
        }
    }
    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (sql, values)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn replace_invoices(
        &self,
        invoice_numbers: &BTreeSet<String>,
        records: Vec<TransactionRecord>,
    ) -> Result<ReplaceOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut outcome = ReplaceOutcome::default();
        {
            let mut delete =
                tx.prepare("DELETE FROM sales_transactions WHERE invoice_number = ?1")?;
            for invoice in invoice_numbers {
                outcome.deleted += delete.execute(params![invoice])?;
            }

            let mut insert = tx.prepare(&format!(
                "INSERT INTO sales_transactions ({TRANSACTION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ))?;
            for r in &records {
                insert.execute(params![
                    r.id.to_string(),
                    r.invoice_number,
                    r.transaction_type.code(),
                    r.transaction_date,
                    r.store_location,
                    r.sales_channel,
                    r.gross_quantity,
                    r.returned_quantity,
                    r.net_quantity,
                    r.gross_value,
                    r.nett_invoice_value,
                    r.customer_name,
                    r.product_sku,
                    r.product_name,
                    r.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ])?;
                outcome.inserted += 1;
            }
        }
        // Dropping `tx` without commit rolls back, so any `?` above leaves the
        // table as it was.
        tx.commit()?;

        debug!(
            deleted = outcome.deleted,
            inserted = outcome.inserted,
            "Replaced invoices in SQLite"
        );
        Ok(outcome)
    }

    async fn query_transactions(&self, filter: &KpiFilter) -> Result<Vec<TransactionRecord>> {
        let conn = self.conn()?;
        let (where_sql, values) = filter_clause(filter, "transaction_date", true);
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM sales_transactions{where_sql} \
             ORDER BY transaction_date, invoice_number"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_transaction)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn latest_transaction_date(&self) -> Result<Option<String>> {
        let conn = self.conn()?;
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(transaction_date) FROM sales_transactions \
             WHERE transaction_date GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]'",
            [],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_logs (id, source, status, records_processed, triggered_by, \
             started_at, completed_at, file_name, file_sha256, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.to_string(),
                entry.source.as_str(),
                entry.status.as_str(),
                entry.records_processed as i64,
                entry.triggered_by,
                entry.started_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                entry.completed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                entry.file_name,
                entry.file_sha256,
                entry.error_message,
            ],
        )?;
        Ok(())
    }

    async fn list_sync_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, status, records_processed, triggered_by, started_at, \
             completed_at, file_name, file_sha256, error_message \
             FROM sync_logs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_sync_log)?;
        let logs = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    async fn has_completed_sync_for_digest(&self, sha256_hex: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_logs WHERE file_sha256 = ?1 AND status = ?2)",
            params![sha256_hex, SyncStatus::Completed.as_str()],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }

    async fn upsert_footfall(&self, entries: Vec<FootfallEntry>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO footfall (id, date, store_location, footfall_count) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(date, store_location) DO UPDATE SET footfall_count=excluded.footfall_count",
            )?;
            for entry in &entries {
                written += stmt.execute(params![
                    entry.id.to_string(),
                    entry.date,
                    entry.store_location,
                    entry.footfall_count,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    async fn query_footfall(&self, filter: &KpiFilter) -> Result<Vec<FootfallEntry>> {
        let conn = self.conn()?;
        let (where_sql, values) = filter_clause(filter, "date", false);
        let sql = format!(
            "SELECT id, date, store_location, footfall_count FROM footfall{where_sql} \
             ORDER BY date, store_location"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_footfall)?;
        let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(invoice: &str, date: &str, value: f64) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            invoice_number: invoice.to_string(),
            transaction_type: TransactionType::Invoice,
            transaction_date: date.to_string(),
            store_location: "Jacadi MOA".to_string(),
            sales_channel: "Store".to_string(),
            gross_quantity: 1,
            returned_quantity: 0,
            net_quantity: 1,
            gross_value: value,
            nett_invoice_value: value,
            customer_name: Some("A. Customer".to_string()),
            product_sku: None,
            product_name: None,
            created_at: Utc::now(),
        }
    }

    fn invoices(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn replace_deletes_prior_generation() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .replace_invoices(
                &invoices(&["A", "B"]),
                vec![record("A", "2024-01-01", 1.0), record("B", "2024-01-01", 2.0)],
            )
            .await
            .unwrap();
        let outcome = store
            .replace_invoices(&invoices(&["B"]), vec![record("B", "2024-01-02", 5.0)])
            .await
            .unwrap();
        assert_eq!(outcome, ReplaceOutcome { deleted: 1, inserted: 1 });

        let rows = store.query_transactions(&KpiFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        let b = rows.iter().find(|r| r.invoice_number == "B").unwrap();
        assert_eq!(b.nett_invoice_value, 5.0);
        assert_eq!(b.customer_name.as_deref(), Some("A. Customer"));
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_the_delete() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .replace_invoices(&invoices(&["A"]), vec![record("A", "2024-01-01", 1.0)])
            .await
            .unwrap();

        let first = record("A", "2024-01-02", 7.0);
        let mut clash = record("A", "2024-01-02", 8.0);
        clash.id = first.id;
        let err = store
            .replace_invoices(&invoices(&["A"]), vec![first, clash])
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Database(_)));

        let rows = store.query_transactions(&KpiFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].transaction_date, "2024-01-01");
        assert_eq!(rows[0].nett_invoice_value, 1.0);
    }

    #[tokio::test]
    async fn latest_date_ignores_unparsed_dates() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .replace_invoices(
                &invoices(&["A", "B"]),
                vec![record("A", "2024-03-09", 1.0), record("B", "Jan 15th", 1.0)],
            )
            .await
            .unwrap();
        assert_eq!(
            store.latest_transaction_date().await.unwrap().as_deref(),
            Some("2024-03-09")
        );
    }

    #[tokio::test]
    async fn footfall_upsert_replaces_same_day_and_store() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let entry = |count| FootfallEntry {
            id: Uuid::new_v4(),
            date: "2024-01-15".into(),
            store_location: "Jacadi MOA".into(),
            footfall_count: count,
        };
        store.upsert_footfall(vec![entry(10)]).await.unwrap();
        store.upsert_footfall(vec![entry(25)]).await.unwrap();

        let rows = store.query_footfall(&KpiFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].footfall_count, 25);
    }
}
