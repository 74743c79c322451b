use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of sales document a transaction row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TransactionType {
    /// `IV`
    Invoice,
    /// `IR`
    InvoiceReturn,
    /// `SR`
    SalesReturn,
    /// Any other code, kept verbatim
    Other(String),
}

impl TransactionType {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "IV" => TransactionType::Invoice,
            "IR" => TransactionType::InvoiceReturn,
            "SR" => TransactionType::SalesReturn,
            _ => TransactionType::Other(code.trim().to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            TransactionType::Invoice => "IV",
            TransactionType::InvoiceReturn => "IR",
            TransactionType::SalesReturn => "SR",
            TransactionType::Other(code) => code,
        }
    }

    /// Only invoice and invoice-return rows feed revenue and quantity totals.
    pub fn counts_toward_revenue(&self) -> bool {
        matches!(self, TransactionType::Invoice | TransactionType::InvoiceReturn)
    }
}

impl From<String> for TransactionType {
    fn from(code: String) -> Self {
        TransactionType::from_code(&code)
    }
}

impl From<TransactionType> for String {
    fn from(kind: TransactionType) -> Self {
        kind.code().to_string()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Canonical sale/return row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub invoice_number: String,
    pub transaction_type: TransactionType,
    /// `YYYY-MM-DD` when the source date parsed, otherwise the raw value.
    pub transaction_date: String,
    pub store_location: String,
    pub sales_channel: String,
    pub gross_quantity: i64,
    pub returned_quantity: i64,
    pub net_quantity: i64,
    pub gross_value: f64,
    pub nett_invoice_value: f64,
    pub customer_name: Option<String>,
    pub product_sku: Option<String>,
    pub product_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    PortalAutomation,
    ManualUpload,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::PortalAutomation => "portal_automation",
            SyncSource::ManualUpload => "manual_upload",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "portal_automation" => Some(SyncSource::PortalAutomation),
            "manual_upload" => Some(SyncSource::ManualUpload),
            _ => None,
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// One ingestion run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub source: SyncSource,
    pub status: SyncStatus,
    pub records_processed: usize,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub file_name: Option<String>,
    pub file_sha256: Option<String>,
    pub error_message: Option<String>,
}

/// Visitor count for one store on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootfallEntry {
    pub id: Uuid,
    pub date: String,
    pub store_location: String,
    pub footfall_count: i64,
}
