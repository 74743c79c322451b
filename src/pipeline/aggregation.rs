//! Dashboard KPIs over a filtered slice of stored transactions.
//!
//! Revenue and quantity only count invoice (`IV`) and invoice-return (`IR`)
//! rows. Invoices whose number starts with the return prefix still add to
//! revenue and quantity but are left out of the transaction count, and so
//! out of ATV, basket size, multi-item % and conversion denominators.

use crate::constants::{DEFAULT_RETURN_INVOICE_PREFIX, FISCAL_YEAR_START_MONTH};
use crate::error::{DashboardError, Result};
use crate::metrics::DashboardMetrics;
use crate::pipeline::storage::Storage;
use crate::types::{FootfallEntry, TransactionRecord};
use chrono::{Datelike, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Optional bounds and exact-match filters for a KPI query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub store_location: Option<String>,
    pub sales_channel: Option<String>,
}

impl KpiFilter {
    /// Canonical dates sort lexicographically, so string bounds are enough.
    pub fn date_in_range(&self, date: &str) -> bool {
        let after_start = self.start_date.as_deref().map_or(true, |s| date >= s);
        let before_end = self.end_date.as_deref().map_or(true, |e| date <= e);
        after_start && before_end
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        self.date_in_range(&record.transaction_date)
            && self
                .store_location
                .as_deref()
                .map_or(true, |s| record.store_location == s)
            && self
                .sales_channel
                .as_deref()
                .map_or(true, |c| record.sales_channel == c)
    }

    /// Footfall has no channel, so only dates and store apply.
    pub fn matches_footfall(&self, entry: &FootfallEntry) -> bool {
        self.date_in_range(&entry.date)
            && self
                .store_location
                .as_deref()
                .map_or(true, |s| entry.store_location == s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub net_revenue: f64,
    pub net_quantity: i64,
    pub transaction_count: u64,
    pub average_transaction_value: f64,
    pub basket_size: f64,
    pub multi_item_percentage: f64,
    pub conversion_percentage: f64,
    pub total_footfall: i64,
}

impl KpiSummary {
    /// Two-decimal copy for API responses. Never feed it back into sums.
    pub fn rounded(&self) -> Self {
        Self {
            net_revenue: round2(self.net_revenue),
            average_transaction_value: round2(self.average_transaction_value),
            basket_size: round2(self.basket_size),
            multi_item_percentage: round2(self.multi_item_percentage),
            conversion_percentage: round2(self.conversion_percentage),
            ..*self
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Store,
    Channel,
}

/// Pure KPI arithmetic.
#[derive(Debug, Clone)]
pub struct Aggregator {
    return_prefix: String,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_RETURN_INVOICE_PREFIX)
    }
}

impl Aggregator {
    pub fn new(return_prefix: impl Into<String>) -> Self {
        Self {
            return_prefix: return_prefix.into(),
        }
    }

    pub fn is_return_invoice(&self, invoice_number: &str) -> bool {
        !self.return_prefix.is_empty() && invoice_number.starts_with(&self.return_prefix)
    }

    pub fn summarize(&self, records: &[TransactionRecord], total_footfall: i64) -> KpiSummary {
        let mut net_revenue = 0.0;
        let mut net_quantity = 0i64;
        let mut quantity_by_invoice: HashMap<&str, i64> = HashMap::new();

        for record in records
            .iter()
            .filter(|r| r.transaction_type.counts_toward_revenue())
        {
            net_revenue += record.nett_invoice_value;
            net_quantity = net_quantity.saturating_add(record.net_quantity);
            let invoice_qty = quantity_by_invoice
                .entry(record.invoice_number.as_str())
                .or_insert(0);
            *invoice_qty = invoice_qty.saturating_add(record.net_quantity);
        }

        let counted: Vec<i64> = quantity_by_invoice
            .iter()
            .filter(|(invoice, _)| !self.is_return_invoice(invoice))
            .map(|(_, qty)| *qty)
            .collect();
        let transaction_count = counted.len() as u64;
        let multi_item = counted.iter().filter(|qty| **qty > 1).count();

        let trx = transaction_count as f64;
        KpiSummary {
            net_revenue,
            net_quantity,
            transaction_count,
            average_transaction_value: ratio(net_revenue, trx),
            basket_size: ratio(net_quantity as f64, trx),
            multi_item_percentage: ratio(multi_item as f64, trx) * 100.0,
            conversion_percentage: ratio(trx, total_footfall as f64) * 100.0,
            total_footfall,
        }
    }

    /// One summary per store or channel. Only store groups get footfall.
    pub fn breakdown(
        &self,
        records: &[TransactionRecord],
        footfall: &[FootfallEntry],
        dimension: Dimension,
    ) -> BTreeMap<String, KpiSummary> {
        let mut groups: BTreeMap<String, Vec<TransactionRecord>> = BTreeMap::new();
        for record in records {
            let key = match dimension {
                Dimension::Store => &record.store_location,
                Dimension::Channel => &record.sales_channel,
            };
            groups.entry(key.clone()).or_default().push(record.clone());
        }

        groups
            .into_iter()
            .map(|(key, rows)| {
                let group_footfall = match dimension {
                    Dimension::Store => footfall
                        .iter()
                        .filter(|f| f.store_location == key)
                        .fold(0i64, |acc, f| acc.saturating_add(f.footfall_count)),
                    Dimension::Channel => 0,
                };
                let summary = self.summarize(&rows, group_footfall);
                (key, summary)
            })
            .collect()
    }
}

pub fn total_footfall(entries: &[FootfallEntry]) -> i64 {
    entries
        .iter()
        .fold(0i64, |acc, f| acc.saturating_add(f.footfall_count))
}

/// The dashboard's date window. Defaults to month-to-date ending on the
/// latest stored transaction date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Store-local calendar day used when no transactions are stored yet.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_iso(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| DashboardError::InvalidDate(raw.to_string()))
}

impl ReportingPeriod {
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
        latest_stored: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self> {
        let end = match end {
            Some(raw) => parse_iso(raw)?,
            None => latest_stored
                .and_then(|raw| parse_iso(raw).ok())
                .unwrap_or(today),
        };
        let start = match start {
            Some(raw) => parse_iso(raw)?,
            None => end.with_day0(0).unwrap_or(end),
        };
        Ok(Self { start, end })
    }

    /// Same calendar span one month earlier, clamped to month end.
    pub fn previous_month(&self) -> Self {
        self.shifted_back(Months::new(1))
    }

    /// Same calendar span one year earlier; 29 February lands on the 28th.
    pub fn previous_year(&self) -> Self {
        self.shifted_back(Months::new(12))
    }

    /// Fiscal year to date: from the 1 April on or before `end`, through `end`.
    pub fn year_to_date(&self) -> Self {
        let fiscal_year = if self.end.month() < FISCAL_YEAR_START_MONTH {
            self.end.year() - 1
        } else {
            self.end.year()
        };
        let start = NaiveDate::from_ymd_opt(fiscal_year, FISCAL_YEAR_START_MONTH, 1)
            .unwrap_or(self.end);
        Self { start, end: self.end }
    }

    fn shifted_back(&self, months: Months) -> Self {
        let shift = |d: NaiveDate| d.checked_sub_months(months).unwrap_or(d);
        Self {
            start: shift(self.start),
            end: shift(self.end),
        }
    }

    pub fn to_filter(&self, store_location: Option<String>, sales_channel: Option<String>) -> KpiFilter {
        KpiFilter {
            start_date: Some(self.start.format("%Y-%m-%d").to_string()),
            end_date: Some(self.end.format("%Y-%m-%d").to_string()),
            store_location,
            sales_channel,
        }
    }
}

/// KPIs for the reporting window next to its comparison windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub period: ReportingPeriod,
    pub previous_period: ReportingPeriod,
    pub previous_year_period: ReportingPeriod,
    pub year_to_date_period: ReportingPeriod,
    pub current: KpiSummary,
    pub previous: KpiSummary,
    pub previous_year: KpiSummary,
    pub year_to_date: KpiSummary,
}

/// Read-side entry points over an injected store.
pub struct Dashboard {
    storage: Arc<dyn Storage>,
    aggregator: Aggregator,
}

impl Dashboard {
    pub fn new(storage: Arc<dyn Storage>, aggregator: Aggregator) -> Self {
        Self { storage, aggregator }
    }

    /// Full-precision KPIs; call `rounded()` before handing them out.
    pub async fn kpis(&self, filter: &KpiFilter) -> Result<KpiSummary> {
        let started = Instant::now();
        let records = self.storage.query_transactions(filter).await?;
        let footfall = self.storage.query_footfall(filter).await?;
        debug!(
            records = records.len(),
            footfall_days = footfall.len(),
            "Aggregating KPIs"
        );
        let summary = self.aggregator.summarize(&records, total_footfall(&footfall));
        DashboardMetrics::record_query(records.len(), started.elapsed().as_secs_f64());
        Ok(summary)
    }

    pub async fn breakdown(
        &self,
        filter: &KpiFilter,
        dimension: Dimension,
    ) -> Result<BTreeMap<String, KpiSummary>> {
        let started = Instant::now();
        let records = self.storage.query_transactions(filter).await?;
        let footfall = self.storage.query_footfall(filter).await?;
        let groups = self.aggregator.breakdown(&records, &footfall, dimension);
        DashboardMetrics::record_query(records.len(), started.elapsed().as_secs_f64());
        Ok(groups)
    }

    pub async fn latest_date(&self) -> Result<Option<String>> {
        self.storage.latest_transaction_date().await
    }

    /// Current window against the previous month, the same window last year
    /// and the fiscal year to date.
    pub async fn compare_periods(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        store_location: Option<String>,
        sales_channel: Option<String>,
        today: NaiveDate,
    ) -> Result<PeriodComparison> {
        let latest = self.latest_date().await?;
        let period = ReportingPeriod::resolve(start, end, latest.as_deref(), today)?;
        let previous_period = period.previous_month();
        let previous_year_period = period.previous_year();
        let year_to_date_period = period.year_to_date();

        let window = |p: &ReportingPeriod| p.to_filter(store_location.clone(), sales_channel.clone());
        let current = self.kpis(&window(&period)).await?;
        let previous = self.kpis(&window(&previous_period)).await?;
        let previous_year = self.kpis(&window(&previous_year_period)).await?;
        let year_to_date = self.kpis(&window(&year_to_date_period)).await?;

        Ok(PeriodComparison {
            period,
            previous_period,
            previous_year_period,
            year_to_date_period,
            current,
            previous,
            previous_year,
            year_to_date,
        })
    }
}
