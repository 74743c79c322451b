//! Door-counter exports: `Date`, `Store Name`, `Total IN`.

use super::reader::{self, ReportFormat};
use super::IngestionPipeline;
use crate::constants::{FOOTFALL_COUNT_KEY, FOOTFALL_DATE_KEY, FOOTFALL_STORE_KEY, STORE_MOA, STORE_PALLADIUM};
use crate::error::Result;
use crate::metrics::IngestionMetrics;
use crate::pipeline::mapper::{normalize_date, parse_quantity, RawRow};
use crate::types::FootfallEntry;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counter store names are free text; match on the mall name.
pub fn resolve_footfall_store(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    if lower.contains("palladium") {
        Some(STORE_PALLADIUM)
    } else if lower.contains("asia") || lower.contains("moa") {
        Some(STORE_MOA)
    } else {
        None
    }
}

/// Day totals per store. Hourly rows for the same day are summed.
pub fn collect_footfall<I>(rows: I) -> Result<Vec<FootfallEntry>>
where
    I: Iterator<Item = Result<RawRow>>,
{
    let mut totals: BTreeMap<(String, &'static str), i64> = BTreeMap::new();
    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(e) if reader::is_skippable_row_error(&e) => {
                warn!("Skipping unreadable footfall row: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(store) = resolve_footfall_store(row.get(FOOTFALL_STORE_KEY).unwrap_or_default()) else {
            debug!("Skipping footfall row for unrecognised store");
            continue;
        };
        let count = parse_quantity(row.get(FOOTFALL_COUNT_KEY));
        if count <= 0 {
            continue;
        }
        let date = normalize_date(row.get(FOOTFALL_DATE_KEY).unwrap_or_default());
        if date.trim().is_empty() {
            continue;
        }
        let total = totals.entry((date, store)).or_default();
        *total = total.saturating_add(count);
    }

    Ok(totals
        .into_iter()
        .map(|((date, store), footfall_count)| FootfallEntry {
            id: Uuid::new_v4(),
            date,
            store_location: store.to_string(),
            footfall_count,
        })
        .collect())
}

fn read_footfall(path: &Path) -> Result<Vec<FootfallEntry>> {
    match ReportFormat::from_path(path)? {
        ReportFormat::Csv => collect_footfall(reader::csv_rows(std::fs::File::open(path)?)?),
        ReportFormat::Spreadsheet => {
            collect_footfall(reader::spreadsheet_rows(path)?.into_iter().map(Ok))
        }
    }
}

impl IngestionPipeline {
    pub async fn ingest_footfall_reader<R: Read>(&self, reader: R) -> Result<usize> {
        let entries = collect_footfall(reader::csv_rows(reader)?)?;
        self.store_footfall(entries).await
    }

    pub async fn ingest_footfall_path(&self, path: &Path) -> Result<usize> {
        let owned = path.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || read_footfall(&owned)).await??;
        self.store_footfall(entries).await
    }

    async fn store_footfall(&self, entries: Vec<FootfallEntry>) -> Result<usize> {
        if entries.is_empty() {
            info!("No footfall entries to store");
            return Ok(0);
        }
        let count = entries.len();
        self.storage().upsert_footfall(entries).await?;
        IngestionMetrics::record_footfall_stored(count);
        info!("Stored {} footfall day totals", count);
        Ok(count)
    }
}
