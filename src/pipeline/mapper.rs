//! Field mapping: one raw report row in, one canonical transaction out.
//!
//! Vendor exports name the same column several ways and format dates and
//! store names inconsistently. The mapper resolves each canonical field
//! through an ordered synonym list and degrades to defaults for everything
//! except the invoice number, which is the only reason a row is rejected.

use crate::constants::*;
use crate::types::{TransactionRecord, TransactionType};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A single input row keyed by the source's column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip a header row with one data row. Missing trailing cells stay absent.
    pub fn from_header<'a, I>(headers: &[String], values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields = headers
            .iter()
            .cloned()
            .zip(values.into_iter().map(str::to_string))
            .collect();
        Self { fields }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Value of the first key present in the row, even if that value is empty.
    pub fn first_present(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawRow
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Store and channel lookup tables, keyed by uppercased raw value.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTables {
    stores: HashMap<String, String>,
    channels: HashMap<String, String>,
}

impl Default for MappingTables {
    fn default() -> Self {
        Self::new(
            STORE_MAPPING.iter().map(|(k, v)| (*k, *v)),
            CHANNEL_MAPPING.iter().map(|(k, v)| (*k, *v)),
        )
    }
}

impl MappingTables {
    pub fn new<S, C, K, V>(stores: S, channels: C) -> Self
    where
        S: IntoIterator<Item = (K, V)>,
        C: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let upper = |(k, v): (K, V)| (k.as_ref().to_uppercase(), v.into());
        Self {
            stores: stores.into_iter().map(upper).collect(),
            channels: channels.into_iter().map(upper).collect(),
        }
    }

    pub fn store(&self, raw: &str) -> String {
        lookup_or_title(&self.stores, raw, UNKNOWN_STORE)
    }

    pub fn channel(&self, raw: &str) -> String {
        lookup_or_title(&self.channels, raw, DEFAULT_CHANNEL)
    }
}

fn lookup_or_title(table: &HashMap<String, String>, raw: &str, empty: &str) -> String {
    let key = raw.trim().to_uppercase();
    if key.is_empty() {
        return empty.to_string();
    }
    match table.get(&key) {
        Some(canonical) => canonical.clone(),
        None => title_case(&key),
    }
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Canonicalize a date to `YYYY-MM-DD`, or hand the input back untouched when
/// no known layout matches.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .map(|date| date.format(CANONICAL_DATE_FORMAT).to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Lenient float parse. Absent, blank, malformed and non-finite values are 0.
pub fn parse_number(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else { return 0.0 };
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Quantities are parsed as floats and truncated toward zero.
pub fn parse_quantity(raw: Option<&str>) -> i64 {
    parse_number(raw).trunc() as i64
}

fn optional_text(row: &RawRow, keys: &[&str]) -> Option<String> {
    row.first_present(keys)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Converts raw rows into canonical transaction records.
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    tables: MappingTables,
}

impl FieldMapper {
    pub fn new(tables: MappingTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &MappingTables {
        &self.tables
    }

    /// Returns `None` when the row has no usable invoice number.
    pub fn map_row(&self, row: &RawRow) -> Option<TransactionRecord> {
        let invoice_number = row
            .first_present(INVOICE_NUMBER_KEYS)
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();

        let transaction_type = TransactionType::from_code(
            row.first_present(TRANSACTION_TYPE_KEYS)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_TRANSACTION_TYPE),
        );

        let store_location = self
            .tables
            .store(row.first_present(STORE_KEYS).unwrap_or(""));
        let sales_channel = self
            .tables
            .channel(row.first_present(CHANNEL_KEYS).unwrap_or(DEFAULT_CHANNEL));

        let gross_quantity = parse_quantity(row.first_present(GROSS_QUANTITY_KEYS));
        let returned_quantity = parse_quantity(row.first_present(RETURNED_QUANTITY_KEYS));
        let net_quantity = match row.first_present(NET_QUANTITY_KEYS) {
            Some(raw) => parse_quantity(Some(raw)),
            None => gross_quantity.saturating_sub(returned_quantity),
        };

        let gross_value = parse_number(row.first_present(GROSS_VALUE_KEYS));
        let nett_invoice_value = match row.first_present(NETT_VALUE_KEYS) {
            Some(raw) => parse_number(Some(raw)),
            None => gross_value,
        };

        let transaction_date = row
            .first_present(TRANSACTION_DATE_KEYS)
            .map(normalize_date)
            .unwrap_or_default();

        Some(TransactionRecord {
            id: Uuid::new_v4(),
            invoice_number,
            transaction_type,
            transaction_date,
            store_location,
            sales_channel,
            gross_quantity,
            returned_quantity,
            net_quantity,
            gross_value,
            nett_invoice_value,
            customer_name: optional_text(row, CUSTOMER_KEYS),
            product_sku: optional_text(row, SKU_KEYS),
            product_name: optional_text(row, PRODUCT_KEYS),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn huge_quantities_saturate_instead_of_overflowing() {
        let record = FieldMapper::default()
            .map_row(&row(&[
                ("Invoice Number", "INV1"),
                ("Gross Quantity", "1e300"),
                ("Returned Quantity", "-1"),
            ]))
            .expect("row has an invoice number");
        assert_eq!(record.gross_quantity, i64::MAX);
        assert_eq!(record.net_quantity, i64::MAX);
    }

    #[test]
    fn maps_the_whatsapp_palladium_row() {
        let mapper = FieldMapper::default();
        let record = mapper
            .map_row(&row(&[
                ("Invoice Number", "INV100"),
                ("Store", "PALLADIUM"),
                ("Channel", "WA"),
                ("Gross Quantity", "3"),
                ("Net Quantity", "3"),
                ("Nett Invoice Value", "1500"),
                ("Transaction Date", "15/01/2024"),
            ]))
            .expect("row has an invoice number");

        assert_eq!(record.invoice_number, "INV100");
        assert_eq!(record.store_location, "Jacadi Palladium");
        assert_eq!(record.sales_channel, "WhatsApp");
        assert_eq!(record.transaction_date, "2024-01-15");
        assert_eq!(record.net_quantity, 3);
        assert_eq!(record.nett_invoice_value, 1500.0);
        assert_eq!(record.transaction_type, TransactionType::Invoice);
    }

    #[test]
    fn every_invoice_synonym_is_accepted() {
        let mapper = FieldMapper::default();
        for key in INVOICE_NUMBER_KEYS {
            let record = mapper.map_row(&row(&[(*key, "A-17")])).unwrap();
            assert_eq!(record.invoice_number, "A-17", "synonym {key}");
        }
    }

    #[test]
    fn synonym_priority_is_first_present_key() {
        let mapper = FieldMapper::default();
        let record = mapper
            .map_row(&row(&[
                ("InvoiceNumber", "LOW"),
                ("Invoice Number", "HIGH"),
            ]))
            .unwrap();
        assert_eq!(record.invoice_number, "HIGH");
    }

    #[test]
    fn rows_without_invoice_number_are_rejected() {
        let mapper = FieldMapper::default();
        assert!(mapper.map_row(&row(&[("Store", "MOA")])).is_none());
        assert!(mapper.map_row(&row(&[("Invoice Number", "")])).is_none());
        assert!(mapper.map_row(&row(&[("invoice_number", "   ")])).is_none());
        assert!(mapper.map_row(&RawRow::new()).is_none());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let record = FieldMapper::default()
            .map_row(&row(&[
                ("invoice_number", "X1"),
                ("gross_quantity", "5"),
                ("returned_quantity", "2"),
                ("gross_value", "99.5"),
            ]))
            .unwrap();

        assert_eq!(record.store_location, "Unknown");
        assert_eq!(record.sales_channel, "Store");
        assert_eq!(record.transaction_type, TransactionType::Invoice);
        assert_eq!(record.net_quantity, 3);
        assert_eq!(record.nett_invoice_value, 99.5);
        assert_eq!(record.transaction_date, "");
        assert!(record.customer_name.is_none());
    }

    #[test]
    fn unknown_store_and_channel_are_title_cased() {
        let tables = MappingTables::default();
        assert_eq!(tables.store("mall of asia"), "Mall Of Asia");
        assert_eq!(tables.store("jacadi moa"), "Jacadi MOA");
        assert_eq!(tables.channel("instagram dm"), "Instagram Dm");
        assert_eq!(tables.channel("ecom"), "E-com");
        assert_eq!(tables.channel(""), "Store");
    }

    #[test]
    fn custom_tables_replace_the_defaults() {
        let tables = MappingTables::new([("north", "North Outlet")], [("pos", "Store")]);
        let mapper = FieldMapper::new(tables);
        let record = mapper
            .map_row(&row(&[("Invoice Number", "N1"), ("Store", "North"), ("Channel", "POS")]))
            .unwrap();
        assert_eq!(record.store_location, "North Outlet");
        assert_eq!(record.sales_channel, "Store");
    }

    #[test]
    fn all_supported_date_layouts_agree() {
        for raw in ["2024-01-15", "15/01/2024", "01/15/2024", "15-01-2024", "2024/01/15"] {
            assert_eq!(normalize_date(raw), "2024-01-15", "layout {raw}");
        }
    }

    #[test]
    fn day_first_wins_for_ambiguous_slashes() {
        assert_eq!(normalize_date("05/01/2024"), "2024-01-05");
    }

    #[test]
    fn unparseable_dates_pass_through() {
        assert_eq!(normalize_date("Jan 15th"), "Jan 15th");
        assert_eq!(normalize_date("2024-01-15 10:30"), "2024-01-15 10:30");
    }

    #[test]
    fn numbers_coerce_leniently() {
        assert_eq!(parse_number(None), 0.0);
        assert_eq!(parse_number(Some("")), 0.0);
        assert_eq!(parse_number(Some("abc")), 0.0);
        assert_eq!(parse_number(Some("1,500.25")), 1500.25);
        assert_eq!(parse_number(Some("-40")), -40.0);
        assert_eq!(parse_quantity(Some("2.9")), 2);
        assert_eq!(parse_quantity(Some("-1.5")), -1);
    }

    #[test]
    fn present_but_empty_net_quantity_is_zero() {
        let record = FieldMapper::default()
            .map_row(&row(&[
                ("Invoice Number", "E1"),
                ("Gross Quantity", "4"),
                ("Net Quantity", ""),
            ]))
            .unwrap();
        assert_eq!(record.net_quantity, 0);
    }

    #[test]
    fn header_zip_leaves_short_rows_absent() {
        let headers = vec!["Invoice Number".to_string(), "Store".to_string()];
        let raw = RawRow::from_header(&headers, ["INV1"]);
        assert_eq!(raw.get("Invoice Number"), Some("INV1"));
        assert_eq!(raw.get("Store"), None);
    }
}
