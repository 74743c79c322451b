/// Column-name synonyms and lookup tables used by the field mapper.
///
/// Header synonyms are case-sensitive and listed in priority order: the first
/// key present in a row wins. They must stay in sync with the upstream report
/// exports, so edit with care.

// Header synonyms per canonical field
pub const INVOICE_NUMBER_KEYS: &[&str] = &["Invoice Number", "invoice_number", "InvoiceNumber"];
pub const TRANSACTION_TYPE_KEYS: &[&str] = &["Transaction Type", "trans_type", "Type"];
pub const STORE_KEYS: &[&str] = &["Store", "store_location", "Location"];
pub const CHANNEL_KEYS: &[&str] = &["Channel", "sales_channel", "SalesChannel"];
pub const GROSS_QUANTITY_KEYS: &[&str] = &["Gross Quantity", "gross_quantity", "Quantity"];
pub const RETURNED_QUANTITY_KEYS: &[&str] = &["Returned Quantity", "returned_quantity", "Returns"];
pub const NET_QUANTITY_KEYS: &[&str] = &["Net Quantity", "net_quantity"];
pub const GROSS_VALUE_KEYS: &[&str] = &["Gross Value", "gross_value", "Amount"];
pub const NETT_VALUE_KEYS: &[&str] = &["Nett Invoice Value", "nett_invoice_value", "NetAmount"];
pub const TRANSACTION_DATE_KEYS: &[&str] = &["Transaction Date", "transaction_date", "Date"];
pub const CUSTOMER_KEYS: &[&str] = &["Customer", "customer_name"];
pub const SKU_KEYS: &[&str] = &["SKU", "product_sku"];
pub const PRODUCT_KEYS: &[&str] = &["Product", "product_name"];

// Canonical stores
pub const STORE_PALLADIUM: &str = "Jacadi Palladium";
pub const STORE_MOA: &str = "Jacadi MOA";
pub const STORE_WEBSTORE: &str = "Shopify Webstore";

// Canonical channels
pub const CHANNEL_STORE: &str = "Store";
pub const CHANNEL_ECOM: &str = "E-com";
pub const CHANNEL_WHATSAPP: &str = "WhatsApp";

/// Uppercased raw store value -> canonical store
pub const STORE_MAPPING: &[(&str, &str)] = &[
    ("JACADI PALLADIUM", STORE_PALLADIUM),
    ("JACADI MOA", STORE_MOA),
    ("SHOPIFY WEBSTORE", STORE_WEBSTORE),
    ("PALLADIUM", STORE_PALLADIUM),
    ("MOA", STORE_MOA),
    ("WEBSTORE", STORE_WEBSTORE),
    ("SHOPIFY", STORE_WEBSTORE),
];

/// Uppercased raw channel value -> canonical channel
pub const CHANNEL_MAPPING: &[(&str, &str)] = &[
    ("STORE", CHANNEL_STORE),
    ("E-COM", CHANNEL_ECOM),
    ("ECOM", CHANNEL_ECOM),
    ("WHATSAPP", CHANNEL_WHATSAPP),
    ("WA", CHANNEL_WHATSAPP),
];

pub const UNKNOWN_STORE: &str = "Unknown";
pub const DEFAULT_CHANNEL: &str = CHANNEL_STORE;
pub const DEFAULT_TRANSACTION_TYPE: &str = "IV";

/// Accepted source date layouts, tried in order.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%Y/%m/%d"];
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Invoice numbers carrying this prefix are return documents: they count
/// toward revenue and quantity but not toward the transaction count.
pub const DEFAULT_RETURN_INVOICE_PREFIX: &str = "SR";

/// Fiscal years start on 1 April.
pub const FISCAL_YEAR_START_MONTH: u32 = 4;

// Footfall export columns
pub const FOOTFALL_DATE_KEY: &str = "Date";
pub const FOOTFALL_STORE_KEY: &str = "Store Name";
pub const FOOTFALL_COUNT_KEY: &str = "Total IN";

// Actors
pub const AUTOMATION_ACTOR: &str = "automation";
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// Report file extensions the pipeline can read
pub const REPORT_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];
