// Reporting pipeline: field mapping, ingestion, storage and aggregation

pub mod aggregation;
pub mod ingestion;
pub mod mapper;
pub mod storage;

pub use aggregation::{Aggregator, Dashboard, Dimension, KpiFilter, KpiSummary};
pub use ingestion::{IngestionPipeline, IngestionReport};
pub use mapper::{FieldMapper, MappingTables, RawRow};
