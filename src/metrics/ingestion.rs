//! Ingestion phase metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct IngestionMetrics;

impl IngestionMetrics {
    /// Record a committed run with its row tallies and commit duration
    pub fn record_run_completed(accepted: usize, rejected: usize, commit_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "ingestion", "runs_completed")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "ingestion", "rows_accepted"))
            .increment(accepted as u64);
        ::metrics::counter!(phase_metric!(counter, "ingestion", "rows_rejected"))
            .increment(rejected as u64);
        ::metrics::histogram!(phase_metric!(histogram, "ingestion", "commit_duration_seconds"))
            .record(commit_secs);
    }

    pub fn record_run_failed(rejected: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingestion", "runs_failed")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "ingestion", "rows_rejected"))
            .increment(rejected as u64);
    }

    pub fn record_file_skipped() {
        ::metrics::counter!(phase_metric!(counter, "ingestion", "files_skipped")).increment(1);
    }

    pub fn record_footfall_stored(entries: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingestion", "footfall_entries"))
            .increment(entries as u64);
    }
}

impl PhaseMetrics for IngestionMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "ingestion", "runs_completed"));
        let _ = counter!(phase_metric!(counter, "ingestion", "runs_failed"));
        let _ = counter!(phase_metric!(counter, "ingestion", "rows_accepted"));
        let _ = counter!(phase_metric!(counter, "ingestion", "rows_rejected"));
        let _ = counter!(phase_metric!(counter, "ingestion", "files_skipped"));
        let _ = counter!(phase_metric!(counter, "ingestion", "footfall_entries"));
        let _ = histogram!(phase_metric!(histogram, "ingestion", "commit_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "ingestion"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "runs_completed"),
                metric_type: MetricType::Counter,
                help: "Ingestion runs committed to storage",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "runs_failed"),
                metric_type: MetricType::Counter,
                help: "Ingestion runs that committed nothing",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "rows_accepted"),
                metric_type: MetricType::Counter,
                help: "Rows mapped to transaction records",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "rows_rejected"),
                metric_type: MetricType::Counter,
                help: "Rows dropped for lacking an invoice number",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "files_skipped"),
                metric_type: MetricType::Counter,
                help: "Inbox files skipped because their digest was already ingested",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingestion", "footfall_entries"),
                metric_type: MetricType::Counter,
                help: "Footfall entries upserted",
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingestion", "commit_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent in the delete-then-insert commit",
            },
        ]
    }
}
