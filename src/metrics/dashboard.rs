//! Dashboard query metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct DashboardMetrics;

impl DashboardMetrics {
    pub fn record_query(rows_scanned: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "dashboard", "queries")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "dashboard", "rows_scanned"))
            .record(rows_scanned as f64);
        ::metrics::histogram!(phase_metric!(histogram, "dashboard", "query_duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for DashboardMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "dashboard", "queries"));
        let _ = histogram!(phase_metric!(histogram, "dashboard", "rows_scanned"));
        let _ = histogram!(phase_metric!(histogram, "dashboard", "query_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "dashboard"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "dashboard", "queries"),
                metric_type: MetricType::Counter,
                help: "KPI and breakdown queries served",
            },
            MetricDoc {
                name: phase_metric!(histogram, "dashboard", "rows_scanned"),
                metric_type: MetricType::Histogram,
                help: "Transaction rows read per query",
            },
            MetricDoc {
                name: phase_metric!(histogram, "dashboard", "query_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time to load and aggregate one query",
            },
        ]
    }
}
