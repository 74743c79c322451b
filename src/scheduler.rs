//! Daily fetch-and-sweep job run alongside the HTTP server.

use crate::error::{DashboardError, Result};
use crate::pipeline::ingestion::inbox::SweepSummary;
use crate::pipeline::ingestion::IngestionPipeline;
use crate::portal::ReportSource;
use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// `HH:MM`, local time.
pub fn parse_run_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| DashboardError::Config(format!("schedule.daily_at must be HH:MM, got '{raw}'")))
}

/// Time from `now` until the next `run_at`. A run time equal to `now` is
/// tomorrow's.
pub fn delay_until(now: NaiveDateTime, run_at: NaiveTime) -> Duration {
    let today = now.date().and_time(run_at);
    let next = if today > now {
        today
    } else {
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    };
    (next - now).to_std().unwrap_or_default()
}

pub struct DailyIngestion {
    pipeline: Arc<IngestionPipeline>,
    source: Arc<dyn ReportSource>,
    inbox_dir: PathBuf,
    archive_dir: PathBuf,
}

impl DailyIngestion {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        source: Arc<dyn ReportSource>,
        inbox_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            source,
            inbox_dir: inbox_dir.into(),
            archive_dir: archive_dir.into(),
        }
    }

    /// Fetch one report, then sweep the inbox. A failed fetch still sweeps
    /// whatever is already waiting there.
    pub async fn run_once(&self) -> Result<SweepSummary> {
        match self.source.fetch(&self.inbox_dir).await {
            Ok(path) => info!("Fetched {} via {}", path.display(), self.source.source_name()),
            Err(e) => warn!("Scheduled fetch via {} failed: {}", self.source.source_name(), e),
        }
        self.pipeline
            .sweep_inbox(&self.inbox_dir, &self.archive_dir)
            .await
    }

    pub fn spawn(self, run_at: NaiveTime) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let delay = delay_until(Local::now().naive_local(), run_at);
                info!("Next scheduled ingestion at {} (in {}s)", run_at, delay.as_secs());
                tokio::time::sleep(delay).await;
                match self.run_once().await {
                    Ok(summary) => info!(
                        processed = summary.processed,
                        failed = summary.failed,
                        "Scheduled ingestion finished"
                    ),
                    Err(e) => error!("Scheduled ingestion failed: {}", e),
                }
            }
        })
    }
}
