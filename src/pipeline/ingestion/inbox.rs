//! Drop-folder sweep for automated report downloads.

use super::reader::is_report_file;
use super::{file_digest, IngestionPipeline};
use crate::constants::AUTOMATION_ACTOR;
use crate::error::Result;
use crate::metrics::IngestionMetrics;
use crate::types::SyncSource;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub records: usize,
}

/// Report files in `dir`, sorted by name.
pub async fn list_reports(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_report_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Move `path` into `archive_dir`, falling back to copy + remove across devices.
pub async fn archive_file(path: &Path, archive_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(archive_dir).await?;
    let file_name = path.file_name().unwrap_or_default();
    let target = archive_dir.join(file_name);
    if let Err(e) = tokio::fs::rename(path, &target).await {
        warn!("Rename into archive failed ({}), copying instead", e);
        tokio::fs::copy(path, &target).await?;
        tokio::fs::remove_file(path).await?;
    }
    Ok(target)
}

impl IngestionPipeline {
    /// Ingest every new report in `inbox_dir` and archive it.
    ///
    /// Files whose SHA-256 already has a completed sync log are skipped and
    /// left in place. A failing file is logged and counted; the sweep goes on.
    /// A file that ingests but cannot be archived counts as both processed
    /// and failed, and is skipped by digest on the next sweep.
    pub async fn sweep_inbox(&self, inbox_dir: &Path, archive_dir: &Path) -> Result<SweepSummary> {
        tokio::fs::create_dir_all(inbox_dir).await?;
        let mut summary = SweepSummary::default();

        for path in list_reports(inbox_dir).await? {
            let digest = match file_digest(&path).await {
                Ok(digest) => digest,
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    summary.failed += 1;
                    continue;
                }
            };
            if self.storage().has_completed_sync_for_digest(&digest).await? {
                info!("Skipping {}: already ingested", path.display());
                IngestionMetrics::record_file_skipped();
                summary.skipped += 1;
                continue;
            }

            match self
                .ingest_file(&path, AUTOMATION_ACTOR, SyncSource::PortalAutomation, Some(digest))
                .await
            {
                Ok(report) => {
                    summary.processed += 1;
                    summary.records += report.rows_accepted;
                    match archive_file(&path, archive_dir).await {
                        Ok(archived) => {
                            info!("Archived {} to {}", path.display(), archived.display())
                        }
                        Err(e) => {
                            error!("Ingested {} but could not archive it: {}", path.display(), e);
                            summary.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to ingest {}: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            records = summary.records,
            "Inbox sweep finished"
        );
        Ok(summary)
    }
}
