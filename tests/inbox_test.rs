use anyhow::Result;
use retail_pulse::pipeline::aggregation::KpiFilter;
use retail_pulse::pipeline::ingestion::IngestionPipeline;
use retail_pulse::pipeline::mapper::FieldMapper;
use retail_pulse::pipeline::storage::{SqliteStorage, Storage};
use retail_pulse::portal::{LocalFileSource, ReportSource};
use retail_pulse::types::{SyncSource, SyncStatus};
use std::sync::Arc;
use tempfile::tempdir;

const JAN: &str = "Invoice Number,Transaction Date,Nett Invoice Value\nA,2024-01-02,10\nB,2024-01-03,20\n";
const FEB: &str = "Invoice Number,Transaction Date,Nett Invoice Value\nC,2024-02-02,30\n";

#[tokio::test]
async fn sweep_ingests_archives_and_skips_known_digests() -> Result<()> {
    let dir = tempdir()?;
    let inbox = dir.path().join("inbox");
    let archive = dir.path().join("archive");
    std::fs::create_dir_all(&inbox)?;
    std::fs::write(inbox.join("01_jan.csv"), JAN)?;
    std::fs::write(inbox.join("02_feb.CSV"), FEB)?;
    std::fs::write(inbox.join("notes.txt"), "ignore me")?;

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(dir.path().join("db.sqlite"))?);
    let pipeline = IngestionPipeline::new(storage.clone(), FieldMapper::default());

    let summary = pipeline.sweep_inbox(&inbox, &archive).await?;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.skipped, 0);
    assert!(archive.join("01_jan.csv").exists());
    assert!(archive.join("02_feb.CSV").exists());
    assert!(!inbox.join("01_jan.csv").exists());
    assert!(inbox.join("notes.txt").exists());

    let logs = storage.list_sync_logs(10).await?;
    assert!(logs
        .iter()
        .all(|l| l.source == SyncSource::PortalAutomation && l.triggered_by == "automation"));

    // Same bytes under a new name are recognised by digest.
    std::fs::write(inbox.join("03_jan_again.csv"), JAN)?;
    let again = pipeline.sweep_inbox(&inbox, &archive).await?;
    assert_eq!(again.skipped, 1);
    assert_eq!(again.processed, 0);
    assert_eq!(storage.query_transactions(&KpiFilter::default()).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn failing_file_does_not_stop_the_sweep() -> Result<()> {
    let dir = tempdir()?;
    let inbox = dir.path().join("inbox");
    let archive = dir.path().join("archive");
    std::fs::create_dir_all(&inbox)?;
    std::fs::write(inbox.join("a_bad.csv"), "Customer\nnobody\n")?;
    std::fs::write(inbox.join("b_good.csv"), FEB)?;

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory()?);
    let pipeline = IngestionPipeline::new(storage.clone(), FieldMapper::default());
    let summary = pipeline.sweep_inbox(&inbox, &archive).await?;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    assert!(inbox.join("a_bad.csv").exists());
    assert!(archive.join("b_good.csv").exists());

    let failed: Vec<_> = storage
        .list_sync_logs(10)
        .await?
        .into_iter()
        .filter(|l| l.status == SyncStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].file_sha256.is_some());

    // A failed digest is retried on the next sweep.
    let retry = pipeline.sweep_inbox(&inbox, &archive).await?;
    assert_eq!(retry.failed, 1);
    assert_eq!(retry.skipped, 0);
    Ok(())
}

#[tokio::test]
async fn local_source_feeds_the_inbox() -> Result<()> {
    let dir = tempdir()?;
    let export = dir.path().join("export.csv");
    std::fs::write(&export, FEB)?;
    let inbox = dir.path().join("inbox");

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory()?);
    let pipeline = IngestionPipeline::new(storage.clone(), FieldMapper::default());

    let fetched = LocalFileSource::new(&export).fetch(&inbox).await?;
    assert!(fetched.starts_with(&inbox));
    let summary = pipeline.sweep_inbox(&inbox, &dir.path().join("archive")).await?;
    assert_eq!(summary.processed, 1);
    assert_eq!(storage.latest_transaction_date().await?.as_deref(), Some("2024-02-02"));
    Ok(())
}

#[tokio::test]
async fn archive_failure_is_counted_and_the_sweep_continues() -> Result<()> {
    let dir = tempdir()?;
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox)?;
    std::fs::write(inbox.join("01_jan.csv"), JAN)?;
    std::fs::write(inbox.join("02_feb.csv"), FEB)?;
    // A plain file where the archive directory should be.
    let archive = dir.path().join("archive");
    std::fs::write(&archive, "not a directory")?;

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory()?);
    let pipeline = IngestionPipeline::new(storage.clone(), FieldMapper::default());
    let summary = pipeline.sweep_inbox(&inbox, &archive).await?;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.records, 3);
    assert!(inbox.join("01_jan.csv").exists());
    assert!(inbox.join("02_feb.csv").exists());

    // Both were committed, so the next sweep recognises them.
    let again = pipeline.sweep_inbox(&inbox, &archive).await?;
    assert_eq!(again.skipped, 2);
    assert_eq!(storage.query_transactions(&KpiFilter::default()).await?.len(), 3);
    Ok(())
}
