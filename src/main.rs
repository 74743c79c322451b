use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use retail_pulse::config::{Config, DEFAULT_CONFIG_PATH};
use retail_pulse::logging;
use retail_pulse::metrics;
use retail_pulse::pipeline::aggregation::{
    local_today, Aggregator, Dashboard, Dimension, KpiFilter, KpiSummary, ReportingPeriod,
};
use retail_pulse::pipeline::ingestion::IngestionPipeline;
use retail_pulse::pipeline::mapper::FieldMapper;
use retail_pulse::pipeline::storage::{InMemoryStorage, SqliteStorage, Storage};
use retail_pulse::portal::{HttpReportSource, LocalFileSource, ReportSource};
use retail_pulse::scheduler::{self, DailyIngestion};
use retail_pulse::server::{self, AppState};
use retail_pulse::types::SyncSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "retail_pulse")]
#[command(about = "Retail sales and footfall reporting")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Keep everything in memory instead of the SQLite file
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Manual,
    Automation,
}

impl From<SourceArg> for SyncSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Manual => SyncSource::ManualUpload,
            SourceArg::Automation => SyncSource::PortalAutomation,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DimensionArg {
    Store,
    Channel,
}

impl From<DimensionArg> for Dimension {
    fn from(arg: DimensionArg) -> Self {
        match arg {
            DimensionArg::Store => Dimension::Store,
            DimensionArg::Channel => Dimension::Channel,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a sales report (CSV or XLSX)
    Ingest {
        path: PathBuf,
        /// Who triggered the run
        #[arg(long, default_value = "cli")]
        actor: String,
        #[arg(long, value_enum, default_value = "manual")]
        source: SourceArg,
    },
    /// Ingest a door-counter footfall export
    Footfall { path: PathBuf },
    /// Ingest and archive every new report in the inbox
    Sweep {
        #[arg(long)]
        inbox: Option<PathBuf>,
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Fetch a report into the inbox, then sweep it
    Fetch {
        /// Copy this file instead of downloading from the configured URL
        #[arg(long)]
        file: Option<PathBuf>,
        /// Only fetch, leave the file in the inbox
        #[arg(long)]
        no_ingest: bool,
    },
    /// Print KPIs for a date range
    Kpis {
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        channel: Option<String>,
        /// Break the KPIs down by store or channel
        #[arg(long, value_enum)]
        by: Option<DimensionArg>,
        /// Compare the window with last month, last year and fiscal year to date
        #[arg(long)]
        compare: bool,
    },
    /// Show recent ingestion runs
    SyncLog {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

fn open_storage(config: &Config, in_memory: bool) -> anyhow::Result<Arc<dyn Storage>> {
    if in_memory {
        warn!("Using in-memory storage; nothing will be persisted");
        return Ok(Arc::new(InMemoryStorage::new()));
    }
    let storage = SqliteStorage::open(&config.storage.database_path)
        .with_context(|| format!("opening {}", config.storage.database_path))?;
    Ok(Arc::new(storage))
}

fn print_summary(label: &str, kpis: &KpiSummary) {
    let k = kpis.rounded();
    println!("\n📊 {}", label);
    println!("   Net revenue:      {:.2}", k.net_revenue);
    println!("   Net quantity:     {}", k.net_quantity);
    println!("   Transactions:     {}", k.transaction_count);
    println!("   ATV:              {:.2}", k.average_transaction_value);
    println!("   Basket size:      {:.2}", k.basket_size);
    println!("   Multi-item %:     {:.2}", k.multi_item_percentage);
    println!("   Footfall:         {}", k.total_footfall);
    println!("   Conversion %:     {:.2}", k.conversion_percentage);
}

fn window_label(name: &str, period: &ReportingPeriod) -> String {
    format!("{} ({} to {})", name, period.start, period.end)
}

async fn sweep(pipeline: &IngestionPipeline, inbox: &Path, archive: &Path) -> anyhow::Result<()> {
    let summary = pipeline.sweep_inbox(inbox, archive).await?;
    println!(
        "✅ Sweep: {} processed, {} skipped, {} failed, {} records",
        summary.processed, summary.skipped, summary.failed, summary.records
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    logging::init_logging(&config.logging.directory);
    metrics::init_metrics();

    let storage = open_storage(&config, cli.memory)?;
    let pipeline = Arc::new(IngestionPipeline::new(storage.clone(), FieldMapper::default()));
    let dashboard = Arc::new(Dashboard::new(
        storage.clone(),
        Aggregator::new(config.aggregation.return_invoice_prefix.clone()),
    ));
    let inbox_dir = PathBuf::from(&config.ingestion.inbox_dir);
    let archive_dir = PathBuf::from(&config.ingestion.archive_dir);

    match cli.command {
        Commands::Ingest { path, actor, source } => {
            let report = pipeline
                .ingest_path_detailed(&path, &actor, source.into())
                .await
                .with_context(|| format!("ingesting {}", path.display()))?;
            println!(
                "✅ Ingested {} records ({} rejected) replacing {} invoices",
                report.rows_accepted, report.rows_rejected, report.invoices_replaced
            );
        }
        Commands::Footfall { path } => {
            let count = pipeline.ingest_footfall_path(&path).await?;
            println!("✅ Stored {} footfall day totals", count);
        }
        Commands::Sweep { inbox, archive } => {
            let inbox = inbox.unwrap_or(inbox_dir);
            let archive = archive.unwrap_or(archive_dir);
            sweep(&pipeline, &inbox, &archive).await?;
        }
        Commands::Fetch { file, no_ingest } => {
            let source: Box<dyn ReportSource> = match file {
                Some(path) => Box::new(LocalFileSource::new(path)),
                None => Box::new(HttpReportSource::from_config(&config.portal)?),
            };
            info!("Fetching report via {}", source.source_name());
            let path = source.fetch(&inbox_dir).await?;
            println!("📥 Fetched {}", path.display());
            if !no_ingest {
                sweep(&pipeline, &inbox_dir, &archive_dir).await?;
            }
        }
        Commands::Kpis {
            start_date,
            end_date,
            store,
            channel,
            by,
            compare,
        } => {
            if compare {
                let result = dashboard
                    .compare_periods(
                        start_date.as_deref(),
                        end_date.as_deref(),
                        store,
                        channel,
                        local_today(),
                    )
                    .await?;
                print_summary(&window_label("Current", &result.period), &result.current);
                print_summary(
                    &window_label("Previous month", &result.previous_period),
                    &result.previous,
                );
                print_summary(
                    &window_label("Previous year", &result.previous_year_period),
                    &result.previous_year,
                );
                print_summary(
                    &window_label("Fiscal YTD", &result.year_to_date_period),
                    &result.year_to_date,
                );
                return Ok(());
            }

            let filter = KpiFilter {
                start_date,
                end_date,
                store_location: store,
                sales_channel: channel,
            };
            match by {
                Some(dimension) => {
                    for (key, kpis) in dashboard.breakdown(&filter, dimension.into()).await? {
                        print_summary(&key, &kpis);
                    }
                }
                None => print_summary("KPIs", &dashboard.kpis(&filter).await?),
            }
        }
        Commands::SyncLog { limit } => {
            for log in storage.list_sync_logs(limit).await? {
                println!(
                    "{}  {:<17} {:<9} {:>6} records  by {}{}",
                    log.started_at.format("%Y-%m-%d %H:%M:%S"),
                    log.source.as_str(),
                    log.status.as_str(),
                    log.records_processed,
                    log.triggered_by,
                    log.error_message
                        .map(|e| format!("  ({})", e))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            if config.schedule.enabled {
                let run_at = scheduler::parse_run_time(&config.schedule.daily_at)?;
                let source = Arc::new(
                    HttpReportSource::from_config(&config.portal)
                        .context("schedule.enabled needs portal.report_url")?,
                );
                DailyIngestion::new(pipeline.clone(), source, &inbox_dir, &archive_dir).spawn(run_at);
            }
            let state = AppState { dashboard, pipeline };
            server::start_server(state, port).await?;
        }
    }

    Ok(())
}
