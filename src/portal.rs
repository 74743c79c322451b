//! Report sources that drop a sales export into the inbox.

use crate::config::PortalConfig;
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[async_trait]
pub trait ReportSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Write one report into `dest_dir` and return its path.
    async fn fetch(&self, dest_dir: &Path) -> Result<PathBuf>;
}

/// Downloads the export from a fixed URL.
pub struct HttpReportSource {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpReportSource {
    pub fn new(url: impl Into<String>, timeout: Duration, max_attempts: u32, retry_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("retail_pulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            max_attempts: max_attempts.max(1),
            retry_delay,
        })
    }

    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let url = config
            .report_url
            .clone()
            .ok_or_else(|| DashboardError::Config("portal.report_url is not set".to_string()))?;
        Self::new(
            url,
            Duration::from_secs(config.timeout_seconds),
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    async fn download_once(&self) -> Result<(String, Vec<u8>)> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DashboardError::Download {
                message: format!("{} returned {}", self.url, status),
            });
        }
        let extension = extension_for(
            resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            resp.headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
        );
        let body = resp.bytes().await?.to_vec();
        if body.is_empty() {
            return Err(DashboardError::Download {
                message: format!("{} returned an empty body", self.url),
            });
        }
        Ok((extension.to_string(), body))
    }
}

/// Spreadsheet responses keep their workbook flavour; everything else is CSV.
pub fn extension_for(content_type: Option<&str>, disposition: Option<&str>) -> &'static str {
    let content_type = content_type.unwrap_or_default().to_lowercase();
    let disposition = disposition.unwrap_or_default().to_lowercase();
    if content_type.contains("spreadsheetml") || disposition.contains(".xlsx") {
        "xlsx"
    } else if content_type.contains("ms-excel") || disposition.contains(".xls") {
        "xls"
    } else {
        "csv"
    }
}

fn timestamped_name(prefix: &str, extension: &str) -> String {
    format!("{}_{}.{}", prefix, Utc::now().format("%Y%m%d_%H%M%S"), extension)
}

#[async_trait]
impl ReportSource for HttpReportSource {
    fn source_name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self))]
    async fn fetch(&self, dest_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let mut attempt = 1;
        let (extension, body) = loop {
            match self.download_once().await {
                Ok(downloaded) => break downloaded,
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "Report download attempt {}/{} failed: {}",
                        attempt, self.max_attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let path = dest_dir.join(timestamped_name("sales_report", &extension));
        tokio::fs::write(&path, &body).await?;
        info!("Downloaded {} bytes from {} to {}", body.len(), self.url, path.display());
        Ok(path)
    }
}

/// Copies an existing export into the inbox.
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSource for LocalFileSource {
    fn source_name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, dest_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let file_name = self.path.file_name().ok_or_else(|| DashboardError::Download {
            message: format!("{} has no file name", self.path.display()),
        })?;
        let target = dest_dir.join(file_name);
        tokio::fs::copy(&self.path, &target).await?;
        debug!("Copied {} to {}", self.path.display(), target.display());
        Ok(target)
    }
}
