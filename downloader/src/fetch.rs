/// HTTP download primitive used for artifacts and the version resource.
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use htmc_ws_shared::errors::DownloadError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Destination already existed and the download was not forced.
    Skipped,
    Downloaded { bytes: u64 },
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// `timeout` bounds each whole request, body included.
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("htmc-ws/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self { client })
    }

    /// Download `url` to `dest`.
    ///
    /// An existing `dest` is left alone unless `force` is set. The body is
    /// streamed into `<dest>.part` and renamed over `dest` only once it has
    /// been fully written, so a failed download never touches `dest`.
    pub async fn download(
        &self,
        force: bool,
        dest: &Path,
        url: &str,
    ) -> Result<DownloadOutcome, DownloadError> {
        if dest.exists() && !force {
            info!("Ignoring download of <{}> because {} already exists", url, dest.display());
            return Ok(DownloadOutcome::Skipped);
        }

        info!("Downloading <{}> to {}", url, dest.display());
        let response = self.get(url).await?;

        let part = part_path(dest);
        let bytes = match write_body(response, url, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    debug!("No partial file to clean up at {}: {}", part.display(), rm);
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|source| DownloadError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        info!("Downloaded {} ({} bytes)", dest.display(), bytes);
        Ok(DownloadOutcome::Downloaded { bytes })
    }

    /// GET a small text resource.
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Request status error for <{}>: {}", url, status);
            return Err(DownloadError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }
}

async fn write_body(
    mut response: reqwest::Response,
    url: &str,
    part: &Path,
) -> Result<u64, DownloadError> {
    let io_err = |source: std::io::Error| DownloadError::Io {
        path: part.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?
    {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    dest.with_file_name(name)
}
