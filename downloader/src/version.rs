/// Installed-vs-latest htmc version check.
///
/// Versions are opaque strings: the installed one is whatever
/// `htmc --version` prints, the latest one is the body of a remote text
/// resource, and they are compared byte-for-byte.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use htmc_ws_shared::errors::VersionError;

use crate::fetch::Fetcher;

pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum UpdateCheck {
    UpToDate { version: String },
    Available { installed: String, latest: String },
    /// The check could not complete; treated as "no update".
    Unknown(VersionError),
}

impl UpdateCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, UpdateCheck::Available { .. })
    }
}

/// Exact inequality. A downgrade or a reformatted string also counts.
pub fn update_available(installed: &str, latest: &str) -> bool {
    installed != latest
}

/// Run `<exec> --version` from `workdir` and capture stdout.
pub async fn installed_version(
    exec: &Path,
    workdir: &Path,
    timeout: Duration,
) -> Result<String, VersionError> {
    let child = Command::new(exec)
        .arg("--version")
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| VersionError::Timeout {
            exec: exec.to_path_buf(),
            secs: timeout.as_secs(),
        })?
        .map_err(|source| VersionError::Spawn {
            exec: exec.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(VersionError::Exited {
            exec: exec.to_path_buf(),
            status: output.status,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub async fn latest_version(fetcher: &Fetcher, url: &str) -> Result<String, VersionError> {
    Ok(fetcher.fetch_text(url).await?)
}

/// Everything needed to ask "is there a newer htmc?".
#[derive(Debug, Clone)]
pub struct VersionProbe {
    pub exec: PathBuf,
    pub workdir: PathBuf,
    pub version_url: String,
    pub timeout: Duration,
}

impl VersionProbe {
    /// Never fails: any error becomes [`UpdateCheck::Unknown`].
    pub async fn check(&self, fetcher: &Fetcher) -> UpdateCheck {
        info!("Checking for updates...");

        let installed = match installed_version(&self.exec, &self.workdir, self.timeout).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Error while checking for updates: {}", e);
                return UpdateCheck::Unknown(e);
            }
        };

        let latest = match latest_version(fetcher, &self.version_url).await {
            Ok(v) => v,
            Err(e) => {
                warn!("{}", e);
                return UpdateCheck::Unknown(e);
            }
        };

        println!("Installed: {}", installed.trim_end());
        println!("Latest: {}", latest.trim_end());

        if update_available(&installed, &latest) {
            UpdateCheck::Available { installed, latest }
        } else {
            UpdateCheck::UpToDate { version: installed }
        }
    }
}
