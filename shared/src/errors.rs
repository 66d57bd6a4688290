/// Unified error types for htmc-ws.
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while bringing up the server root.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while preparing the directory layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Unable to create {} directory: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Errors from a single artifact download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request error for <{url}>: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request status error for <{url}>: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("IO error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while determining installed or latest version.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Failed to run {}: {source}", exec.display())]
    Spawn {
        exec: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} --version exited with {status}", exec.display())]
    Exited {
        exec: PathBuf,
        status: std::process::ExitStatus,
    },

    #[error("{} --version timed out after {secs}s", exec.display())]
    Timeout { exec: PathBuf, secs: u64 },

    #[error("Error while requesting new version string: {0}")]
    Remote(#[from] DownloadError),
}

/// Error raised when the downloaded executable cannot be made runnable.
#[derive(Debug, Error)]
#[error("Error while setting permissions for {}: {source}", path.display())]
pub struct PermissionError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Fatal outcomes of an install/update pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("Installation incomplete, {} file(s) failed to download", failed.len())]
    Incomplete { failed: Vec<PathBuf> },

    #[error("Cannot download htmc artifacts: {0}")]
    Download(#[from] DownloadError),
}

/// Errors forwarding one request through the CGI bridge.
#[derive(Debug, Error)]
pub enum CgiError {
    #[error("Failed to spawn {}: {source}", exec.display())]
    Spawn {
        exec: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CGI pipe error: {0}")]
    Pipe(#[from] std::io::Error),

    #[error("CGI process timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed CGI response: {0}")]
    Malformed(String),
}

impl CgiError {
    /// HTTP status the forwarder answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            CgiError::Spawn { .. } | CgiError::Pipe(_) => 500,
            CgiError::Malformed(_) => 502,
            CgiError::Timeout(_) => 504,
        }
    }
}

/// Result type alias for htmc-ws operations.
pub type WsResult<T> = Result<T, WsError>;
