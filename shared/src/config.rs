/// Runtime configuration, built once at startup and passed down.
///
/// Values come from the environment (a `.env` file is honored), falling back
/// to the stock paths, release URLs and loopback listener.
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::layout::Layout;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_BASE_URL: &str = "https://alessandro-salerno.github.io/htmc";
pub const DEFAULT_VERSION_URL: &str =
    "https://raw.githubusercontent.com/Alessandro-Salerno/htmc/refs/heads/latest-linux-bundle/.htmc-version";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CGI_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub layout: Layout,
    pub remote: RemoteConfig,
    pub server: ServerConfig,
    pub assume_yes: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Artifacts live at `<base_url>/bin/...`, `<base_url>/include/...`.
    pub base_url: String,
    pub version_url: String,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cgi_timeout: Duration,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Defaults rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::new(root),
            remote: RemoteConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                version_url: DEFAULT_VERSION_URL.to_string(),
                http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            },
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                cgi_timeout: Duration::from_secs(DEFAULT_CGI_TIMEOUT_SECS),
            },
            assume_yes: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup("HTMC_WS_ROOT").unwrap_or_else(|| ".".to_string());
        let mut config = Self::for_root(root);

        if let Some(host) = lookup("HTMC_WS_HOST") {
            if host.trim().is_empty() || host.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid {
                    var: "HTMC_WS_HOST",
                    value: host,
                    expected: "a host name or address",
                });
            }
            config.server.host = host;
        }
        if let Some(port) = lookup("HTMC_WS_PORT") {
            config.server.port = parse_var("HTMC_WS_PORT", &port, "a port number")?;
        }
        if let Some(secs) = lookup("HTMC_WS_CGI_TIMEOUT_SECS") {
            config.server.cgi_timeout =
                Duration::from_secs(parse_var("HTMC_WS_CGI_TIMEOUT_SECS", &secs, "whole seconds")?);
        }
        if let Some(base) = lookup("HTMC_WS_BASE_URL") {
            config.remote.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("HTMC_WS_VERSION_URL") {
            config.remote.version_url = url;
        }
        if let Some(secs) = lookup("HTMC_WS_HTTP_TIMEOUT_SECS") {
            config.remote.http_timeout =
                Duration::from_secs(parse_var("HTMC_WS_HTTP_TIMEOUT_SECS", &secs, "whole seconds")?);
        }
        if let Some(flag) = lookup("HTMC_WS_ASSUME_YES") {
            config.assume_yes = parse_flag("HTMC_WS_ASSUME_YES", &flag)?;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
        expected,
    })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}
