/// CGI/1.1 bridge to the htmc executable.
///
/// Each request spawns `htmc -ll off -ns` from the server root with the
/// request translated into CGI environment variables and the body on stdin.
/// Whatever htmc writes to stdout is parsed as CGI headers plus a body.
/// Stderr is forwarded to tracing logs.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use htmc_ws_shared::config::ServerConfig;
use htmc_ws_shared::errors::CgiError;
use htmc_ws_shared::layout::Layout;

/// Log level off, no splash: htmc answers as a plain CGI script.
pub const HTMC_CGI_ARGS: [&str; 3] = ["-ll", "off", "-ns"];

#[cfg(target_os = "windows")]
const INHERITED_ENV: &[&str] = &["PATH", "SystemRoot", "COMSPEC", "PATHEXT", "WINDIR"];
#[cfg(target_os = "macos")]
const INHERITED_ENV: &[&str] = &["PATH", "DYLD_LIBRARY_PATH"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const INHERITED_ENV: &[&str] = &["PATH", "LD_LIBRARY_PATH"];

/// One HTTP request, reduced to what CGI needs.
#[derive(Debug, Clone, Default)]
pub struct CgiRequest {
    pub method: String,
    /// Percent-decoded request path.
    pub path: String,
    pub query: String,
    /// Raw request target, path and query as received.
    pub uri: String,
    pub protocol: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
}

impl CgiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed CGI script output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Turns a request into a response. The server holds one of these.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: CgiRequest) -> Result<CgiResponse, CgiError>;
}

/// Runs htmc once per request.
#[derive(Debug, Clone)]
pub struct HtmcCgi {
    exec: PathBuf,
    workdir: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    server_name: String,
    server_port: u16,
}

impl HtmcCgi {
    pub fn new(layout: &Layout, server: &ServerConfig) -> Self {
        Self {
            exec: layout.exec_path(),
            workdir: layout.root().to_path_buf(),
            args: HTMC_CGI_ARGS.iter().map(|a| a.to_string()).collect(),
            timeout: server.cgi_timeout,
            server_name: server.host.clone(),
            server_port: server.port,
        }
    }

    /// Build the CGI/1.1 meta-variables for `request`.
    pub fn cgi_env(&self, request: &CgiRequest) -> Vec<(String, String)> {
        let server_name = request
            .header("host")
            .map(|h| strip_port(h).to_string())
            .unwrap_or_else(|| self.server_name.clone());

        let mut env = vec![
            ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
            ("SERVER_SOFTWARE".to_string(), format!("htmc-ws/{}", env!("CARGO_PKG_VERSION"))),
            ("SERVER_NAME".to_string(), server_name),
            ("SERVER_PORT".to_string(), self.server_port.to_string()),
            ("SERVER_PROTOCOL".to_string(), request.protocol.clone()),
            ("REQUEST_METHOD".to_string(), request.method.clone()),
            ("SCRIPT_NAME".to_string(), String::new()),
            ("PATH_INFO".to_string(), request.path.clone()),
            ("QUERY_STRING".to_string(), request.query.clone()),
            ("REQUEST_URI".to_string(), request.uri.clone()),
        ];

        if let Some(addr) = request.remote_addr {
            env.push(("REMOTE_ADDR".to_string(), addr.ip().to_string()));
            env.push(("REMOTE_HOST".to_string(), addr.ip().to_string()));
            env.push(("REMOTE_PORT".to_string(), addr.port().to_string()));
        }

        let content_length = request
            .header("content-length")
            .map(str::to_string)
            .or_else(|| (!request.body.is_empty()).then(|| request.body.len().to_string()));
        if let Some(length) = content_length {
            env.push(("CONTENT_LENGTH".to_string(), length));
        }
        if let Some(content_type) = request.header("content-type") {
            env.push(("CONTENT_TYPE".to_string(), content_type.to_string()));
        }

        let mut http_vars: Vec<(String, String)> = Vec::new();
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            let var = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            match http_vars.iter_mut().find(|(k, _)| *k == var) {
                Some((_, joined)) => {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                None => http_vars.push((var, value.clone())),
            }
        }
        env.extend(http_vars);
        env
    }
}

#[async_trait]
impl RequestExecutor for HtmcCgi {
    async fn execute(&self, request: CgiRequest) -> Result<CgiResponse, CgiError> {
        let inherited = INHERITED_ENV
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)));

        let mut child = Command::new(&self.exec)
            .args(&self.args)
            .current_dir(&self.workdir)
            .env_clear()
            .envs(inherited)
            .envs(self.cgi_env(&request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CgiError::Spawn {
                exec: self.exec.clone(),
                source,
            })?;

        debug!("Spawned htmc (pid: {:?}) for {} {}", child.id(), request.method, request.uri);

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "no stdout handle"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "htmc", "{}", line);
                }
            });
        }

        let exchange = async {
            let (written, output) = tokio::join!(feed_stdin(stdin, &request.body), read_all(stdout));
            if let Err(e) = written {
                // htmc is free to ignore the body
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e);
                }
            }
            let output = output?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((output, status))
        };

        let (output, status) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "htmc did not answer {} {} within {}s, killing it",
                    request.method,
                    request.uri,
                    self.timeout.as_secs()
                );
                return Err(CgiError::Timeout(self.timeout.as_secs()));
            }
        };

        if !status.success() {
            warn!("htmc exited with {} for {} {}", status, request.method, request.uri);
        }

        parse_cgi_output(&output)
    }
}

async fn feed_stdin(stdin: Option<ChildStdin>, body: &[u8]) -> std::io::Result<()> {
    if let Some(mut stdin) = stdin {
        if !body.is_empty() {
            stdin.write_all(body).await?;
        }
        stdin.shutdown().await?;
    }
    Ok(())
}

async fn read_all(mut stdout: ChildStdout) -> std::io::Result<Vec<u8>> {
    let mut output = Vec::new();
    stdout.read_to_end(&mut output).await?;
    Ok(output)
}

/// Split CGI output into status, headers, and body.
///
/// Header lines end in `\n` or `\r\n`; the first empty line ends the header
/// block. A `Status` header sets the code, otherwise a lone `Location`
/// means 302 and anything else 200.
pub fn parse_cgi_output(output: &[u8]) -> Result<CgiResponse, CgiError> {
    if output.is_empty() {
        return Err(CgiError::Malformed("no output".into()));
    }

    let mut headers = Vec::new();
    let mut status: Option<u16> = None;
    let mut pos = 0;

    loop {
        let Some(nl) = output[pos..].iter().position(|&b| b == b'\n') else {
            return Err(CgiError::Malformed("missing blank line after headers".into()));
        };
        let raw = &output[pos..pos + nl];
        pos += nl + 1;
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if line.is_empty() {
            break;
        }

        let line = std::str::from_utf8(line)
            .map_err(|_| CgiError::Malformed("header line is not UTF-8".into()))?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CgiError::Malformed(format!("bogus header line: {}", line)))?;
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return Err(CgiError::Malformed(format!("bogus header line: {}", line)));
        }

        if name.eq_ignore_ascii_case("status") {
            status = Some(parse_status(value)?);
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    if headers.is_empty() && status.is_none() {
        return Err(CgiError::Malformed("no headers".into()));
    }

    let status = status.unwrap_or_else(|| {
        if headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("location")) {
            302
        } else {
            200
        }
    });

    Ok(CgiResponse {
        status,
        headers,
        body: output[pos..].to_vec(),
    })
}

fn parse_status(value: &str) -> Result<u16, CgiError> {
    let code = value.split_whitespace().next().unwrap_or("");
    match code.parse::<u16>() {
        Ok(code) if (100..=999).contains(&code) => Ok(code),
        _ => Err(CgiError::Malformed(format!("invalid Status {:?}", value))),
    }
}

fn strip_port(host: &str) -> &str {
    // [::1]:8080 keeps its brackets
    if let Some(end) = host.strip_prefix('[').and_then(|h| h.find(']')) {
        return &host[..end + 2];
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
