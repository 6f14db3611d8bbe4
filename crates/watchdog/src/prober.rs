//! Liveness probing over HTTP(S) and raw TCP.

use crate::types::ProbeStatus;
use async_trait::async_trait;
use common::{Error, Result};
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Ports on which a plain `http` target is probed with a GET instead
/// of a raw connect. Everything else falls through to the TCP path, so
/// the same row format can monitor databases and arbitrary ports.
pub const DEFAULT_HTTP_PORTS: [u16; 4] = [80, 443, 8080, 8443];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for the HTTP GET path.
    pub http_timeout: Duration,

    /// Timeout raced against the raw TCP connect.
    pub tcp_timeout: Duration,

    /// Recognized HTTP ports for plain `http` targets.
    pub http_ports: Vec<u16>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            tcp_timeout: Duration::from_secs(15),
            http_ports: DEFAULT_HTTP_PORTS.to_vec(),
        }
    }
}

/// Liveness prober trait.
///
/// Infallible by contract: every failure mode maps to a status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe a target endpoint and return its normalized status.
    async fn probe(&self, target: &str) -> ProbeStatus;
}

/// HTTP(S)/TCP liveness prober.
pub struct LivenessProber {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl LivenessProber {
    /// Create a new prober.
    pub fn new(config: ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::config)?;

        Ok(Self { client, config })
    }

    async fn check_http(&self, url: Url) -> ProbeStatus {
        match self.client.get(url.clone()).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                // Drop the response without reading the body; buffering
                // large or streaming bodies is never needed here.
                drop(response);
                if code == 200 {
                    debug!(url = %url, "HTTP probe successful");
                    ProbeStatus::Ok
                } else {
                    warn!(url = %url, status = code, "HTTP probe returned non-200");
                    ProbeStatus::HttpStatus(code)
                }
            }
            Err(e) if e.is_timeout() => {
                warn!(url = %url, "HTTP probe timed out");
                ProbeStatus::HttpTimeout
            }
            Err(e) => {
                warn!(url = %url, error = %e, "HTTP probe failed");
                ProbeStatus::Unreachable
            }
        }
    }

    async fn check_tcp(&self, host: &str, port: u16) -> ProbeStatus {
        match timeout(self.config.tcp_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                debug!(host, port, "TCP probe successful");
                // Dropping the stream closes the socket; close errors
                // are irrelevant to the verdict.
                drop(stream);
                ProbeStatus::Ok
            }
            Ok(Err(e)) => {
                warn!(host, port, error = %e, "TCP probe failed");
                ProbeStatus::TcpPortUnreachable
            }
            Err(_) => {
                warn!(host, port, "TCP probe timed out");
                ProbeStatus::TcpTimeout
            }
        }
    }
}

#[async_trait]
impl Prober for LivenessProber {
    async fn probe(&self, target: &str) -> ProbeStatus {
        let target = target.trim();
        if target.is_empty() {
            return ProbeStatus::InvalidUrl;
        }

        if target.contains("://") {
            let url = match Url::parse(target) {
                Ok(url) => url,
                Err(_) => return ProbeStatus::InvalidUrlFormat,
            };
            let scheme = url.scheme().to_string();
            // Default ports exist only for http(s); any other scheme
            // must name its port explicitly to get a TCP probe.
            let port = match url.port() {
                Some(port) => port,
                None => match scheme.as_str() {
                    "https" => 443,
                    "http" => 80,
                    _ => return ProbeStatus::InvalidUrlFormat,
                },
            };

            if scheme == "https" || (scheme == "http" && self.config.http_ports.contains(&port)) {
                self.check_http(url).await
            } else {
                match url.host_str() {
                    Some(host) => self.check_tcp(host, port).await,
                    None => ProbeStatus::InvalidUrlFormat,
                }
            }
        } else {
            // Bare host[:port] form, evaluated over raw TCP.
            match parse_bare_target(target) {
                Some((host, port)) => self.check_tcp(&host, port).await,
                None => ProbeStatus::InvalidUrlFormat,
            }
        }
    }
}

/// Split a bare `host[:port]` target; port defaults to 80.
fn parse_bare_target(target: &str) -> Option<(String, u16)> {
    if target.chars().any(char::is_whitespace) || target.contains('/') {
        return None;
    }
    match target.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return None;
            }
            port.parse::<u16>().ok().map(|p| (host.to_string(), p))
        }
        None => Some((target.to_string(), 80)),
    }
}
