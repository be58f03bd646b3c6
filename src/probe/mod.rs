//! Post-connection reachability checks
//!
//! A targets file lists what should be reachable once the chain is up:
//!
//! ```text
//! [http]
//! https://intranet.example.com/health
//!
//! [postgresql]
//! db.example.com:5432
//!
//! [git]
//! git@git.example.com:team/repo.git
//! ```
//!
//! Results are diagnostic only; they never change the chain outcome.

pub mod targets;

pub use targets::{load_targets, parse_targets, Target};

use crate::chain::{PostCheck, PublicIpLookup};
use reqwest::Client;
use rustls::RootCertStore;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to read targets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} timed out")]
    Timeout(String),
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected SSH banner: {0:?}")]
    Banner(String),
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("Empty reply from {0}")]
    EmptyReply(String),
}

/// Outcome for one target
#[derive(Debug)]
pub struct ProbeReport {
    pub target: Target,
    pub result: Result<(), ProbeError>,
}

impl ProbeReport {
    pub fn ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Prober {
    timeout: Duration,
    http: Client,
    tls: TlsConnector,
}

impl Prober {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let http = Client::builder()
            .timeout(timeout * 2)
            .connect_timeout(timeout)
            .user_agent(concat!("vpn-chain/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;

        Ok(Self {
            timeout,
            http,
            tls: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Check every target in order and log each result
    pub async fn run_all(&self, targets: Vec<Target>) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            let result = self.check(&target).await;
            match &result {
                Ok(()) => info!("[{}] {} reachable", target.section(), target),
                Err(e) => warn!("[{}] {} unreachable: {}", target.section(), target, e),
            }
            reports.push(ProbeReport { target, result });
        }

        let ok = reports.iter().filter(|r| r.ok()).count();
        info!("Reachability: {}/{} targets ok", ok, reports.len());
        reports
    }

    pub async fn check(&self, target: &Target) -> Result<(), ProbeError> {
        match target {
            Target::Http(url) => self.check_http(url).await,
            Target::Tcp { host, port } => self.tcp_connect(host, *port).await.map(|_| ()),
            Target::Ssh { host, port, .. } => self.check_ssh(host, *port).await,
        }
    }

    /// TCP, then TLS for https, then a GET; any HTTP response counts
    async fn check_http(&self, url: &Url) -> Result<(), ProbeError> {
        let host = url.host_str().unwrap_or_default();
        let port = url.port_or_known_default().unwrap_or(443);
        let tcp = self.tcp_connect(host, port).await?;

        if url.scheme() == "https" {
            self.tls_handshake(host, tcp).await?;
        }

        let response = self.http.get(url.clone()).send().await?;
        info!("{} -> HTTP {}", url, response.status());
        Ok(())
    }

    async fn check_ssh(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        let mut stream = self.tcp_connect(host, port).await?;
        let mut banner = vec![0u8; 255];
        let read = tokio::time::timeout(self.timeout, stream.read(&mut banner))
            .await
            .map_err(|_| ProbeError::Timeout(format!("SSH banner from {}", host)))?
            .map_err(|source| ProbeError::Connect {
                addr: format!("{}:{}", host, port),
                source,
            })?;

        let banner = String::from_utf8_lossy(&banner[..read]).trim().to_string();
        if !banner.starts_with("SSH-") {
            return Err(ProbeError::Banner(banner));
        }
        info!("{} -> {}", host, banner);
        Ok(())
    }

    async fn tcp_connect(&self, host: &str, port: u16) -> Result<TcpStream, ProbeError> {
        let addr = format!("{}:{}", host, port);
        tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProbeError::Timeout(format!("TCP connect to {}", addr)))?
            .map_err(|source| ProbeError::Connect { addr, source })
    }

    async fn tls_handshake(&self, host: &str, tcp: TcpStream) -> Result<(), ProbeError> {
        let domain = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| ProbeError::Tls(format!("Invalid domain: {}", e)))?;

        tokio::time::timeout(self.timeout, self.tls.connect(domain, tcp))
            .await
            .map_err(|_| ProbeError::Timeout(format!("TLS handshake with {}", host)))?
            .map_err(|e| ProbeError::Tls(e.to_string()))?;
        Ok(())
    }
}

/// Runs the targets file from the blocking chain thread
pub struct ReachabilityCheck {
    targets_file: PathBuf,
    timeout: Duration,
    runtime: tokio::runtime::Handle,
}

impl ReachabilityCheck {
    pub fn new(targets_file: PathBuf, runtime: tokio::runtime::Handle) -> Self {
        Self {
            targets_file,
            timeout: DEFAULT_TIMEOUT,
            runtime,
        }
    }
}

impl PostCheck for ReachabilityCheck {
    fn run(&self) {
        let targets = match load_targets(&self.targets_file) {
            Ok(targets) => targets,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        let prober = match Prober::new(self.timeout) {
            Ok(prober) => prober,
            Err(e) => {
                warn!("Cannot run reachability checks: {}", e);
                return;
            }
        };
        self.runtime.block_on(prober.run_all(targets));
    }
}

/// Public address as reported by a plain-text echo service
pub struct PublicIpService {
    url: Url,
    http: Client,
    runtime: tokio::runtime::Handle,
}

impl PublicIpService {
    pub fn new(
        url: &str,
        timeout: Duration,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self, ProbeError> {
        let url = Url::parse(url).map_err(|e| ProbeError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vpn-chain/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;

        Ok(Self { url, http, runtime })
    }

    pub async fn fetch(&self) -> Result<String, ProbeError> {
        let body = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let ip = body.trim();
        if ip.is_empty() {
            return Err(ProbeError::EmptyReply(self.url.to_string()));
        }
        Ok(ip.to_string())
    }
}

impl PublicIpLookup for PublicIpService {
    fn public_ip(&self) -> Option<String> {
        match self.runtime.block_on(self.fetch()) {
            Ok(ip) => Some(ip),
            Err(e) => {
                debug!("Public IP lookup failed: {}", e);
                None
            }
        }
    }
}
