//! This client fetches a student's timetable from Campus Dual.

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Certificate, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::RawScheduleRecord;

pub const URL: &str = "https://selfservice.campus-dual.de/room/json";
pub const WINDOW_START: i64 = 1719180000;
pub const WINDOW_END: i64 = 1719784800;
/// Looked up relative to the working directory.
pub const CERT_CHAIN: &str = "campusdual-cert-chain.pem";
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, TLS, connection or timeout failure.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("upstream rejected the request with status {0}")]
    UpstreamRejected(StatusCode),
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// The request URL carries the hash, so it is dropped from the message.
    fn unreachable(err: reqwest::Error) -> Self {
        FetchError::Unreachable(err.without_url().to_string())
    }
}

/// Anything that can answer "which classes does this user have?".
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Vec<RawScheduleRecord>, FetchError>;
}

/// The period asked for, in seconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: i64,
    pub end: i64,
}

impl Default for FetchWindow {
    fn default() -> Self {
        Self {
            start: WINDOW_START,
            end: WINDOW_END,
        }
    }
}

/// The certificates an upstream server has to present a chain to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustAnchors {
    /// Only the certificates in this PEM file, the built-in roots are disabled.
    Pinned(PathBuf),
    /// The built-in webpki roots.
    SystemRoots,
}

impl Default for TrustAnchors {
    fn default() -> Self {
        TrustAnchors::Pinned(PathBuf::from(CERT_CHAIN))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub trust: TrustAnchors,
    pub timeout: Duration,
    pub window: FetchWindow,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: URL.to_string(),
            trust: TrustAnchors::default(),
            timeout: TIMEOUT,
            window: FetchWindow::default(),
        }
    }
}

pub struct CampusClient {
    http: reqwest::Client,
    url: String,
    window: FetchWindow,
    pinned: bool,
}

impl CampusClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        match &config.trust {
            TrustAnchors::Pinned(path) => {
                let pem = fs::read(path)
                    .with_context(|| format!("reading certificate chain {}", path.display()))?;
                let certificate = Certificate::from_pem(&pem)
                    .with_context(|| format!("parsing certificate chain {}", path.display()))?;
                builder = builder
                    .tls_built_in_root_certs(false)
                    .add_root_certificate(certificate);
            }
            TrustAnchors::SystemRoots => {
                warn!(url = %config.url, "certificate pinning is disabled for the upstream");
            }
        }
        let http = builder.build().context("building the HTTP client")?;
        Ok(Self {
            http,
            url: config.url.clone(),
            window: config.window,
            pinned: matches!(config.trust, TrustAnchors::Pinned(_)),
        })
    }

    /// Whether the built-in roots are replaced by a pinned chain.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

#[async_trait]
impl ScheduleSource for CampusClient {
    async fn fetch(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<Vec<RawScheduleRecord>, FetchError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("userid", identifier), ("hash", secret)])
            .query(&[("start", self.window.start), ("end", self.window.end)])
            .send()
            .await
            .map_err(FetchError::unreachable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamRejected(status));
        }
        let body = response.text().await.map_err(FetchError::unreachable)?;
        let records = parse(&body)?;
        debug!(identifier, records = records.len(), "fetched schedule");
        Ok(records)
    }
}

/// Parse the `room/json` body.
fn parse(body: &str) -> Result<Vec<RawScheduleRecord>, FetchError> {
    serde_json::from_str(body).map_err(|err| FetchError::MalformedResponse(err.to_string()))
}
