//! HTTP transport shared by probes, transfers and list retrieval

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{IpInfo, Server};
use crate::types::IpFamily;
use reqwest::{Client, StatusCode};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use url::Url;

/// Settings applied to every request the tool makes
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub source: Option<IpAddr>,
    pub family: IpFamily,
    pub skip_cert_verify: bool,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::defaults::TIMEOUT_SECS),
            source: None,
            family: IpFamily::Any,
            skip_cert_verify: false,
            user_agent: crate::defaults::user_agent(),
        }
    }
}

impl TransportOptions {
    /// Local address outgoing connections bind to.
    ///
    /// An explicit source wins; otherwise a forced family binds the
    /// unspecified address of that family.
    pub fn local_address(&self) -> Option<IpAddr> {
        self.source.or_else(|| self.family.unspecified_local())
    }
}

/// HTTP client factory for the tool's transport settings
pub struct ClientFactory;

impl ClientFactory {
    pub fn build(options: &TransportOptions) -> Result<Client> {
        if let Some(source) = options.source {
            if !options.family.accepts(&source) {
                return Err(AppError::validation(format!(
                    "Source address {} does not match the forced IP family",
                    source
                )));
            }
        }

        Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .local_address(options.local_address())
            .danger_accept_invalid_certs(options.skip_cert_verify)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Server-facing requests outside the measurement loops
#[derive(Clone)]
pub struct SpeedtestClient {
    client: Client,
    logger: Logger,
}

impl SpeedtestClient {
    pub fn new(client: Client, logger: Logger) -> Self {
        Self { client, logger }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// A server is up when its ping path answers 200.
    ///
    /// Transport errors and malformed URLs count as down.
    pub async fn is_up(&self, server: &mut Server) -> bool {
        let started = Instant::now();
        let up = self.check_up(server).await;
        server.tlog.log(format!("Check backend is up took {:?}", started.elapsed()));
        up
    }

    async fn check_up(&self, server: &Server) -> bool {
        let url = match server.ping_endpoint() {
            Ok(url) => url,
            Err(e) => {
                self.logger.debug("Invalid ping URL").field("error", e.to_string()).log().await;
                return false;
            }
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.logger
                    .debug("Error checking for server status")
                    .field("server", &server.name)
                    .field("error", e.to_string())
                    .log()
                    .await;
                return false;
            }
        };

        let status = response.status();
        if let Ok(body) = response.bytes().await {
            if !body.is_empty() {
                self.logger
                    .debug("Ping path returned a non-empty body")
                    .field("server", &server.name)
                    .field("bytes", body.len())
                    .log()
                    .await;
            }
        }

        status == StatusCode::OK
    }

    /// Query the IP-info path. A body that is not JSON becomes the
    /// processed string as-is.
    pub async fn ip_info(&self, server: &mut Server, distance: &str) -> Result<IpInfo> {
        let started = Instant::now();
        let mut url = server.ip_info_endpoint()?;
        url.query_pairs_mut()
            .append_pair("isp", "true")
            .append_pair("distance", distance);

        let result = self.fetch_ip_info(url).await;
        server.tlog.log(format!("Get IP info took {:?}", started.elapsed()));
        result
    }

    async fn fetch_ip_info(&self, url: Url) -> Result<IpInfo> {
        let body = self.client.get(url).send().await?.text().await?;
        if body.is_empty() {
            return Ok(IpInfo::default());
        }

        match serde_json::from_str::<IpInfo>(&body) {
            Ok(info) => Ok(info),
            Err(e) => {
                self.logger
                    .debug("Failed when parsing get IP result")
                    .field("error", e.to_string())
                    .field("payload", &body)
                    .log()
                    .await;
                Ok(IpInfo {
                    processed_string: body,
                    ..Default::default()
                })
            }
        }
    }
}

/// Utility functions for HTTP operations
pub struct HttpUtils;

impl HttpUtils {
    /// Validate an http(s) URL with a host
    pub fn validate_url(url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| AppError::validation(format!("Invalid URL '{}': {}", url, e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(AppError::validation(format!("Unsupported URL scheme: {}", scheme))),
        }

        if parsed.host().is_none() {
            return Err(AppError::validation("URL must have a host"));
        }

        Ok(())
    }
}
