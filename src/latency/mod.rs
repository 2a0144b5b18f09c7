//! Round-trip latency and jitter measurement
//!
//! Two probe methods are available per server:
//! - `Icmp`: echo requests through the system ping utility
//! - `Http`: timed GET requests to the server's ping path
//!
//! A server starts with ICMP. The first ICMP failure of any kind (spawn
//! error, timeout, no replies) marks the server `no_icmp`, and every later
//! probe for that server goes straight to HTTP.

pub mod icmp;
pub mod jitter;

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{LatencyOutcome, Server};
use crate::types::IpFamily;
use reqwest::Client;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

pub use icmp::{EchoProbe, SystemPing};

/// Extra HTTP samples taken when falling back, covering the discarded warm-up
pub const HTTP_EXTRA_SAMPLES: usize = 2;

/// Probe method chosen for one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Icmp,
    Http,
}

impl ProbeMethod {
    pub fn for_server(server: &Server) -> Self {
        if server.no_icmp {
            ProbeMethod::Http
        } else {
            ProbeMethod::Icmp
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProbeMethod::Icmp => "ICMP",
            ProbeMethod::Http => "HTTP",
        }
    }
}

/// Addressing options for the ICMP method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeOptions {
    pub source: Option<IpAddr>,
    pub family: IpFamily,
}

/// Measures latency against one server at a time
#[derive(Clone)]
pub struct LatencyProbe {
    client: Client,
    echo: Arc<dyn EchoProbe>,
    options: ProbeOptions,
    logger: Logger,
}

impl LatencyProbe {
    pub fn new(client: Client, options: ProbeOptions, logger: Logger) -> Self {
        Self {
            client,
            echo: Arc::new(SystemPing),
            options,
            logger,
        }
    }

    /// Replace the ICMP implementation
    pub fn with_echo(mut self, echo: Arc<dyn EchoProbe>) -> Self {
        self.echo = echo;
        self
    }

    /// ICMP first, HTTP with `count + 2` samples once ICMP is unavailable
    pub async fn icmp_ping_and_jitter(&self, server: &mut Server, count: usize) -> Result<LatencyOutcome> {
        let started = Instant::now();
        let method = ProbeMethod::for_server(server);

        let result = match method {
            ProbeMethod::Http => {
                server.tlog.verbose("Skipping ICMP, using HTTP ping");
                self.logger
                    .debug("Skipping ICMP, using HTTP ping")
                    .field("server", &server.name)
                    .log()
                    .await;
                self.http_ping_and_jitter(server, count + HTTP_EXTRA_SAMPLES).await
            }
            ProbeMethod::Icmp => match self.icmp_samples(server, count).await {
                Ok(samples) => Ok(jitter::reduce(&samples)),
                Err(e) => {
                    server.no_icmp = true;
                    server.tlog.warn(format!("ICMP ping failed, using HTTP ping: {}", e));
                    self.logger
                        .debug("ICMP ping failed, will try HTTP ping")
                        .field("server", &server.name)
                        .field("reason", e.to_string())
                        .log()
                        .await;
                    self.http_ping_and_jitter(server, count + HTTP_EXTRA_SAMPLES).await
                }
            },
        };

        server.tlog.log(format!("{} ping took {:?}", method.name(), started.elapsed()));
        result
    }

    async fn icmp_samples(&self, server: &Server, count: usize) -> Result<Vec<f64>> {
        let host = server
            .base_url()?
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| AppError::parse(format!("Server URL '{}' has no host", server.server)))?;

        let samples = self.echo.echo(&host, count, &self.options).await?;
        if samples.is_empty() {
            return Err(AppError::network(format!("No ICMP replies from {}", host)));
        }
        Ok(samples)
    }

    /// Sequential timed GETs to the ping path; the first sample is discarded
    /// when more than one was taken.
    pub async fn http_ping_and_jitter(&self, server: &Server, count: usize) -> Result<LatencyOutcome> {
        let url = server
            .ping_endpoint()
            .map_err(|e| AppError::unreachable(format!("{}: {}", server.name, e)))?;

        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let started = Instant::now();
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| AppError::unreachable(format!("HTTP ping to {} failed: {}", url, e)))?;
            response
                .bytes()
                .await
                .map_err(|e| AppError::unreachable(format!("HTTP ping to {} failed: {}", url, e)))?;
            samples.push(started.elapsed().as_secs_f64() * 1000.0);
        }

        if samples.len() > 1 {
            samples.remove(0);
        }

        let outcome = jitter::reduce(&samples);
        self.logger
            .debug("HTTP ping finished")
            .field("server", &server.name)
            .field("samples", samples.len())
            .latency(&outcome)
            .log()
            .await;
        Ok(outcome)
    }
}
