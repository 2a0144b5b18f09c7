//! Concurrent selection of the lowest-latency server
//!
//! A pool of at most [`MAX_PROBE_WORKERS`] tasks drains a job queue holding
//! every candidate. Each worker skips malformed URLs, checks that the server
//! is up and takes a single latency sample. Only successful probes produce a
//! result; the collector waits on a completion counter so that skipped
//! servers are accounted for too.

use crate::client::SpeedtestClient;
use crate::error::{AppError, Result};
use crate::latency::LatencyProbe;
use crate::logging::Logger;
use crate::models::Server;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinSet;

/// Upper bound of concurrent probe workers
pub const MAX_PROBE_WORKERS: usize = 10;

/// Reachability and latency checks used while selecting
#[async_trait]
pub trait EndpointProber: Send + Sync + 'static {
    async fn is_up(&self, server: &mut Server) -> bool;
    async fn ping(&self, server: &mut Server) -> Result<f64>;
}

/// Prober backed by the HTTP transport and a one-sample latency probe
pub struct HttpProber {
    client: SpeedtestClient,
    probe: LatencyProbe,
    no_icmp: bool,
}

impl HttpProber {
    pub fn new(client: SpeedtestClient, probe: LatencyProbe, no_icmp: bool) -> Self {
        Self { client, probe, no_icmp }
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    async fn is_up(&self, server: &mut Server) -> bool {
        self.client.is_up(server).await
    }

    async fn ping(&self, server: &mut Server) -> Result<f64> {
        server.no_icmp = self.no_icmp;
        let outcome = self.probe.icmp_ping_and_jitter(server, 1).await?;
        Ok(outcome.avg_ms)
    }
}

#[derive(Debug, Clone)]
pub struct ProbeJob {
    pub index: usize,
    pub server: Server,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub index: usize,
    pub ping_ms: f64,
}

/// Outcome of a selection run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    /// Chosen index; 0 when no server reported a positive latency
    pub index: usize,
    /// Latency of the chosen server, if it was measured
    pub ping_ms: Option<f64>,
    /// Number of servers that answered
    pub responsive: usize,
}

impl Selection {
    pub fn has_signal(&self) -> bool {
        self.responsive > 0
    }
}

pub struct EndpointSelector<P: EndpointProber> {
    prober: Arc<P>,
    workers: usize,
    logger: Logger,
}

impl<P: EndpointProber> EndpointSelector<P> {
    pub fn new(prober: P, logger: Logger) -> Self {
        Self {
            prober: Arc::new(prober),
            workers: MAX_PROBE_WORKERS,
            logger,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Probe every server and pick the lowest strictly positive latency
    pub async fn select_fastest(&self, servers: &[Server]) -> Result<Selection> {
        let total = servers.len();
        if total == 0 {
            return Err(AppError::validation("No servers to select from"));
        }

        let (job_tx, job_rx) = mpsc::channel::<ProbeJob>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<ProbeResult>(total);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let completed = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Notify::new());

        let mut workers = JoinSet::new();
        for _ in 0..self.workers.min(total) {
            let prober = Arc::clone(&self.prober);
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let completed = Arc::clone(&completed);
            let done = Arc::clone(&done);
            let logger = self.logger.clone();

            workers.spawn(async move {
                loop {
                    let job = { jobs.lock().await.recv().await };
                    let Some(job) = job else { break };

                    if let Some(result) = probe_one(prober.as_ref(), job, &logger).await {
                        let _ = results.send(result).await;
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                    done.notify_one();
                }
            });
        }
        drop(result_tx);

        for (index, server) in servers.iter().enumerate() {
            job_tx
                .send(ProbeJob { index, server: server.clone() })
                .await
                .map_err(|_| AppError::internal("Probe workers stopped early"))?;
        }
        drop(job_tx);

        while completed.load(Ordering::SeqCst) < total {
            done.notified().await;
        }
        while workers.join_next().await.is_some() {}

        let mut results = Vec::with_capacity(total);
        while let Ok(result) = result_rx.try_recv() {
            results.push(result);
        }

        let selection = pick_fastest(&results);
        self.logger
            .debug("Server selection finished")
            .field("candidates", total)
            .field("responsive", selection.responsive)
            .field("index", selection.index)
            .log()
            .await;
        Ok(selection)
    }
}

async fn probe_one<P: EndpointProber + ?Sized>(prober: &P, job: ProbeJob, logger: &Logger) -> Option<ProbeResult> {
    let ProbeJob { index, mut server } = job;

    if server.base_url().is_err() {
        logger
            .debug("Server URL is invalid, skipping")
            .field("server", &server.name)
            .field("url", &server.server)
            .log()
            .await;
        return None;
    }

    if !prober.is_up(&mut server).await {
        logger
            .debug("Server doesn't seem to be up, skipping")
            .field("server", &server.name)
            .log()
            .await;
        return None;
    }

    match prober.ping(&mut server).await {
        Ok(ping_ms) => Some(ProbeResult { index, ping_ms }),
        Err(e) => {
            logger
                .debug("Can't ping server, skipping")
                .field("server", &server.name)
                .field("error", e.to_string())
                .log()
                .await;
            None
        }
    }
}

/// Lowest strictly positive latency, lower index on ties; index 0 otherwise
pub fn pick_fastest(results: &[ProbeResult]) -> Selection {
    let best = results
        .iter()
        .filter(|r| r.ping_ms > 0.0)
        .min_by(|a, b| a.ping_ms.total_cmp(&b.ping_ms).then(a.index.cmp(&b.index)));

    Selection {
        index: best.map(|r| r.index).unwrap_or(0),
        ping_ms: best.map(|r| r.ping_ms),
        responsive: results.len(),
    }
}
