//! Concurrent download and upload tests
//!
//! [`TransferDriver`] keeps up to `concurrency` transfer streams running
//! against one server for the test duration. Streams are launched 200 ms
//! apart and the duration only starts counting once the ramp-up is over, so
//! every stream runs for the full duration. Each finished stream is replaced
//! in the same slot, and on the deadline every in-flight stream is cancelled
//! through a shared [`CancellationToken`]. All streams feed one
//! [`RateCounter`], whose clock covers the ramp-up too.

pub mod http;

use crate::counter::{RandomSource, RateCounter};
use crate::error::Result;
use crate::logging::Logger;
use crate::models::{Server, TransferOutcome};
use crate::output::{NoopProgress, ProgressSink};
use crate::types::{RateDisplay, UnitBase};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use http::{HttpDownload, HttpUpload};

/// Delay between successive stream launches during ramp-up
pub const RAMP_STAGGER: Duration = Duration::from_millis(200);

/// Interval of progress updates
pub const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Consecutive failures after which a stream slot is retired
pub const MAX_STREAM_FAILURES: u32 = 3;

/// One complete request/response transfer.
///
/// Implementations route every transferred byte through `counter` and
/// return `Ok(())` when `cancel` fires.
#[async_trait]
pub trait Transfer: Send + Sync + 'static {
    async fn run(&self, counter: Arc<RateCounter>, cancel: CancellationToken) -> Result<()>;
}

/// Parameters shared by download and upload runs
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub concurrency: usize,
    pub duration: Duration,
    pub unit: UnitBase,
    pub display: RateDisplay,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: crate::defaults::CONCURRENCY,
            duration: Duration::from_secs(crate::defaults::DURATION_SECS),
            unit: UnitBase::Decimal,
            display: RateDisplay::Mbps,
        }
    }
}

struct StreamExit {
    slot: usize,
    outcome: Result<()>,
}

pub struct TransferDriver {
    config: TransferConfig,
    logger: Logger,
    progress: Arc<dyn ProgressSink>,
}

impl TransferDriver {
    pub fn new(config: TransferConfig, logger: Logger) -> Self {
        Self {
            config,
            logger,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Send the running rate to `sink` every [`PROGRESS_TICK`]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Download test: GET the download path with `ckSize=<chunks>`
    pub async fn download(&self, client: &Client, server: &Server, chunks: usize) -> Result<TransferOutcome> {
        let transfer = HttpDownload::new(client.clone(), server, chunks)?;
        let counter = Arc::new(RateCounter::new(self.config.unit));

        self.logger
            .debug("Starting download test")
            .field("url", transfer.url().as_str())
            .field("concurrency", self.config.concurrency)
            .log()
            .await;

        Ok(self.run(Arc::new(transfer), counter).await)
    }

    /// Upload test: POST `payload_size`-byte bodies drawn from one payload.
    ///
    /// Without pre-allocation every body byte comes straight from the OS
    /// random source.
    pub async fn upload(
        &self,
        client: &Client,
        server: &Server,
        preallocate: bool,
        payload_size: usize,
    ) -> Result<TransferOutcome> {
        let transfer = HttpUpload::new(client.clone(), server, payload_size)?;
        let counter = Arc::new(RateCounter::with_cycle_size(self.config.unit, payload_size));

        if preallocate {
            counter.generate_payload(payload_size)?;
        } else {
            self.logger
                .warn("Pre-allocation is disabled, performance might be lower!")
                .log()
                .await;
            counter.bind_source(RandomSource);
        }

        self.logger
            .debug("Starting upload test")
            .field("url", transfer.url().as_str())
            .field("payload_size", payload_size)
            .field("concurrency", self.config.concurrency)
            .log()
            .await;

        Ok(self.run(Arc::new(transfer), counter).await)
    }

    /// Drive `transfer` until the deadline and report the counter's figures
    pub async fn run(&self, transfer: Arc<dyn Transfer>, counter: Arc<RateCounter>) -> TransferOutcome {
        let concurrency = self.config.concurrency;
        let cancel = CancellationToken::new();
        let (done_tx, mut done_rx) = mpsc::channel::<StreamExit>(concurrency.max(1));
        let mut tasks = JoinSet::new();
        let mut failures = vec![0u32; concurrency];
        let mut launched = 0usize;
        // a zero duration ends the run before anything is launched
        let mut ramped = self.config.duration.is_zero();

        let mut ramp = interval(RAMP_STAGGER);
        let mut ticker = interval(PROGRESS_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        counter.start();
        let deadline = sleep(self.config.duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline, if ramped => break,

                Some(exit) = done_rx.recv() => {
                    while tasks.try_join_next().is_some() {}

                    match exit.outcome {
                        Ok(()) => failures[exit.slot] = 0,
                        Err(e) => {
                            failures[exit.slot] += 1;
                            if failures[exit.slot] >= MAX_STREAM_FAILURES {
                                self.logger
                                    .warn("Transfer stream failed repeatedly, retiring it")
                                    .field("slot", exit.slot)
                                    .error_info(&e)
                                    .log()
                                    .await;
                                continue;
                            }
                            self.logger
                                .debug("Transfer stream failed, replacing it")
                                .field("slot", exit.slot)
                                .field("error", e.to_string())
                                .log()
                                .await;
                        }
                    }

                    self.launch(&mut tasks, exit.slot, &transfer, &counter, &cancel, &done_tx);
                }

                _ = ramp.tick(), if !ramped => {
                    if launched < concurrency {
                        self.launch(&mut tasks, launched, &transfer, &counter, &cancel, &done_tx);
                        launched += 1;
                    } else {
                        ramped = true;
                        deadline.as_mut().reset(Instant::now() + self.config.duration);
                    }
                }

                _ = ticker.tick() => {
                    self.progress.update(&self.format_rate(&counter));
                }
            }
        }

        cancel.cancel();
        tasks.shutdown().await;

        let outcome = TransferOutcome {
            mbps: counter.average_rate_mbps(),
            total_bytes: counter.total_bytes(),
        };

        self.logger
            .debug("Transfer test finished")
            .field("streams_launched", launched)
            .transfer(&outcome)
            .log()
            .await;

        outcome
    }

    fn launch(
        &self,
        tasks: &mut JoinSet<()>,
        slot: usize,
        transfer: &Arc<dyn Transfer>,
        counter: &Arc<RateCounter>,
        cancel: &CancellationToken,
        done_tx: &mpsc::Sender<StreamExit>,
    ) {
        let transfer = Arc::clone(transfer);
        let counter = Arc::clone(counter);
        let cancel = cancel.clone();
        let done_tx = done_tx.clone();

        tasks.spawn(async move {
            let outcome = transfer.run(counter, cancel.clone()).await;
            if !cancel.is_cancelled() {
                let _ = done_tx.send(StreamExit { slot, outcome }).await;
            }
        });
    }

    /// Running rate as shown while a test is in progress
    pub fn format_rate(&self, counter: &RateCounter) -> String {
        match self.config.display {
            RateDisplay::Mbps => format!("{:.2} Mbps", counter.average_rate_mbps()),
            RateDisplay::Bytes => counter.humanized_rate(),
        }
    }
}
