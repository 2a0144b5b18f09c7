//! Main application orchestration and execution

use crate::{
    cli::Cli,
    client::{ClientFactory, SpeedtestClient},
    config::{display_config_summary, load_config, validate_config, EnvManager},
    error::{AppError, Result},
    latency::LatencyProbe,
    logging::{Logger, LoggerFactory},
    models::{Config, IpInfo, LatencyOutcome, Server, SpeedTestResult, TransferOutcome},
    output::{format_mbps, simple_summary, ConsoleProgress, CsvReport, ReportFormatterFactory},
    selector::{EndpointSelector, HttpProber},
    servers::{fetch_server_list, format_list, load_local},
    telemetry::{send_telemetry, TelemetryExtra, TelemetryReport},
    transfer::TransferDriver,
    types::OutputMode,
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Result<Self> {
        Ok(Self { cli })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        let config = load_config(self.cli)?;
        let warnings = validate_config(&config)?;

        if config.debug {
            eprintln!("{} v{} ({}, built {})", crate::PKG_NAME, crate::VERSION, crate::GIT_COMMIT, crate::BUILD_TIME);
            eprintln!("\nConfiguration Summary:");
            eprintln!("{}\n", display_config_summary(&config));

            for warning in EnvManager::validate_current_env() {
                eprintln!("{}", warning);
            }
            if let Some(warnings) = EnvManager::check_env_file(Path::new(".env"))? {
                for warning in warnings {
                    eprintln!(".env: {}", warning);
                }
            }
        }

        if !warnings.is_empty() && !config.output.is_silent() {
            for warning in &warnings {
                eprintln!("{}", warning.format(config.enable_color));
            }
        }

        TestOrchestrator::new(config).await?.execute().await
    }
}

/// Component loggers of one run
#[derive(Clone)]
struct Loggers {
    app: Logger,
    ping: Logger,
    xfer: Logger,
    select: Logger,
}

/// Per-server outcomes of one run
#[derive(Debug, Default)]
pub struct RunTally {
    results: Vec<SpeedTestResult>,
    failed: usize,
}

impl RunTally {
    pub fn with_capacity(servers: usize) -> Self {
        Self {
            results: Vec::with_capacity(servers),
            failed: 0,
        }
    }

    /// Keep a result or count a failure; fatal errors end the run
    pub fn record(&mut self, outcome: Result<SpeedTestResult>) -> Result<()> {
        match outcome {
            Ok(result) => self.results.push(result),
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => self.failed += 1,
        }
        Ok(())
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Results so far, or `TestExecution` when every attempted test failed
    pub fn finish(self) -> Result<Vec<SpeedTestResult>> {
        if self.results.is_empty() && self.failed > 0 {
            return Err(AppError::test_execution(format!(
                "Speed test failed against {} server(s)",
                self.failed
            )));
        }
        Ok(self.results)
    }
}

/// Drives a complete run: server list, selection and per-server tests
pub struct TestOrchestrator {
    config: Config,
    client: SpeedtestClient,
    probe: LatencyProbe,
    loggers: Loggers,
}

impl TestOrchestrator {
    pub async fn new(config: Config) -> Result<Self> {
        let factory = LoggerFactory::new(&config);
        let loggers = Loggers {
            app: factory.create_logger("APP"),
            ping: factory.create_logger("PING"),
            xfer: factory.create_logger("XFER"),
            select: factory.create_logger("SELECT"),
        };

        let http = ClientFactory::build(&config.transport_options()?)?;
        let client = SpeedtestClient::new(http.clone(), loggers.app.clone());
        let probe = LatencyProbe::new(http, config.probe_options()?, loggers.ping.clone());

        Ok(Self {
            config,
            client,
            probe,
            loggers,
        })
    }

    /// Full command-line flow, printing results to stdout
    pub async fn execute(&self) -> Result<()> {
        if self.config.csv_header {
            println!("{}", CsvReport::header(self.config.csv_delimiter));
            return Ok(());
        }

        let servers = self.load_servers().await?;

        if self.config.list {
            for line in format_list(&servers) {
                println!("{}", line);
            }
            return Ok(());
        }

        let targets = self.choose_servers(servers).await?;
        let results = self.run_tests(targets).await?;

        if let Some(formatter) = ReportFormatterFactory::create(self.config.output, self.config.csv_delimiter) {
            let report = formatter.format_reports(&results)?;
            match self.config.output {
                OutputMode::Csv => print!("{}", report),
                _ => println!("{}", report),
            }
        }

        Ok(())
    }

    /// Server list from the local source when configured, otherwise remote
    pub async fn load_servers(&self) -> Result<Vec<Server>> {
        let filter = self.config.server_filter();
        let servers = match self.config.local_json {
            Some(ref source) => {
                self.loggers.app.info("Using local server list").field("source", source).log().await;
                load_local(source, &filter)?
            }
            None => {
                self.status("Retrieving server list...");
                fetch_server_list(self.client.inner(), &self.config.server_list_url, &filter, &self.loggers.app).await?
            }
        };

        if servers.is_empty() {
            return Err(AppError::validation("No matched servers found, please check your --server or --exclude options"));
        }
        Ok(servers)
    }

    /// Explicit ids test every listed server; otherwise only the fastest one
    pub async fn choose_servers(&self, mut servers: Vec<Server>) -> Result<Vec<Server>> {
        if !self.config.server_ids.is_empty() {
            return Ok(servers);
        }

        self.status(&format!("Selecting the fastest server based on ping from {} candidates...", servers.len()));
        let prober = HttpProber::new(self.client.clone(), self.probe.clone(), self.config.no_icmp);
        let selector = EndpointSelector::new(prober, self.loggers.select.clone());
        let selection = selector.select_fastest(&servers).await?;

        if !selection.has_signal() {
            return Err(AppError::unreachable("No server is currently available, please try again later."));
        }

        self.loggers
            .select
            .info("Selected fastest server")
            .field("index", selection.index)
            .field("ping_ms", selection.ping_ms)
            .field("responsive", selection.responsive)
            .log()
            .await;

        Ok(vec![servers.swap_remove(selection.index)])
    }

    /// Test each server in order.
    ///
    /// Down servers are reported and skipped. A failed test is reported and
    /// the run moves on, unless the error is fatal or every test failed.
    pub async fn run_tests(&self, servers: Vec<Server>) -> Result<Vec<SpeedTestResult>> {
        let mut tally = RunTally::with_capacity(servers.len());

        for mut server in servers {
            server.tlog.set_level(self.config.telemetry.level);
            server.no_icmp = self.config.no_icmp;

            self.status(&format!("Selected server: {} [{}]", server.name, server.hostname()));
            let sponsor = server.sponsor();
            if !sponsor.is_empty() {
                self.status(&format!("Sponsored by: {}", sponsor));
            }

            if !self.client.is_up(&mut server).await {
                self.loggers
                    .app
                    .error("Selected server is not responding at the moment, try again later")
                    .field("server", &server.name)
                    .field("id", server.id)
                    .log()
                    .await;
                continue;
            }

            let outcome = self.test_server(&mut server).await;
            if let Err(ref e) = outcome {
                self.loggers
                    .app
                    .error("Speed test failed")
                    .field("server", &server.name)
                    .field("id", server.id)
                    .error_info(e)
                    .log()
                    .await;
            }
            tally.record(outcome)?;
        }

        tally.finish()
    }

    /// Latency, download, upload and telemetry against one server that is up
    pub async fn test_server(&self, server: &mut Server) -> Result<SpeedTestResult> {
        let ip_info = self.client.ip_info(server, &self.config.distance).await?;
        if !ip_info.processed_string.is_empty() {
            self.status(&format!("You're testing from: {}", ip_info.processed_string));
        }

        let latency = self.measure_latency(server).await?;
        let download = if self.config.no_download {
            None
        } else {
            Some(self.measure_download(server).await?)
        };
        let upload = if self.config.no_upload {
            None
        } else {
            Some(self.measure_upload(server).await?)
        };

        let mut result = SpeedTestResult {
            timestamp: Utc::now(),
            server_name: server.name.clone(),
            server_url: server.server.clone(),
            client: ip_info.raw_isp_info.clone(),
            latency,
            download,
            upload,
            share_link: None,
        };

        if self.config.output == OutputMode::Simple {
            println!(
                "{}",
                simple_summary(&result, self.config.rate_display(), self.config.unit_base())
            );
        }

        if self.config.telemetry_enabled() {
            result.share_link = self.submit_telemetry(server, &ip_info, &result).await;
        }

        Ok(result)
    }

    async fn measure_latency(&self, server: &mut Server) -> Result<LatencyOutcome> {
        let spinner = self.spinner("Pinging server...");
        let outcome = self.probe.icmp_ping_and_jitter(server, self.config.ping_count).await?;

        self.loggers.ping.info("Latency measured").field("server", &server.name).latency(&outcome).log().await;
        if let Some(spinner) = spinner {
            spinner.finish(&format!("Ping: {:.0} ms\tJitter: {:.0} ms", outcome.avg_ms, outcome.jitter_ms));
        }
        Ok(outcome)
    }

    async fn measure_download(&self, server: &mut Server) -> Result<TransferOutcome> {
        let spinner = self.spinner("Downloading...");
        let driver = self.driver(spinner.as_ref());
        let started = Instant::now();

        let outcome = driver.download(self.client.inner(), server, self.config.chunks).await?;
        server.tlog.log(format!("Download took {:?}", started.elapsed()));

        self.loggers.xfer.info("Download finished").field("server", &server.name).transfer(&outcome).log().await;
        if let Some(spinner) = spinner {
            spinner.finish(&format!("Download rate:\t{}", self.format_rate(outcome.mbps)));
        }
        Ok(outcome)
    }

    async fn measure_upload(&self, server: &mut Server) -> Result<TransferOutcome> {
        let spinner = self.spinner("Uploading...");
        let driver = self.driver(spinner.as_ref());
        let started = Instant::now();
        if self.config.no_pre_allocate {
            server.tlog.warn("Pre-allocation is disabled, performance might be lower");
        }

        let outcome = driver
            .upload(
                self.client.inner(),
                server,
                !self.config.no_pre_allocate,
                self.config.upload_size_bytes(),
            )
            .await?;
        server.tlog.log(format!("Upload took {:?}", started.elapsed()));

        self.loggers.xfer.info("Upload finished").field("server", &server.name).transfer(&outcome).log().await;
        if let Some(spinner) = spinner {
            spinner.finish(&format!("Upload rate:\t{}", self.format_rate(outcome.mbps)));
        }
        Ok(outcome)
    }

    /// Submission failures are logged and never fail the run
    async fn submit_telemetry(&self, server: &Server, ip_info: &IpInfo, result: &SpeedTestResult) -> Option<String> {
        let report = TelemetryReport {
            ip_info,
            download_mbps: result.download_mbps(),
            upload_mbps: result.upload_mbps(),
            ping_ms: result.latency.avg_ms,
            jitter_ms: result.latency.jitter_ms,
            log: server.tlog.to_string(),
            extra: TelemetryExtra {
                server_name: server.name.clone(),
                extra: self.config.telemetry_extra.clone(),
            },
        };

        match send_telemetry(self.client.inner(), &self.config.telemetry, report).await {
            Ok(link) => {
                if self.config.output == OutputMode::Standard {
                    println!("Share your result: {}", link);
                }
                Some(link)
            }
            Err(e) => {
                self.loggers.app.error("Error when sending telemetry data").error_info(&e).log().await;
                None
            }
        }
    }

    fn driver(&self, spinner: Option<&Arc<ConsoleProgress>>) -> TransferDriver {
        let driver = TransferDriver::new(self.config.transfer_config(), self.loggers.xfer.clone());
        match spinner {
            Some(spinner) => driver.with_progress(Arc::clone(spinner) as Arc<dyn crate::output::ProgressSink>),
            None => driver,
        }
    }

    fn spinner(&self, prefix: &str) -> Option<Arc<ConsoleProgress>> {
        if self.config.output.is_silent() {
            None
        } else {
            Some(Arc::new(ConsoleProgress::start(prefix, self.config.enable_color)))
        }
    }

    fn format_rate(&self, mbps: f64) -> String {
        format_mbps(mbps, self.config.rate_display(), self.config.unit_base())
    }

    /// Informational line for standard output mode
    fn status(&self, message: &str) {
        if self.config.output == OutputMode::Standard {
            println!("{}", message);
        }
    }
}
