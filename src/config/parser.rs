//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::Config,
    telemetry::{TelemetryLevel, TelemetrySettings},
};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::config)?;

        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config)?;
        self.resolve_telemetry(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        if let Some(n) = cli.concurrent {
            config.concurrency = n;
        }
        if let Some(secs) = cli.duration {
            config.duration_secs = secs;
        }
        if let Some(chunks) = cli.chunks {
            config.chunks = chunks;
        }
        if let Some(kib) = cli.upload_size {
            config.upload_size_kib = kib;
        }
        if let Some(secs) = cli.timeout {
            config.timeout_secs = secs;
        }
        if let Some(ref url) = cli.server_json {
            config.server_list_url = url.clone();
        }
        if let Some(ref path) = cli.local_json {
            config.local_json = Some(path.clone());
        }
        if let Some(ref source) = cli.source {
            config.source = Some(source.clone());
        }
        if let Some(ref unit) = cli.distance {
            config.distance = unit.clone();
        }
        if let Some(delimiter) = cli.csv_delimiter {
            config.csv_delimiter = delimiter;
        }

        // Flags only ever switch behavior on
        config.use_bytes |= cli.bytes;
        config.use_mebibytes |= cli.mebibytes;
        config.no_download |= cli.no_download;
        config.no_upload |= cli.no_upload;
        config.no_icmp |= cli.no_icmp;
        config.no_pre_allocate |= cli.no_pre_allocate;
        config.secure |= cli.secure;
        config.skip_cert_verify |= cli.skip_cert_verify;

        if cli.family() != crate::types::IpFamily::Any {
            config.family = cli.family();
        }

        config.server_ids = cli.servers.clone();
        config.exclude_ids = cli.exclude.clone();
        config.list = cli.list;
        config.csv_header = cli.csv_header;
        config.output = cli.output_mode();

        if !cli.use_colors() {
            config.enable_color = false;
        }

        // CLI-only
        config.verbose = cli.verbose;
        config.debug = cli.debug;
        config.log_json = cli.log_json;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: concurrency={}, duration={}s, timeout={}s, output={:?}",
                config.concurrency, config.duration_secs, config.timeout_secs, config.output
            );
        }

        Ok(())
    }

    /// Telemetry is enabled by `--share` or any telemetry option; a settings
    /// file supplies defaults that individual flags override
    fn resolve_telemetry(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        if let Some(ref extra) = cli.telemetry_extra {
            config.telemetry_extra = extra.clone();
        }

        if !cli.wants_telemetry() {
            return Ok(());
        }

        let mut settings = match cli.telemetry_json {
            Some(ref path) => TelemetrySettings::from_file(path)?,
            None => TelemetrySettings {
                level: config.telemetry.level.max(TelemetryLevel::Basic),
                ..TelemetrySettings::default()
            },
        };

        if let Some(level) = cli.telemetry_level {
            settings.level = level;
        }
        if let Some(ref server) = cli.telemetry_server {
            settings.server = server.clone();
        }
        if let Some(ref path) = cli.telemetry_path {
            settings.path = path.clone();
        }
        if let Some(ref share) = cli.telemetry_share {
            settings.share = share.clone();
        }

        config.telemetry = settings;
        Ok(())
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    match config.local_json {
        Some(ref path) => summary.push(format!("Server list: {} (local)", path)),
        None => summary.push(format!("Server list: {}", config.server_list_url)),
    }
    if !config.server_ids.is_empty() {
        summary.push(format!("Servers: {:?}", config.server_ids));
    }
    if !config.exclude_ids.is_empty() {
        summary.push(format!("Excluded: {:?}", config.exclude_ids));
    }
    summary.push(format!("Concurrency: {}", config.concurrency));
    summary.push(format!("Duration: {}s", config.duration_secs));
    summary.push(format!("Timeout: {}s", config.timeout_secs));
    summary.push(format!("Download chunks: {}", config.chunks));
    summary.push(format!("Upload size: {} KiB", config.upload_size_kib));
    summary.push(format!("Latency: {}", if config.no_icmp { "HTTP" } else { "ICMP, HTTP fallback" }));
    summary.push(format!("Output: {:?}", config.output));
    summary.push(format!("Telemetry: {}", config.telemetry.level));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IpFamily, OutputMode};
    use clap::Parser;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Environment variables are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SPEEDTEST_CONCURRENT",
        "SPEEDTEST_DURATION",
        "SPEEDTEST_TELEMETRY_LEVEL",
        "SPEEDTEST_LOCAL_JSON",
        "SPEEDTEST_TELEMETRY_JSON",
    ];

    fn parse(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["nst"];
        argv.extend_from_slice(args);
        ConfigParser::new(Cli::parse_from(argv)).parse()
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let config = parse(&[
            "--concurrent", "6",
            "--duration", "5",
            "--timeout", "8",
            "--no-icmp",
            "--bytes",
            "-6",
            "--json",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(config.concurrency, 6);
        assert_eq!(config.duration_secs, 5);
        assert_eq!(config.timeout_secs, 8);
        assert!(config.no_icmp);
        assert!(config.use_bytes);
        assert_eq!(config.family, IpFamily::V6);
        assert_eq!(config.output, OutputMode::Json);
        assert!(config.verbose);
        assert!(!config.telemetry_enabled());
    }

    #[test]
    fn test_cli_overrides_env_vars() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        env::set_var("SPEEDTEST_CONCURRENT", "8");
        env::set_var("SPEEDTEST_DURATION", "20");
        let config = parse(&["--concurrent", "2"]).unwrap();
        clear_env();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.duration_secs, 20);
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        env::set_var("SPEEDTEST_CONCURRENT", "many");
        let result = parse(&[]);
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_conflicts_rejected() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        assert!(parse(&["--server", "1", "--exclude", "2"]).is_err());
        assert!(parse(&["--concurrent", "0"]).is_err());
        assert!(parse(&["--source", "not-an-ip"]).is_err());
    }

    #[test]
    fn test_share_enables_basic_telemetry() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let config = parse(&["--share", "--telemetry-extra", "lab"]).unwrap();
        assert_eq!(config.telemetry.level, TelemetryLevel::Basic);
        assert_eq!(config.telemetry.server, crate::telemetry::DEFAULT_TELEMETRY_SERVER);
        assert_eq!(config.telemetry_extra, "lab");
    }

    #[test]
    fn test_telemetry_file_with_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"telemetryLevel":"full","server":"https://stats.example.com","path":"/t.php"}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = parse(&["--telemetry-json", path.as_str(), "--telemetry-level", "debug"]).unwrap();
        assert_eq!(config.telemetry.level, TelemetryLevel::Debug);
        assert_eq!(config.telemetry.server, "https://stats.example.com");
        assert_eq!(config.telemetry.path, "/t.php");

        let config = parse(&["--telemetry-json", path.as_str(), "--telemetry-server", "https://other.example.com"]).unwrap();
        assert_eq!(config.telemetry.level, TelemetryLevel::Full);
        assert_eq!(config.telemetry.server, "https://other.example.com");
    }

    #[test]
    fn test_config_summary() {
        let config = Config {
            server_ids: vec![4],
            ..Default::default()
        };
        let summary = display_config_summary(&config);

        assert!(summary.contains("Server list: https://"));
        assert!(summary.contains("Servers: [4]"));
        assert!(summary.contains("Concurrency: 3"));
        assert!(summary.contains("Telemetry: disabled"));
    }
}
