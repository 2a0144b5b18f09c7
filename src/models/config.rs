//! Configuration data model and validation

use crate::client::{HttpUtils, TransportOptions};
use crate::latency::ProbeOptions;
use crate::servers::ServerFilter;
use crate::telemetry::{TelemetryLevel, TelemetrySettings};
use crate::transfer::TransferConfig;
use crate::types::{AppError, IpFamily, OutputMode, RateDisplay, Result, UnitBase};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Simultaneous transfer streams
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Length of each transfer test
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// `ckSize` requested from the download path
    #[serde(default = "default_chunks")]
    pub chunks: usize,

    /// Upload body size in KiB
    #[serde(default = "default_upload_size_kib")]
    pub upload_size_kib: usize,

    /// Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_ping_count")]
    pub ping_count: usize,

    /// Show rates in bytes instead of bits
    #[serde(default)]
    pub use_bytes: bool,

    /// Use 1024-based units
    #[serde(default)]
    pub use_mebibytes: bool,

    #[serde(default)]
    pub no_download: bool,

    #[serde(default)]
    pub no_upload: bool,

    #[serde(default)]
    pub no_icmp: bool,

    /// Generate upload data on the fly instead of once per test
    #[serde(default)]
    pub no_pre_allocate: bool,

    /// Local source address for connections and pings
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub family: IpFamily,

    #[serde(default)]
    pub skip_cert_verify: bool,

    /// Force https on every server
    #[serde(default)]
    pub secure: bool,

    #[serde(default = "default_server_list_url")]
    pub server_list_url: String,

    /// Local server list; `-` reads stdin
    #[serde(default)]
    pub local_json: Option<String>,

    #[serde(default)]
    pub server_ids: Vec<i64>,

    #[serde(default)]
    pub exclude_ids: Vec<i64>,

    /// Print the server list and exit
    #[serde(default)]
    pub list: bool,

    #[serde(default)]
    pub output: OutputMode,

    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,

    /// Print only the CSV header and exit
    #[serde(default)]
    pub csv_header: bool,

    /// Distance unit passed to the IP-info path
    #[serde(default = "default_distance")]
    pub distance: String,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub telemetry_extra: String,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,

    /// Emit log entries as JSON
    #[serde(default)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            duration_secs: default_duration_secs(),
            chunks: default_chunks(),
            upload_size_kib: default_upload_size_kib(),
            timeout_secs: default_timeout_secs(),
            ping_count: default_ping_count(),
            use_bytes: false,
            use_mebibytes: false,
            no_download: false,
            no_upload: false,
            no_icmp: false,
            no_pre_allocate: false,
            source: None,
            family: IpFamily::Any,
            skip_cert_verify: false,
            secure: false,
            server_list_url: default_server_list_url(),
            local_json: None,
            server_ids: Vec::new(),
            exclude_ids: Vec::new(),
            list: false,
            output: OutputMode::Standard,
            csv_delimiter: default_csv_delimiter(),
            csv_header: false,
            distance: default_distance(),
            telemetry: TelemetrySettings::default(),
            telemetry_extra: String::new(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn upload_size_bytes(&self) -> usize {
        self.upload_size_kib * 1024
    }

    pub fn unit_base(&self) -> UnitBase {
        UnitBase::from_mebibytes(self.use_mebibytes)
    }

    pub fn rate_display(&self) -> RateDisplay {
        if self.use_bytes {
            RateDisplay::Bytes
        } else {
            RateDisplay::Mbps
        }
    }

    /// Parsed source address, if one is configured
    pub fn source_addr(&self) -> Result<Option<IpAddr>> {
        match self.source.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => {
                let addr: IpAddr = raw
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid source address '{}': {}", raw, e)))?;
                if !self.family.accepts(&addr) {
                    let family = if self.family == IpFamily::V6 { "IPv6" } else { "IPv4" };
                    return Err(AppError::config(format!("Address {} is not a valid {} address", raw, family)));
                }
                Ok(Some(addr))
            }
        }
    }

    pub fn transport_options(&self) -> Result<TransportOptions> {
        Ok(TransportOptions {
            timeout: self.timeout(),
            source: self.source_addr()?,
            family: self.family,
            skip_cert_verify: self.skip_cert_verify,
            user_agent: crate::defaults::user_agent(),
        })
    }

    pub fn probe_options(&self) -> Result<ProbeOptions> {
        Ok(ProbeOptions {
            source: self.source_addr()?,
            family: self.family,
        })
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            concurrency: self.concurrency,
            duration: self.duration(),
            unit: self.unit_base(),
            display: self.rate_display(),
        }
    }

    pub fn server_filter(&self) -> ServerFilter {
        ServerFilter {
            secure: self.secure,
            exclude: self.exclude_ids.clone(),
            specific: self.server_ids.clone(),
            apply: !self.list,
        }
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.level.is_enabled()
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(AppError::config(format!(
                "Concurrent requests cannot be lower than 1: {} is given",
                self.concurrency
            )));
        }

        if self.duration_secs == 0 {
            return Err(AppError::config("Test duration must be greater than 0"));
        }

        if self.chunks == 0 {
            return Err(AppError::config("Download chunks must be greater than 0"));
        }

        if self.upload_size_kib == 0 {
            return Err(AppError::config("Upload size must be greater than 0"));
        }

        if self.timeout_secs == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.ping_count == 0 {
            return Err(AppError::config("Ping count must be greater than 0"));
        }

        if !self.server_ids.is_empty() && !self.exclude_ids.is_empty() {
            return Err(AppError::config("either --exclude or --server can be used"));
        }

        if self.local_json.is_none() {
            HttpUtils::validate_url(&self.server_list_url)
                .map_err(|e| AppError::config(format!("Invalid server list URL: {}", e)))?;
        }

        self.source_addr()?;

        if matches!(self.csv_delimiter, '"' | '\n' | '\r') {
            return Err(AppError::config(format!("Invalid CSV delimiter {:?}", self.csv_delimiter)));
        }

        if self.telemetry_enabled() {
            HttpUtils::validate_url(&self.telemetry.server)
                .map_err(|e| AppError::config(format!("Invalid telemetry server: {}", e)))?;
        }

        Ok(())
    }

    /// Merge `SPEEDTEST_*` environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("SPEEDTEST_CONCURRENT") {
            self.concurrency = parse_env("SPEEDTEST_CONCURRENT", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_DURATION") {
            self.duration_secs = parse_env("SPEEDTEST_DURATION", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_CHUNKS") {
            self.chunks = parse_env("SPEEDTEST_CHUNKS", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_UPLOAD_SIZE") {
            self.upload_size_kib = parse_env("SPEEDTEST_UPLOAD_SIZE", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_TIMEOUT") {
            self.timeout_secs = parse_env("SPEEDTEST_TIMEOUT", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_SERVER_JSON") {
            self.server_list_url = value;
        }

        if let Some(value) = env_value("SPEEDTEST_SOURCE") {
            self.source = Some(value);
        }

        if let Some(value) = env_value("SPEEDTEST_NO_ICMP") {
            self.no_icmp = parse_env("SPEEDTEST_NO_ICMP", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_SECURE") {
            self.secure = parse_env("SPEEDTEST_SECURE", &value)?;
        }

        if let Some(value) = env_value("SPEEDTEST_TELEMETRY_LEVEL") {
            self.telemetry.level = value.parse::<TelemetryLevel>()?;
        }

        if let Some(value) = env_value("SPEEDTEST_ENABLE_COLOR") {
            self.enable_color = parse_env("SPEEDTEST_ENABLE_COLOR", &value)?;
        }

        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}

// Default value functions for serde
fn default_concurrency() -> usize {
    crate::defaults::CONCURRENCY
}

fn default_duration_secs() -> u64 {
    crate::defaults::DURATION_SECS
}

fn default_chunks() -> usize {
    crate::defaults::DOWNLOAD_CHUNKS
}

fn default_upload_size_kib() -> usize {
    crate::defaults::UPLOAD_SIZE_KIB
}

fn default_timeout_secs() -> u64 {
    crate::defaults::TIMEOUT_SECS
}

fn default_ping_count() -> usize {
    crate::defaults::PING_COUNT
}

fn default_server_list_url() -> String {
    crate::defaults::SERVER_LIST_URL.to_string()
}

fn default_csv_delimiter() -> char {
    crate::defaults::CSV_DELIMITER
}

fn default_distance() -> String {
    crate::defaults::DISTANCE_UNIT.to_string()
}

fn default_enable_color() -> bool {
    crate::defaults::ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.duration_secs, 15);
        assert_eq!(config.upload_size_bytes(), 1024 * 1024);
        assert!(!config.telemetry_enabled());
    }

    #[test]
    fn test_zero_concurrency_invalid() {
        let config = Config { concurrency: 0, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cannot be lower than 1"));
    }

    #[test]
    fn test_zero_duration_invalid() {
        let config = Config { duration_secs: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_and_exclude_conflict() {
        let config = Config {
            server_ids: vec![1],
            exclude_ids: vec![2],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_server_list_url() {
        let config = Config {
            server_list_url: "not-a-url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // a local list makes the remote URL irrelevant
        let local = Config {
            local_json: Some("servers.json".to_string()),
            ..config
        };
        assert!(local.validate().is_ok());
    }

    #[test]
    fn test_source_address_family() {
        let mut config = Config {
            source: Some("192.0.2.1".to_string()),
            ..Default::default()
        };
        assert_eq!(config.source_addr().unwrap(), Some("192.0.2.1".parse().unwrap()));

        config.family = IpFamily::V6;
        assert!(config.source_addr().is_err());

        config.source = Some("bogus".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            use_bytes: true,
            use_mebibytes: true,
            concurrency: 5,
            ..Default::default()
        };
        let transfer = config.transfer_config();
        assert_eq!(transfer.concurrency, 5);
        assert_eq!(transfer.unit, UnitBase::Binary);
        assert_eq!(transfer.display, RateDisplay::Bytes);

        let listing = Config { list: true, server_ids: vec![3], ..Default::default() };
        assert!(!listing.server_filter().apply);
    }

    #[test]
    fn test_telemetry_server_checked_when_enabled() {
        let mut config = Config::default();
        config.telemetry.server = "nope".to_string();
        assert!(config.validate().is_ok());

        config.telemetry.level = TelemetryLevel::Basic;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_helper() {
        assert_eq!(parse_env::<usize>("K", "4").unwrap(), 4);
        assert!(parse_env::<usize>("K", "four").is_err());
        assert!(parse_env::<bool>("K", "true").unwrap());
    }
}
