//! Command-line interface

use crate::telemetry::TelemetryLevel;
use crate::types::{IpFamily, OutputMode};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

const AFTER_HELP: &str = "\
EXAMPLES:
    nst                          Test the fastest server from the public list
    nst --list                   Show available servers
    nst --server 12 --server 40  Test two specific servers
    nst --simple --no-upload     Ping and download only, one summary block
    nst --csv --csv-header       Print the CSV header line
    nst --local-json servers.json --json

Settings may also come from a .env file or SPEEDTEST_* environment variables.";

/// Network Speed Tester - measure latency, download and upload throughput
/// against LibreSpeed-compatible servers
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nst")]
#[command(version, about, long_about = None, after_help = AFTER_HELP)]
#[command(long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ", built ", env!("BUILD_TIME"), ")"))]
pub struct Cli {
    /// Display a list of servers and exit
    #[arg(long)]
    pub list: bool,

    /// Test the server with this id (repeatable, -1 tests all)
    #[arg(long = "server", value_name = "ID", action = ArgAction::Append, allow_negative_numbers = true)]
    pub servers: Vec<i64>,

    /// Exclude the server with this id (repeatable)
    #[arg(long = "exclude", value_name = "ID", action = ArgAction::Append)]
    pub exclude: Vec<i64>,

    /// URL of the server list JSON
    #[arg(long, value_name = "URL")]
    pub server_json: Option<String>,

    /// Local server list JSON file, `-` for stdin
    #[arg(long, value_name = "PATH", env = "SPEEDTEST_LOCAL_JSON")]
    pub local_json: Option<String>,

    /// Source IP address to bind to
    #[arg(long, value_name = "ADDR")]
    pub source: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub timeout: Option<u64>,

    /// Upload and download test duration in seconds
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub duration: Option<u64>,

    /// Chunks to download from the server per request
    #[arg(long, value_name = "N")]
    pub chunks: Option<usize>,

    /// Upload payload size in KiB
    #[arg(long, value_name = "KIB")]
    pub upload_size: Option<usize>,

    /// Concurrent HTTP streams
    #[arg(long = "concurrent", value_name = "N")]
    pub concurrent: Option<usize>,

    /// Display values in bytes instead of bits
    #[arg(long)]
    pub bytes: bool,

    /// Use 1024-based units for --bytes output
    #[arg(long)]
    pub mebibytes: bool,

    /// Distance unit for server distance (km or mi)
    #[arg(long, value_name = "UNIT")]
    pub distance: Option<String>,

    /// Generate and print a share link
    #[arg(long)]
    pub share: bool,

    /// Print a single summary block per server
    #[arg(long)]
    pub simple: bool,

    /// Print results as CSV
    #[arg(long)]
    pub csv: bool,

    /// Single-character CSV delimiter
    #[arg(long, value_name = "CHAR")]
    pub csv_delimiter: Option<char>,

    /// Print the CSV header and exit
    #[arg(long)]
    pub csv_header: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip the download test
    #[arg(long)]
    pub no_download: bool,

    /// Skip the upload test
    #[arg(long)]
    pub no_upload: bool,

    /// Use HTTP instead of ICMP for latency
    #[arg(long)]
    pub no_icmp: bool,

    /// Generate upload data on the fly instead of ahead of time
    #[arg(long)]
    pub no_pre_allocate: bool,

    /// Use https for every server
    #[arg(long)]
    pub secure: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub skip_cert_verify: bool,

    /// Force IPv4
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Force IPv6
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Telemetry settings JSON file
    #[arg(long, value_name = "PATH", env = "SPEEDTEST_TELEMETRY_JSON")]
    pub telemetry_json: Option<PathBuf>,

    /// Telemetry level: disabled, basic, full or debug
    #[arg(long, value_name = "LEVEL", value_parser = parse_telemetry_level)]
    pub telemetry_level: Option<TelemetryLevel>,

    /// Telemetry server base URL
    #[arg(long, value_name = "URL")]
    pub telemetry_server: Option<String>,

    /// Telemetry submission path
    #[arg(long, value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Telemetry share page path
    #[arg(long, value_name = "PATH")]
    pub telemetry_share: Option<String>,

    /// Extra data sent with telemetry
    #[arg(long, value_name = "TEXT")]
    pub telemetry_extra: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Emit log entries as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if !self.servers.is_empty() && !self.exclude.is_empty() {
            return Err("either --exclude or --server can be used".to_string());
        }

        if let Some(n) = self.concurrent {
            if n < 1 {
                return Err(format!("Concurrent requests cannot be lower than 1: {} is given", n));
            }
        }

        if self.chunks == Some(0) {
            return Err("--chunks must be greater than 0".to_string());
        }

        if self.upload_size == Some(0) {
            return Err("--upload-size must be greater than 0".to_string());
        }

        if let Some(unit) = &self.distance {
            if !matches!(unit.as_str(), "km" | "mi" | "NM") {
                return Err(format!("Unsupported distance unit '{}' (expected km, mi or NM)", unit));
            }
        }

        Ok(())
    }

    /// CSV wins over JSON, which wins over simple
    pub fn output_mode(&self) -> OutputMode {
        if self.csv || self.csv_header {
            OutputMode::Csv
        } else if self.json {
            OutputMode::Json
        } else if self.simple {
            OutputMode::Simple
        } else {
            OutputMode::Standard
        }
    }

    pub fn family(&self) -> IpFamily {
        if self.ipv4 {
            IpFamily::V4
        } else if self.ipv6 {
            IpFamily::V6
        } else {
            IpFamily::Any
        }
    }

    /// Whether any flag asks for result submission
    pub fn wants_telemetry(&self) -> bool {
        self.share
            || self.telemetry_json.is_some()
            || self.telemetry_level.is_some()
            || self.telemetry_server.is_some()
            || self.telemetry_path.is_some()
            || self.telemetry_share.is_some()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Parse a positive number of seconds
fn parse_seconds(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else {
                Ok(secs)
            }
        })
}

fn parse_telemetry_level(s: &str) -> Result<TelemetryLevel, String> {
    s.parse::<TelemetryLevel>().map_err(|e| e.to_string())
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_basic() {
        let cli = Cli::parse_from(["nst", "--concurrent", "5", "--duration", "10"]);
        assert_eq!(cli.concurrent, Some(5));
        assert_eq!(cli.duration, Some(10));
        assert_eq!(cli.timeout, None);
        assert!(!cli.verbose);
        assert_eq!(cli.output_mode(), OutputMode::Standard);
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::parse_from([
            "nst",
            "--server", "3",
            "--server", "7",
            "--source", "192.0.2.5",
            "--timeout", "20",
            "--chunks", "50",
            "--upload-size", "512",
            "--bytes",
            "--mebibytes",
            "--distance", "mi",
            "--share",
            "--csv",
            "--csv-delimiter", ";",
            "--no-download",
            "--no-icmp",
            "--no-pre-allocate",
            "--secure",
            "--skip-cert-verify",
            "-4",
            "--telemetry-level", "full",
            "--telemetry-extra", "lab",
            "--no-color",
            "--debug",
            "--log-json",
        ]);

        assert_eq!(cli.servers, vec![3, 7]);
        assert_eq!(cli.source.as_deref(), Some("192.0.2.5"));
        assert_eq!(cli.timeout, Some(20));
        assert_eq!(cli.chunks, Some(50));
        assert_eq!(cli.upload_size, Some(512));
        assert!(cli.bytes && cli.mebibytes && cli.share);
        assert_eq!(cli.csv_delimiter, Some(';'));
        assert_eq!(cli.output_mode(), OutputMode::Csv);
        assert_eq!(cli.family(), IpFamily::V4);
        assert_eq!(cli.telemetry_level, Some(TelemetryLevel::Full));
        assert!(cli.wants_telemetry());
        assert!(!cli.use_colors());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_output_mode_priority() {
        let cli = Cli::parse_from(["nst", "--json", "--csv", "--simple"]);
        assert_eq!(cli.output_mode(), OutputMode::Csv);
        let cli = Cli::parse_from(["nst", "--json", "--simple"]);
        assert_eq!(cli.output_mode(), OutputMode::Json);
        let cli = Cli::parse_from(["nst", "--simple"]);
        assert_eq!(cli.output_mode(), OutputMode::Simple);
    }

    #[test]
    fn test_conflicting_flags() {
        let cli = Cli::parse_from(["nst", "--server", "1", "--exclude", "2"]);
        assert!(cli.validate().unwrap_err().contains("either --exclude or --server"));

        let cli = Cli::parse_from(["nst", "--concurrent", "0"]);
        assert!(cli.validate().unwrap_err().contains("cannot be lower than 1"));

        let cli = Cli::parse_from(["nst", "--distance", "parsecs"]);
        assert!(cli.validate().is_err());

        assert!(Cli::try_parse_from(["nst", "-4", "-6"]).is_err());
    }

    #[test]
    fn test_server_all_accepts_negative() {
        let cli = Cli::parse_from(["nst", "--server", "-1"]);
        assert_eq!(cli.servers, vec![-1]);
    }

    #[test]
    fn test_seconds_parsing() {
        assert_eq!(parse_seconds("1").unwrap(), 1);
        assert_eq!(parse_seconds("600").unwrap(), 600);
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("abc").is_err());
        assert!(parse_seconds("-5").is_err());
        assert!(parse_seconds("+5").is_err());
        assert!(parse_seconds("0x10").is_err());
    }

    #[test]
    fn test_telemetry_level_rejected() {
        assert!(Cli::try_parse_from(["nst", "--telemetry-level", "loud"]).is_err());
        assert!(!Cli::parse_from(["nst"]).wants_telemetry());
    }
}
