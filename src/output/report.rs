//! Result reports: simple summaries, JSON and CSV

use crate::error::Result;
use crate::models::{IpInfoResponse, SpeedTestResult};
use crate::types::{RateDisplay, UnitBase};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Megabits per second as bytes/KB/MB/GB per second
pub fn humanize_mbps(mbps: f64, unit: UnitBase) -> String {
    let base = unit.step();
    let val = mbps / 8.0;

    if val < 1.0 {
        let kb = val * base;
        if kb < 1.0 {
            format!("{:.2} bytes/s", kb * base)
        } else {
            format!("{:.2} KB/s", kb)
        }
    } else if val > base {
        format!("{:.2} GB/s", val / base)
    } else {
        format!("{:.2} MB/s", val)
    }
}

/// Final rate line for a transfer direction
pub fn format_mbps(mbps: f64, display: RateDisplay, unit: UnitBase) -> String {
    match display {
        RateDisplay::Mbps => format!("{:.2} Mbps", mbps),
        RateDisplay::Bytes => humanize_mbps(mbps, unit),
    }
}

/// The `--simple` block
pub fn simple_summary(result: &SpeedTestResult, display: RateDisplay, unit: UnitBase) -> String {
    format!(
        "Ping:\t{:.0} ms\tJitter:\t{:.0} ms\nDownload rate:\t{}\nUpload rate:\t{}",
        result.latency.avg_ms,
        result.latency.jitter_ms,
        format_mbps(result.download_mbps(), display, unit),
        format_mbps(result.upload_mbps(), display, unit),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub url: String,
}

/// One element of the `--json` array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub timestamp: DateTime<Utc>,
    pub server: ServerInfo,
    pub client: IpInfoResponse,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub ping: f64,
    pub jitter: f64,
    pub upload: f64,
    pub download: f64,
    pub share: String,
}

impl From<&SpeedTestResult> for JsonReport {
    fn from(result: &SpeedTestResult) -> Self {
        let mut client = result.client.clone();
        client.readme.clear();

        Self {
            timestamp: result.timestamp,
            server: ServerInfo {
                name: result.server_name.clone(),
                url: result.server_url.clone(),
            },
            client,
            bytes_sent: result.bytes_sent(),
            bytes_received: result.bytes_received(),
            ping: round2(result.latency.avg_ms),
            jitter: round2(result.latency.jitter_ms),
            upload: round2(result.upload_mbps()),
            download: round2(result.download_mbps()),
            share: result.share_link.clone().unwrap_or_default(),
        }
    }
}

/// One `--csv` row
#[derive(Debug, Clone, PartialEq)]
pub struct CsvReport {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub address: String,
    pub ping: f64,
    pub jitter: f64,
    pub download: f64,
    pub upload: f64,
    pub share: String,
    pub ip: String,
}

impl CsvReport {
    pub const HEADER: [&'static str; 9] = [
        "Timestamp",
        "Server Name",
        "Address",
        "Ping",
        "Jitter",
        "Download",
        "Upload",
        "Share",
        "IP",
    ];

    pub fn header(delimiter: char) -> String {
        join_fields(Self::HEADER.iter().map(|s| s.to_string()), delimiter)
    }

    pub fn to_row(&self, delimiter: char) -> String {
        let fields = [
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.name.clone(),
            self.address.clone(),
            self.ping.to_string(),
            self.jitter.to_string(),
            self.download.to_string(),
            self.upload.to_string(),
            self.share.clone(),
            self.ip.clone(),
        ];
        join_fields(fields.into_iter(), delimiter)
    }
}

impl From<&SpeedTestResult> for CsvReport {
    fn from(result: &SpeedTestResult) -> Self {
        Self {
            timestamp: result.timestamp,
            name: result.server_name.clone(),
            address: result.server_url.clone(),
            ping: round2(result.latency.avg_ms),
            jitter: round2(result.latency.jitter_ms),
            download: round2(result.download_mbps()),
            upload: round2(result.upload_mbps()),
            share: result.share_link.clone().unwrap_or_default(),
            ip: result.client.ip.clone(),
        }
    }
}

fn join_fields(fields: impl Iterator<Item = String>, delimiter: char) -> String {
    fields
        .map(|field| escape_field(&field, delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string())
}

fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Renders all collected results at the end of a run
pub trait ReportFormatter {
    fn format_reports(&self, results: &[SpeedTestResult]) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format_reports(&self, results: &[SpeedTestResult]) -> Result<String> {
        let reports: Vec<JsonReport> = results.iter().map(JsonReport::from).collect();
        Ok(serde_json::to_string(&reports)?)
    }
}

/// Rows without a header, one per result
#[derive(Debug, Clone, Copy)]
pub struct CsvFormatter {
    pub delimiter: char,
}

impl ReportFormatter for CsvFormatter {
    fn format_reports(&self, results: &[SpeedTestResult]) -> Result<String> {
        let mut out = String::new();
        for result in results {
            out.push_str(&CsvReport::from(result).to_row(self.delimiter));
            out.push('\n');
        }
        Ok(out)
    }
}
