//! Result sharing through a LibreSpeed telemetry backend

use crate::error::{AppError, Result};
use crate::models::server::join_path;
use crate::models::IpInfo;
use chrono::Local;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_TELEMETRY_SERVER: &str = "https://librespeed.org";
pub const DEFAULT_TELEMETRY_PATH: &str = "/results/telemetry.php";
pub const DEFAULT_TELEMETRY_SHARE: &str = "/results/";

/// How much is submitted along with the results
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLevel {
    #[default]
    Disabled,
    Basic,
    Full,
    Debug,
}

impl TelemetryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryLevel::Disabled => "disabled",
            TelemetryLevel::Basic => "basic",
            TelemetryLevel::Full => "full",
            TelemetryLevel::Debug => "debug",
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self > TelemetryLevel::Disabled
    }
}

impl FromStr for TelemetryLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disabled" => Ok(TelemetryLevel::Disabled),
            "basic" => Ok(TelemetryLevel::Basic),
            "full" => Ok(TelemetryLevel::Full),
            "debug" => Ok(TelemetryLevel::Debug),
            other => Err(AppError::config(format!(
                "Unsupported telemetry level '{}' (expected disabled, basic, full or debug)",
                other
            ))),
        }
    }
}

impl fmt::Display for TelemetryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-server timing log submitted in the `log` field
#[derive(Debug, Clone, Default)]
pub struct TelemetryLog {
    level: TelemetryLevel,
    content: Vec<String>,
}

impl TelemetryLog {
    pub fn set_level(&mut self, level: TelemetryLevel) {
        self.level = level;
    }

    /// Record a line at `full` and above
    pub fn log(&mut self, message: impl fmt::Display) {
        if self.level >= TelemetryLevel::Full {
            self.push(format!("{}", message));
        }
    }

    pub fn warn(&mut self, message: impl fmt::Display) {
        if self.level >= TelemetryLevel::Full {
            self.push(format!("WARN: {}", message));
        }
    }

    /// Record a line at `debug` only
    pub fn verbose(&mut self, message: impl fmt::Display) {
        if self.level >= TelemetryLevel::Debug {
            self.push(format!("{}", message));
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.content
    }

    fn push(&mut self, line: String) {
        self.content.push(format!("{}: {}", Local::now().to_rfc3339(), line));
    }
}

impl fmt::Display for TelemetryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content.join("\n"))
    }
}

/// Telemetry backend location, as stored in a `--telemetry-json` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// A settings file without a level enables `basic`
    #[serde(rename = "telemetryLevel", default = "default_file_level")]
    pub level: TelemetryLevel,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(rename = "shareURL", default = "default_share")]
    pub share: String,
}

fn default_file_level() -> TelemetryLevel {
    TelemetryLevel::Basic
}

fn default_server() -> String {
    DEFAULT_TELEMETRY_SERVER.to_string()
}

fn default_path() -> String {
    DEFAULT_TELEMETRY_PATH.to_string()
}

fn default_share() -> String {
    DEFAULT_TELEMETRY_SHARE.to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: TelemetryLevel::Disabled,
            server: default_server(),
            path: default_path(),
            share: default_share(),
        }
    }
}

impl TelemetrySettings {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Cannot read telemetry settings {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::config(format!("Invalid telemetry settings {}: {}", path.display(), e)))
    }

    /// Submission URL
    pub fn submit_url(&self) -> Result<Url> {
        let mut url = self.base()?;
        let joined = join_path(url.path(), &self.path);
        url.set_path(&joined);
        Ok(url)
    }

    /// Share page URL, always with a trailing slash
    pub fn share_url(&self) -> Result<Url> {
        let mut url = self.base()?;
        let mut joined = join_path(url.path(), &self.share);
        if !joined.ends_with('/') {
            joined.push('/');
        }
        url.set_path(&joined);
        Ok(url)
    }

    fn base(&self) -> Result<Url> {
        Url::parse(&self.server)
            .map_err(|e| AppError::config(format!("Invalid telemetry server '{}': {}", self.server, e)))
    }
}

/// The `extra` form field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryExtra {
    #[serde(rename = "server")]
    pub server_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

/// Figures submitted for one server
#[derive(Debug, Clone)]
pub struct TelemetryReport<'a> {
    pub ip_info: &'a IpInfo,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: f64,
    pub log: String,
    pub extra: TelemetryExtra,
}

impl TelemetryReport<'_> {
    fn into_form(self) -> Result<Form> {
        let ispinfo = serde_json::to_string(self.ip_info)?;
        let extra = serde_json::to_string(&self.extra)?;

        Ok(Form::new()
            .text("ispinfo", ispinfo)
            .text("dl", format!("{:.2}", self.download_mbps))
            .text("ul", format!("{:.2}", self.upload_mbps))
            .text("ping", (self.ping_ms as i64).to_string())
            .text("jitter", (self.jitter_ms as i64).to_string())
            .text("log", self.log)
            .text("extra", extra))
    }
}

/// Submit results and return the share link
pub async fn send_telemetry(client: &Client, settings: &TelemetrySettings, report: TelemetryReport<'_>) -> Result<String> {
    let submit_url = settings.submit_url()?;
    let share_url = settings.share_url()?;

    let response = client
        .post(submit_url)
        .multipart(report.into_form()?)
        .send()
        .await?;

    let body = response.text().await?;
    share_link(share_url, &body)
}

/// Turn a `id <ID>` reply into `<share>?id=<ID>`
fn share_link(mut share_url: Url, body: &str) -> Result<String> {
    let parts: Vec<&str> = body.trim().split(' ').collect();
    if parts.len() != 2 {
        return Err(AppError::telemetry(format!("server returned invalid response: {}", body)));
    }

    share_url.query_pairs_mut().append_pair("id", parts[1]);
    Ok(share_url.to_string())
}
