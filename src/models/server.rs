//! Speed test server (endpoint) records

use crate::error::{AppError, Result};
use crate::telemetry::TelemetryLog;
use serde::{Deserialize, Serialize};
use url::Url;

/// A LibreSpeed-compatible backend as published in server lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    /// Base URL every other path is relative to
    pub server: String,
    #[serde(rename = "dlURL")]
    pub download_url: String,
    #[serde(rename = "ulURL")]
    pub upload_url: String,
    #[serde(rename = "pingURL")]
    pub ping_url: String,
    #[serde(rename = "getIpURL")]
    pub get_ip_url: String,
    #[serde(rename = "sponsorName", default)]
    pub sponsor_name: String,
    #[serde(rename = "sponsorURL", default)]
    pub sponsor_url: String,

    /// Set once an ICMP probe has failed; later probes use HTTP directly
    #[serde(skip)]
    pub no_icmp: bool,

    #[serde(skip)]
    pub tlog: TelemetryLog,
}

impl Server {
    /// Parse the base URL
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.server)
            .map_err(|e| AppError::parse(format!("Invalid server URL '{}': {}", self.server, e)))
    }

    /// Host name of the base URL, or the raw string when it does not parse
    pub fn hostname(&self) -> String {
        self.base_url()
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.server.clone())
    }

    /// Resolve one of the server's relative paths against the base URL
    pub fn endpoint_url(&self, relative: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        let joined = join_path(url.path(), relative);
        url.set_path(&joined);
        Ok(url)
    }

    pub fn ping_endpoint(&self) -> Result<Url> {
        self.endpoint_url(&self.ping_url)
    }

    pub fn download_endpoint(&self) -> Result<Url> {
        self.endpoint_url(&self.download_url)
    }

    pub fn upload_endpoint(&self) -> Result<Url> {
        self.endpoint_url(&self.upload_url)
    }

    pub fn ip_info_endpoint(&self) -> Result<Url> {
        self.endpoint_url(&self.get_ip_url)
    }

    /// Sponsor line, `name @ url`, empty when the server has no sponsor
    pub fn sponsor(&self) -> String {
        if self.sponsor_name.is_empty() {
            return String::new();
        }

        let mut message = self.sponsor_name.clone();
        if !self.sponsor_url.is_empty() {
            let candidate = if self.sponsor_url.contains("://") {
                self.sponsor_url.clone()
            } else {
                format!("https://{}", self.sponsor_url.trim_start_matches("//"))
            };
            if let Ok(url) = Url::parse(&candidate) {
                message.push_str(" @ ");
                message.push_str(url.as_str());
            }
        }
        message
    }
}

/// Join a relative path onto a base path, collapsing the separator
pub(crate) fn join_path(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

/// Reply of a server's IP-info endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(rename = "processedString", default)]
    pub processed_string: String,
    #[serde(rename = "rawIspInfo", default)]
    pub raw_isp_info: IpInfoResponse,
}

/// ipinfo.io-shaped client details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpInfoResponse {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    #[serde(rename = "loc", default)]
    pub location: String,
    #[serde(rename = "org", default)]
    pub organization: String,
    #[serde(default)]
    pub postal: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub readme: String,
}
