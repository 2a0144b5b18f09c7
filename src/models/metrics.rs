//! Measurement outcomes produced by the probes and transfer driver

use super::server::IpInfoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Round-trip latency reduced from one probe run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyOutcome {
    /// Mean round-trip time in milliseconds
    pub avg_ms: f64,
    /// Smoothed jitter in milliseconds
    pub jitter_ms: f64,
}

/// Final figures of one download or upload run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub mbps: f64,
    pub total_bytes: u64,
}

/// Everything measured against one server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub timestamp: DateTime<Utc>,
    pub server_name: String,
    pub server_url: String,
    /// Client details reported by the server's IP-info path
    pub client: IpInfoResponse,
    pub latency: LatencyOutcome,
    pub download: Option<TransferOutcome>,
    pub upload: Option<TransferOutcome>,
    pub share_link: Option<String>,
}

impl SpeedTestResult {
    pub fn download_mbps(&self) -> f64 {
        self.download.map(|d| d.mbps).unwrap_or(0.0)
    }

    pub fn upload_mbps(&self) -> f64 {
        self.upload.map(|u| u.mbps).unwrap_or(0.0)
    }

    pub fn bytes_received(&self) -> u64 {
        self.download.map(|d| d.total_bytes).unwrap_or(0)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.upload.map(|u| u.total_bytes).unwrap_or(0)
    }
}
