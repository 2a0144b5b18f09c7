//! Network Speed Tester
//!
//! Measures latency, jitter, download and upload throughput against
//! LibreSpeed-compatible servers. Latency uses ICMP echo with an HTTP
//! fallback; transfers run several concurrent HTTP streams for a fixed
//! duration and report the aggregate rate.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod counter;
pub mod error;
pub mod latency;
pub mod logging;
pub mod models;
pub mod output;
pub mod selector;
pub mod servers;
pub mod telemetry;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use app::{App, TestOrchestrator};
pub use counter::RateCounter;
pub use error::{AppError, Result};
pub use latency::LatencyProbe;
pub use models::{Config, LatencyOutcome, Server, SpeedTestResult, TransferOutcome};
pub use selector::{EndpointSelector, Selection};
pub use transfer::{TransferConfig, TransferDriver};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");

/// Default configuration values
pub mod defaults {
    pub const PING_COUNT: usize = 10;
    pub const CONCURRENCY: usize = 3;
    pub const DURATION_SECS: u64 = 15;
    pub const DOWNLOAD_CHUNKS: usize = 100;
    pub const UPLOAD_SIZE_KIB: usize = 1024;
    pub const TIMEOUT_SECS: u64 = 15;
    pub const SERVER_LIST_URL: &str = "https://librespeed.org/backend-servers/servers.php";
    pub const DISTANCE_UNIT: &str = "km";
    pub const CSV_DELIMITER: char = ',';
    pub const ENABLE_COLOR: bool = true;

    /// `User-Agent` sent with every request
    pub fn user_agent() -> String {
        format!("{}/{}", super::PKG_NAME, super::VERSION)
    }
}
