//! Data models shared across the speed tester

pub mod config;
pub mod metrics;
pub mod server;

// Re-export main model types
pub use config::Config;
pub use metrics::{LatencyOutcome, SpeedTestResult, TransferOutcome};
pub use server::{IpInfo, IpInfoResponse, Server};
