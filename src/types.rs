//! Type definitions and aliases

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Address family used for latency probes and transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    /// Let the resolver pick
    #[default]
    Any,
    /// Force IPv4
    V4,
    /// Force IPv6
    V6,
}

impl IpFamily {
    /// Unspecified local address that pins outgoing sockets to this family
    pub fn unspecified_local(&self) -> Option<IpAddr> {
        match self {
            IpFamily::Any => None,
            IpFamily::V4 => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            IpFamily::V6 => Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        }
    }

    /// Whether `addr` belongs to this family
    pub fn accepts(&self, addr: &IpAddr) -> bool {
        match self {
            IpFamily::Any => true,
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        }
    }
}

/// Divisor family for rate output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitBase {
    /// KB/MB/GB, 1000-based
    #[default]
    Decimal,
    /// KiB/MiB/GiB, 1024-based
    Binary,
}

impl UnitBase {
    pub fn from_mebibytes(use_mebibytes: bool) -> Self {
        if use_mebibytes {
            UnitBase::Binary
        } else {
            UnitBase::Decimal
        }
    }

    /// Base used when stepping between byte units
    pub fn step(&self) -> f64 {
        match self {
            UnitBase::Decimal => 1000.0,
            UnitBase::Binary => 1024.0,
        }
    }

    /// Bytes per second in one megabit per second
    pub fn megabit_divisor(&self) -> f64 {
        match self {
            UnitBase::Decimal => 125_000.0,
            UnitBase::Binary => 131_072.0,
        }
    }
}

/// How a transfer rate is rendered while and after it is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateDisplay {
    /// `12.34 Mbps`
    #[default]
    Mbps,
    /// `1.54 MB/s` (or MiB/s for a binary unit base)
    Bytes,
}

/// Result output mode selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Interactive output with progress spinners
    #[default]
    Standard,
    /// Single summary block per server
    Simple,
    /// CSV rows on stdout
    Csv,
    /// JSON array on stdout
    Json,
}

impl OutputMode {
    /// Modes that write machine-readable or minimal output suppress progress
    pub fn is_silent(&self) -> bool {
        !matches!(self, OutputMode::Standard)
    }
}
