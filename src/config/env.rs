//! Environment variable and `.env` file handling

use crate::error::{AppError, Result};
use crate::telemetry::TelemetryLevel;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

/// Environment variables understood by the tester
const SUPPORTED_VARS: &[&str] = &[
    "SPEEDTEST_CONCURRENT",
    "SPEEDTEST_DURATION",
    "SPEEDTEST_CHUNKS",
    "SPEEDTEST_UPLOAD_SIZE",
    "SPEEDTEST_TIMEOUT",
    "SPEEDTEST_SERVER_JSON",
    "SPEEDTEST_SOURCE",
    "SPEEDTEST_NO_ICMP",
    "SPEEDTEST_SECURE",
    "SPEEDTEST_TELEMETRY_LEVEL",
    "SPEEDTEST_ENABLE_COLOR",
];

/// Largest stream count accepted from the environment
const MAX_ENV_CONCURRENCY: u64 = 64;

/// Environment variable manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if present
    pub fn load_env_file(debug: bool) -> Result<()> {
        if Path::new(".env").exists() {
            dotenv::from_filename(".env")
                .map_err(|e| AppError::config(format!("Failed to load .env file: {}", e)))?;

            if debug {
                eprintln!("Loaded configuration from .env file");
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Warnings for set variables that fail validation
    pub fn validate_current_env() -> Vec<String> {
        SUPPORTED_VARS
            .iter()
            .filter_map(|var| {
                let value = std::env::var(var).ok()?;
                Self::validate_env_var(var, value.trim())
                    .err()
                    .map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Validate the lines of a `.env` file, `None` if it does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value.trim())
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();

        Ok(Some(warnings))
    }

    /// Check one variable's value; unknown keys are accepted
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "SPEEDTEST_CONCURRENT" => {
                let n = parse_positive(key, value)?;
                if n > MAX_ENV_CONCURRENCY {
                    return Err(AppError::config(format!(
                        "{} must be at most {}, got {}",
                        key, MAX_ENV_CONCURRENCY, n
                    )));
                }
            }
            "SPEEDTEST_DURATION" | "SPEEDTEST_CHUNKS" | "SPEEDTEST_UPLOAD_SIZE" | "SPEEDTEST_TIMEOUT" => {
                parse_positive(key, value)?;
            }
            "SPEEDTEST_SERVER_JSON" => {
                url::Url::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "SPEEDTEST_SOURCE" => {
                value
                    .parse::<IpAddr>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "SPEEDTEST_NO_ICMP" | "SPEEDTEST_SECURE" | "SPEEDTEST_ENABLE_COLOR" => {
                if !matches!(value, "true" | "false") {
                    return Err(AppError::config(format!(
                        "{} must be 'true' or 'false', got '{}'",
                        key, value
                    )));
                }
            }
            "SPEEDTEST_TELEMETRY_LEVEL" => {
                TelemetryLevel::from_str(value)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    let n: u64 = value
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
    if n == 0 {
        return Err(AppError::config(format!("{} must be greater than 0", key)));
    }
    Ok(n)
}
