//! Non-fatal configuration checks

use crate::{error::Result, models::Config, telemetry::TelemetryLevel, types::OutputMode};
use colored::*;

/// Above this many streams the server, not the link, tends to be measured
const HIGH_CONCURRENCY: usize = 16;

/// Configuration validator producing warnings on top of `Config::validate`
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run `Config::validate` and collect warnings for questionable settings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_transfer_settings(config));
        warnings.extend(Self::validate_network_settings(config));
        warnings.extend(Self::validate_telemetry_settings(config));
        Ok(warnings)
    }

    fn validate_transfer_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.no_pre_allocate && !config.no_upload {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Upload data is generated on the fly; results may be lower on slow CPUs".to_string(),
            ));
        }

        if config.concurrency > HIGH_CONCURRENCY {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} concurrent streams may saturate the server before the link",
                    config.concurrency
                ),
            ));
        }

        if config.duration_secs < 5 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Test duration of {}s leaves little time after the ramp-up; results may be low",
                    config.duration_secs
                ),
            ));
        }

        if config.no_download && config.no_upload {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Both transfer tests are disabled; only latency will be measured".to_string(),
            ));
        }

        warnings
    }

    fn validate_network_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.timeout_secs < 3 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Timeout of {}s may abort slow transfers", config.timeout_secs),
            ));
        }

        if config.timeout_secs < config.duration_secs {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Timeout ({}s) is shorter than the test duration ({}s); long transfers are restarted",
                    config.timeout_secs, config.duration_secs
                ),
            ));
        }

        if config.skip_cert_verify {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "TLS certificate verification is disabled".to_string(),
            ));
        }

        warnings
    }

    fn validate_telemetry_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.telemetry.level >= TelemetryLevel::Full {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Telemetry level '{}' submits timing logs with results", config.telemetry.level),
            ));
        }

        if !config.telemetry_enabled() && config.output == OutputMode::Standard && !config.telemetry_extra.is_empty() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Telemetry extra data is ignored while telemetry is disabled".to_string(),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if !use_color {
            return format!("{} {}", tag, self.message);
        }

        let tag = match self.level {
            ValidationLevel::Info => tag.blue(),
            ValidationLevel::Warning => tag.yellow(),
            ValidationLevel::Error => tag.red(),
        };
        format!("{} {}", tag, self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_warnings() {
        let warnings = validate_config(&Config::default()).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let config = Config { concurrency: 0, ..Default::default() };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_transfer_warnings() {
        let config = Config {
            no_pre_allocate: true,
            concurrency: 32,
            duration_secs: 2,
            ..Default::default()
        };
        let warnings = validate_config(&config).unwrap();
        assert_eq!(
            warnings.iter().filter(|w| w.level == ValidationLevel::Warning).count(),
            3
        );

        // no upload, no payload warning
        let config = Config { no_pre_allocate: true, no_upload: true, ..Default::default() };
        assert!(validate_config(&config).unwrap().is_empty());
    }

    #[test]
    fn test_network_warnings() {
        let config = Config {
            timeout_secs: 2,
            skip_cert_verify: true,
            ..Default::default()
        };
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("may abort slow transfers")));
        assert!(warnings.iter().any(|w| w.message.contains("verification is disabled")));
        assert!(warnings.iter().any(|w| w.level == ValidationLevel::Info));
    }

    #[test]
    fn test_warning_format() {
        let warning = ValidationWarning::new(ValidationLevel::Warning, "careful".to_string());
        assert_eq!(warning.format(false), "[WARNING] careful");
    }
}
