//! Error handling for the network speed tester
//!
//! Transport failures inside a test (a dropped stream, a failed ICMP probe)
//! are recovered where they happen and never reach this type. What does
//! reach it either aborts the run or, when [`AppError::is_fatal`] is false,
//! only the test against the current server.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success status or a broken response body
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed URLs, JSON or addresses
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Every probe method against a server failed, or no server answered
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// The OS could not supply random payload data
    #[error("Random source unavailable: {0}")]
    RandomSource(String),

    /// No server produced a result
    #[error("Test execution error: {0}")]
    TestExecution(String),

    /// Result submission or share link failures
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    pub fn unreachable<S: Into<String>>(message: S) -> Self {
        Self::Unreachable(message.into())
    }

    pub fn random_source<S: Into<String>>(message: S) -> Self {
        Self::RandomSource(message.into())
    }

    pub fn test_execution<S: Into<String>>(message: S) -> Self {
        Self::TestExecution(message.into())
    }

    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Short tag used in log fields and console output
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Unreachable(_) => "UNREACHABLE",
            Self::RandomSource(_) => "RANDOM",
            Self::TestExecution(_) => "TEST",
            Self::Telemetry(_) => "TELEMETRY",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether trying again later could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) | Self::Unreachable(_) | Self::Telemetry(_)
        )
    }

    /// Errors after which no further test traffic can be produced
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RandomSource(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Network(_) | Self::HttpRequest(_) | Self::Unreachable(_) => 2,
            Self::Timeout(_) => 3,
            Self::Io(_) => 5,
            Self::TestExecution(_) | Self::Telemetry(_) => 6,
            // EX_SOFTWARE
            Self::RandomSource(_) => 70,
            Self::Internal(_) => 99,
        }
    }

    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if !use_color {
            return format!("[{}] {}", category, message);
        }

        use colored::Colorize;
        let (category, message) = match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => (category.red().bold(), message.red()),
            Self::Network(_) | Self::HttpRequest(_) | Self::Unreachable(_) => {
                (category.yellow().bold(), message.yellow())
            }
            Self::Timeout(_) => (category.blue().bold(), message.blue()),
            Self::Io(_) | Self::TestExecution(_) | Self::Telemetry(_) => (category.cyan().bold(), message.cyan()),
            Self::RandomSource(_) | Self::Internal(_) => (category.bright_red().bold(), message.bright_red()),
        };
        format!("[{}] {}", category, message)
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
