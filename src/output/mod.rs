//! Output: live progress and final reports
//!
//! Progress spinners are drawn on stderr in standard mode only. Reports
//! (simple summaries, CSV rows, JSON arrays) go to stdout.

mod progress;
mod report;

pub use progress::{ConsoleProgress, NoopProgress, ProgressSink, FRAME_INTERVAL};
pub use report::{
    format_mbps, humanize_mbps, round2, simple_summary, CsvFormatter, CsvReport, JsonFormatter, JsonReport,
    ReportFormatter, ServerInfo,
};

use crate::types::OutputMode;

/// Picks the end-of-run report formatter for an output mode
pub struct ReportFormatterFactory;

impl ReportFormatterFactory {
    /// `None` for modes that print as they go
    pub fn create(mode: OutputMode, csv_delimiter: char) -> Option<Box<dyn ReportFormatter>> {
        match mode {
            OutputMode::Csv => Some(Box::new(CsvFormatter { delimiter: csv_delimiter })),
            OutputMode::Json => Some(Box::new(JsonFormatter)),
            OutputMode::Standard | OutputMode::Simple => None,
        }
    }
}
