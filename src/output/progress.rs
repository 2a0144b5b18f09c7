//! Live progress display while a test phase runs

use colored::*;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spinner frame interval
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);

const FRAMES: [char; 8] = ['⣾', '⣽', '⣻', '⢿', '⡿', '⣟', '⣯', '⣷'];

/// Receives the running rate of a transfer test
pub trait ProgressSink: Send + Sync {
    fn update(&self, status: &str);
}

/// Sink for silent output modes
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn update(&self, _status: &str) {}
}

#[derive(Debug, Default)]
struct SpinnerState {
    prefix: String,
    status: String,
    frame: usize,
}

/// Spinner on stderr showing a prefix and the latest status
pub struct ConsoleProgress {
    state: Arc<Mutex<SpinnerState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleProgress {
    /// Start drawing; must be called inside a tokio runtime
    pub fn start(prefix: &str, use_color: bool) -> Self {
        let state = Arc::new(Mutex::new(SpinnerState {
            prefix: prefix.to_string(),
            ..Default::default()
        }));

        let drawing = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            loop {
                ticker.tick().await;
                let line = {
                    let mut state = drawing.lock();
                    state.frame = (state.frame + 1) % FRAMES.len();
                    render(&state, use_color)
                };
                let mut stderr = io::stderr();
                let _ = write!(stderr, "\r\x1b[2K{}", line);
                let _ = stderr.flush();
            }
        });

        Self {
            state,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the spinner and print `message` to stdout
    pub fn finish(&self, message: &str) {
        self.stop();
        println!("{}", message);
    }

    fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            let mut stderr = io::stderr();
            let _ = write!(stderr, "\r\x1b[2K");
            let _ = stderr.flush();
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn update(&self, status: &str) {
        self.state.lock().status = status.to_string();
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render(state: &SpinnerState, use_color: bool) -> String {
    let frame = FRAMES[state.frame % FRAMES.len()];
    let status = if state.status.is_empty() {
        String::new()
    } else {
        format!("  {}", state.status)
    };

    if use_color {
        format!("{} {}{}", frame.to_string().cyan(), state.prefix.bold(), status)
    } else {
        format!("{} {}{}", frame, state.prefix, status)
    }
}
