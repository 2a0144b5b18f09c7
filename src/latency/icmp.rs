//! ICMP echo through the system `ping` utility
//!
//! Raw ICMP sockets need privileges the tool usually does not have, while the
//! platform `ping` binary is set up to send echoes for unprivileged users.

use super::ProbeOptions;
use crate::error::{AppError, Result};
use crate::types::IpFamily;
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Source of echo round-trip samples, in milliseconds
#[async_trait]
pub trait EchoProbe: Send + Sync {
    async fn echo(&self, host: &str, count: usize, options: &ProbeOptions) -> Result<Vec<f64>>;
}

/// Runs the platform `ping` command and parses its per-reply lines
#[derive(Debug, Clone, Default)]
pub struct SystemPing;

#[async_trait]
impl EchoProbe for SystemPing {
    async fn echo(&self, host: &str, count: usize, options: &ProbeOptions) -> Result<Vec<f64>> {
        let (program, args) = ping_command(host, count, options);
        let mut command = Command::new(program);
        command.args(&args);

        // one second per echo, like the default send interval
        let limit = Duration::from_secs(count.max(1) as u64);
        collect_samples(command, limit).await
    }
}

/// Run a ping command and gather reply times as they are printed.
///
/// When `limit` expires the command is killed and the replies seen so far
/// are returned; only a run without any reply is an error.
pub async fn collect_samples(mut command: Command, limit: Duration) -> Result<Vec<f64>> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AppError::io(format!("Cannot run {}: {}", program, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::internal(format!("{} stdout was not captured", program)))?;
    let mut lines = BufReader::new(stdout).lines();
    let mut samples = Vec::new();

    let deadline = tokio::time::sleep(limit);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                let _ = child.kill().await;
                if samples.is_empty() {
                    return Err(AppError::timeout(format!(
                        "{} got no reply within {:?}",
                        program, limit
                    )));
                }
                return Ok(samples);
            }
            line = lines.next_line() => match line? {
                Some(line) => samples.extend(parse_sample(&line)),
                None => break,
            },
        }
    }

    let output = child.wait_with_output().await?;
    if samples.is_empty() && !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::network(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(samples)
}

fn time_pattern() -> Option<&'static Regex> {
    static TIME: OnceLock<Option<Regex>> = OnceLock::new();
    TIME.get_or_init(|| Regex::new(r"time[=<]\s*([\d.]+)\s*ms").ok()).as_ref()
}

/// Reply time of one `time=12.3 ms` style line
pub fn parse_sample(line: &str) -> Option<f64> {
    time_pattern()?.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Extract every reply time from complete ping output
pub fn parse_samples(output: &str) -> Vec<f64> {
    output.lines().filter_map(parse_sample).collect()
}

#[cfg(windows)]
fn ping_command(host: &str, count: usize, options: &ProbeOptions) -> (&'static str, Vec<String>) {
    let mut args = vec!["-n".to_string(), count.to_string(), "-w".to_string(), "1000".to_string()];
    if let Some(source) = options.source {
        args.push("-S".to_string());
        args.push(source.to_string());
    }
    match options.family {
        IpFamily::V4 => args.push("-4".to_string()),
        IpFamily::V6 => args.push("-6".to_string()),
        IpFamily::Any => {}
    }
    args.push(host.to_string());
    ("ping", args)
}

#[cfg(not(windows))]
fn ping_command(host: &str, count: usize, options: &ProbeOptions) -> (&'static str, Vec<String>) {
    let mut args = vec!["-c".to_string(), count.to_string()];
    if let Some(source) = options.source {
        args.push(if cfg!(target_os = "macos") { "-S" } else { "-I" }.to_string());
        args.push(source.to_string());
    }

    let mut program = "ping";
    match options.family {
        IpFamily::V6 if cfg!(target_os = "macos") => program = "ping6",
        IpFamily::V4 if !cfg!(target_os = "macos") => args.push("-4".to_string()),
        IpFamily::V6 => args.push("-6".to_string()),
        _ => {}
    }
    args.push(host.to_string());
    (program, args)
}
