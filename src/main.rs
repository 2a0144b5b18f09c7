//! Network Speed Tester - command-line entry point

use clap::Parser;
use network_speed_tester::{app::App, cli::Cli, error::AppError};
use std::{error::Error, process};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue together with the command line used.");
        process::exit(1);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));

        if let Some(source) = e.source() {
            eprintln!("Caused by: {}", source);
        }

        print_error_suggestions(&e);

        process::exit(e.exit_code());
    }
}

/// Main application logic
async fn run_application(cli: Cli) -> Result<(), AppError> {
    App::new(cli)?.run().await
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file and SPEEDTEST_* variables");
            eprintln!("  - --server and --exclude cannot be combined");
            eprintln!("  - --source must be an address of the selected IP family");
        }
        AppError::Network(_) | AppError::HttpRequest(_) => {
            eprintln!();
            eprintln!("Network troubleshooting:");
            eprintln!("  - Check your internet connection");
            eprintln!("  - Try a local server list with --local-json");
            eprintln!("  - Increase the timeout with --timeout");
        }
        AppError::Unreachable(_) => {
            eprintln!();
            eprintln!("No server answered:");
            eprintln!("  - Run with --list to see available servers");
            eprintln!("  - Pick a server explicitly with --server <id>");
            eprintln!("  - Use --no-icmp if ICMP is blocked on your network");
        }
        AppError::RandomSource(_) => {
            eprintln!();
            eprintln!("The system random source is unavailable; upload data cannot be generated.");
        }
        _ => {}
    }
}
