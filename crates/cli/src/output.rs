//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;

use specrun_runner::{RunReport, RunResult};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// One-line human-readable summary
    #[default]
    Plain,
    /// Full run report as JSON
    Json,
}

/// Print the summary of a finished run
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(report).unwrap_or_default()
            );
        }
        OutputFormat::Plain => match &report.result {
            RunResult::Success => {
                print_success(&format!("Specs passed ({} ms)", report.duration_ms));
            }
            RunResult::Failure(cause) => {
                print_error(&format!("{} ({} ms)", cause, report.duration_ms));
            }
        },
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message.red());
}
