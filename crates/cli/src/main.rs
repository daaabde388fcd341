//! specrun CLI - Main Entry Point
//!
//! Runs Jasmine spec files in a headless browser and exits with the run's
//! verdict: 0 when the specs pass, 1 when the run fails, 2 when it could not
//! be started.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use specrun_common::{KeepRunner, RunOptions, VendorSpec};
use specrun_runner::TestRunner;

mod output;

/// specrun - Jasmine specs in a headless browser
#[derive(Parser, Debug)]
#[command(name = "specrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Spec files, loaded in the order given
    files: Vec<PathBuf>,

    /// Options file (TOML, camelCase keys)
    #[arg(short, long, default_value = "specrun.toml")]
    config: PathBuf,

    /// Port for the harness server (0 = pick a free port)
    #[arg(long, env = "SPECRUN_PORT")]
    port: Option<u16>,

    /// Extra directory to serve files from (repeatable)
    #[arg(long = "server-root")]
    server_roots: Vec<PathBuf>,

    /// Vendor script path, glob or URL (repeatable)
    #[arg(long)]
    vendor: Vec<String>,

    /// Jasmine version to load
    #[arg(long)]
    jasmine_version: Option<String>,

    /// Directory holding the jasmine-<version> asset folders
    #[arg(long)]
    framework_root: Option<PathBuf>,

    /// RequireJS source to inline into the harness
    #[arg(long)]
    require_js: Option<PathBuf>,

    /// Runner script handed to the browser
    #[arg(long)]
    runner: Option<PathBuf>,

    /// Serve this pre-built harness instead of generating one
    #[arg(long)]
    spec_html: Option<PathBuf>,

    /// Keep the generated harness, optionally in DIR
    #[arg(long, value_name = "DIR", num_args = 0..=1)]
    keep_runner: Option<Option<PathBuf>>,

    /// Fail the run when any spec fails
    #[arg(long)]
    abort_on_fail: bool,

    /// Only serve the harness; do not launch a browser
    #[arg(long)]
    just_server: bool,

    /// Headless browser executable
    #[arg(long, env = "SPECRUN_BROWSER")]
    browser: Option<String>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Summary format
    #[arg(long, default_value = "plain")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer the flags over the options loaded from the config file
    fn apply(&self, options: &mut RunOptions) {
        if let Some(port) = self.port {
            options.port = Some(port);
        }
        if !self.server_roots.is_empty() {
            options.server_roots = self.server_roots.clone();
        }
        if !self.vendor.is_empty() {
            options.vendor = Some(VendorSpec::Many(self.vendor.clone()));
        }
        if let Some(version) = &self.jasmine_version {
            options.jasmine_version = Some(version.clone());
        }
        if let Some(root) = &self.framework_root {
            options.framework_root = Some(root.clone());
        }
        if let Some(path) = &self.require_js {
            options.require_js = Some(path.clone());
        }
        if let Some(runner) = &self.runner {
            options.runner = Some(runner.clone());
        }
        if let Some(spec_html) = &self.spec_html {
            options.spec_html = Some(spec_html.clone());
        }
        match &self.keep_runner {
            Some(Some(dir)) => options.keep_runner = KeepRunner::Directory(dir.clone()),
            Some(None) => options.keep_runner = KeepRunner::Flag(true),
            None => {}
        }
        if let Some(browser) = &self.browser {
            options.browser = Some(browser.clone());
        }
        options.abort_on_fail |= self.abort_on_fail;
        options.just_server |= self.just_server;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the browser console
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("Error: {:#}", e));
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut options = RunOptions::load(&cli.config)?;
    cli.apply(&mut options);

    let cwd = std::env::current_dir()?;
    let config = options.into_configuration(&cwd)?;
    let serve_only = config.serve_only;
    let runner = TestRunner::new(config);

    let report = tokio::select! {
        report = runner.run(&cli.files) => report?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            return Ok(if serve_only { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }
    };

    if let Some(path) = &cli.report {
        report.write_json(path)?;
    }
    output::print_report(&report, cli.format);

    Ok(ExitCode::from(report.exit_code as u8))
}
