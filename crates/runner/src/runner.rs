//! Run orchestration: harness, server, browser, verdict
//!
//! [`TestRunner::run`] drives exactly one run:
//!
//! 1. write the harness document (or validate the caller's pre-built one)
//! 2. start the ephemeral server
//! 3. launch the browser against the server URL
//! 4. feed its output to the [`ResultInterpreter`] until a verdict
//! 5. stop the server, then delete the harness unless it is kept

use serde::Serialize;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, error, info, warn};

use specrun_common::config::HARNESS_FILE_NAME;
use specrun_common::{Error, HarnessSource, Result, RunConfiguration};
use specrun_web::{ServerConfig, ServerSession};

use crate::harness::HarnessDocument;
use crate::interpreter::{FailureCause, ResultInterpreter, RunResult, Verdict};
use crate::supervisor::{locate_browser, ProcessEvent, ProcessOutput, SupervisedProcess};

/// PhantomJS script used when no runner is configured
pub const RUNNER_SCRIPT: &str = include_str!("../assets/jasmine-runner.js");

/// How long the browser may keep running after the verdict
const FINISH_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one run, with the context needed to diagnose it
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result: RunResult,
    pub exit_code: i32,
    pub url: String,
    pub duration_ms: u64,
    pub output: ProcessOutput,
}

impl RunReport {
    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Report written to: {}", path.display());
        Ok(())
    }
}

/// The harness document served for one run
struct PreparedHarness {
    path: PathBuf,
    /// Holds a generated, unkept document; dropping it deletes the file
    temp: Option<TempDir>,
}

impl PreparedHarness {
    fn cleanup(self) {
        if let Some(dir) = self.temp {
            match dir.close() {
                Ok(()) => debug!("Removed harness {}", self.path.display()),
                Err(e) => warn!("Failed to remove harness {}: {}", self.path.display(), e),
            }
        }
    }
}

/// The runner script handed to the browser
struct RunnerScript {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

/// Drives test runs for one configuration
pub struct TestRunner {
    config: RunConfiguration,
}

impl TestRunner {
    pub fn new(config: RunConfiguration) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// Run `spec_files` in the browser and interpret the result.
    ///
    /// In serve-only mode this never returns a report: it serves until the
    /// server fails or the future is dropped.
    pub async fn run(&self, spec_files: &[PathBuf]) -> Result<RunReport> {
        if self.config.serve_only {
            match self.serve(spec_files).await? {}
        }

        let start = Instant::now();

        let browser = locate_browser(&self.config.browser, &self.config.cwd)?;
        let runner = self.runner_script()?;
        let options = self.config.launch_options_json()?;
        let harness = self.prepare_harness(spec_files)?;

        let mut server = match self.start_server(&harness.path).await {
            Ok(server) => server,
            Err(e) => {
                harness.cleanup();
                return Err(e);
            }
        };
        let url = server.url();

        let args = vec![runner.path.to_string_lossy().into_owned(), url.clone(), options];
        let outcome = self.supervise(&browser, &args).await;

        if let Err(e) = server.stop().await {
            warn!("Server did not stop cleanly: {}", e);
        }
        harness.cleanup();

        let (result, output) = outcome?;
        log_result(&result, &output, &url);

        Ok(RunReport {
            exit_code: result.exit_code(),
            result,
            url,
            duration_ms: start.elapsed().as_millis() as u64,
            output,
        })
    }

    /// Serve the harness without launching a browser.
    ///
    /// Only returns if serving fails; the run never completes on its own.
    pub async fn serve(&self, spec_files: &[PathBuf]) -> Result<Infallible> {
        let harness = self.prepare_harness(spec_files)?;
        let mut server = self.start_server(&harness.path).await?;
        info!("Jasmine server run on {}", server.url());

        let outcome = server.wait().await;
        drop(server);
        harness.cleanup();

        outcome?;
        Err(Error::Server("server exited unexpectedly".to_string()))
    }

    async fn supervise(&self, browser: &Path, args: &[String]) -> Result<(RunResult, ProcessOutput)> {
        let mut process = SupervisedProcess::launch(browser, args, &self.config.cwd)?;
        let mut interpreter = ResultInterpreter::new(self.config.abort_on_fail);

        while let Some(event) = process.next_event().await {
            let verdict = match event {
                ProcessEvent::Stdout(line) => {
                    println!("{}", line);
                    interpreter.observe_line(&line)
                }
                ProcessEvent::Stderr(line) => {
                    error!("{}", line);
                    interpreter.observe_page_error(&line)
                }
                ProcessEvent::Exited(code) => {
                    let result = interpreter.observe_exit(code);
                    return Ok((result, process.into_output()));
                }
            };

            if let Verdict::Terminal(result) = verdict {
                let output = process.finish(FINISH_GRACE).await;
                return Ok((result, output));
            }
        }

        let result = interpreter.observe_exit(process.output().exit_code);
        Ok((result, process.into_output()))
    }

    async fn start_server(&self, entry_document: &Path) -> Result<ServerSession> {
        ServerSession::start(ServerConfig {
            port: self.config.port,
            roots: self.config.roots.anchored(&self.config.cwd),
            entry_document: entry_document.to_path_buf(),
            favicon: Some(self.config.framework.favicon()),
        })
        .await
    }

    fn prepare_harness(&self, spec_files: &[PathBuf]) -> Result<PreparedHarness> {
        match &self.config.harness {
            HarnessSource::Prebuilt(path) => {
                if !path.is_file() {
                    return Err(Error::InvalidConfig(format!(
                        "specHtml {} does not exist",
                        path.display()
                    )));
                }
                info!("Using pre-built harness {}", path.display());
                Ok(PreparedHarness {
                    path: path.clone(),
                    temp: None,
                })
            }
            HarnessSource::Generate { keep } => {
                let spec_files: Vec<PathBuf> =
                    spec_files.iter().map(|p| self.config.cwd.join(p)).collect();
                let document = HarnessDocument::assemble(&self.config, &spec_files)?;

                let (path, temp) = match keep {
                    Some(path) => (path.clone(), None),
                    None => {
                        let dir = tempfile::Builder::new().prefix("specrun-").tempdir()?;
                        (dir.path().join(HARNESS_FILE_NAME), Some(dir))
                    }
                };
                document.write_to(&path)?;
                Ok(PreparedHarness { path, temp })
            }
        }
    }

    fn runner_script(&self) -> Result<RunnerScript> {
        if let Some(path) = &self.config.runner {
            return Ok(RunnerScript {
                path: path.clone(),
                _temp: None,
            });
        }

        let mut file = tempfile::Builder::new()
            .prefix("jasmine-runner-")
            .suffix(".js")
            .tempfile()?;
        std::io::Write::write_all(&mut file, RUNNER_SCRIPT.as_bytes())?;
        Ok(RunnerScript {
            path: file.path().to_path_buf(),
            _temp: Some(file),
        })
    }
}

fn log_result(result: &RunResult, output: &ProcessOutput, url: &str) {
    match result {
        RunResult::Success => info!("Specs passed ({})", url),
        RunResult::Failure(cause) => {
            error!("Run failed: {}", cause);
            match cause {
                FailureCause::TestFailures { summary } => {
                    error!("Matched failure summary: {}", summary);
                }
                FailureCause::PageError { .. } => {
                    error!("Failed to open test runner {}", url);
                }
                FailureCause::ExitedWithoutCompleting { exit_code } => {
                    error!("Browser exit code: {:?}", exit_code);
                }
            }
            if !output.stderr.is_empty() {
                error!("stderr:\n{}", output.stderr.trim_end());
            }
        }
    }
}
