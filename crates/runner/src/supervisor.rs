//! Headless browser process supervision

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use specrun_common::{Error, Result};

/// One event from the supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Emitted once, after both streams have closed. `None` when the process
    /// was killed by a signal or could not be reaped.
    Exited(Option<i32>),
}

/// Everything the process wrote, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// A launched process and its merged line stream
pub struct SupervisedProcess {
    program: PathBuf,
    child: Child,
    lines: mpsc::UnboundedReceiver<(Stream, String)>,
    output: ProcessOutput,
    exited: bool,
}

/// Resolve the browser executable.
///
/// A bare name is looked up on `PATH` first, then in the project's
/// `node_modules/.bin`. Names containing a path separator are taken as a
/// path relative to `cwd`.
pub fn locate_browser(name: &str, cwd: &Path) -> Result<PathBuf> {
    if name.contains(['/', '\\']) {
        let path = cwd.join(name);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::BrowserNotFound {
            name: name.to_string(),
        });
    }

    let executable = executable_name(name);

    if let Some(path) = find_in_path(&executable) {
        debug!("Using {} from PATH: {}", name, path.display());
        return Ok(path);
    }

    let local = cwd.join("node_modules").join(".bin").join(&executable);
    if local.is_file() {
        warn!(
            "Global {} not found, using {}",
            name,
            local.display()
        );
        return Ok(local);
    }

    Err(Error::BrowserNotFound {
        name: name.to_string(),
    })
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.cmd", name)
    } else {
        name.to_string()
    }
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for segment in std::env::split_paths(&path_var) {
        let candidate = segment.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

impl SupervisedProcess {
    /// Spawn `program` with `args`, capturing stdout and stderr line by line
    pub fn launch(program: &Path, args: &[String], cwd: &Path) -> Result<Self> {
        info!("Launching {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_path_buf(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, Stream::Stderr, tx);
        }

        Ok(Self {
            program: program.to_path_buf(),
            child,
            lines: rx,
            output: ProcessOutput::default(),
            exited: false,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next line or the exit event; `None` after `Exited` was returned
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.exited {
            return None;
        }

        match self.lines.recv().await {
            Some((Stream::Stdout, line)) => {
                push_line(&mut self.output.stdout, &line);
                Some(ProcessEvent::Stdout(line))
            }
            Some((Stream::Stderr, line)) => {
                push_line(&mut self.output.stderr, &line);
                Some(ProcessEvent::Stderr(line))
            }
            None => Some(ProcessEvent::Exited(self.reap().await)),
        }
    }

    /// Drain the process after a verdict: give it `grace` to exit on its own,
    /// then kill it. Returns the captured output.
    pub async fn finish(mut self, grace: Duration) -> ProcessOutput {
        let drained = tokio::time::timeout(grace, async {
            while let Some(event) = self.next_event().await {
                if let ProcessEvent::Stdout(line) | ProcessEvent::Stderr(line) = event {
                    debug!("(after verdict) {}", line);
                }
            }
        })
        .await;

        if drained.is_err() {
            self.terminate().await;
        }
        self.output
    }

    /// Output captured so far
    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    pub fn into_output(self) -> ProcessOutput {
        self.output
    }

    /// Kill the process and reap it. A no-op once it has exited.
    pub async fn terminate(&mut self) {
        if self.exited {
            return;
        }
        info!("Terminating {}", self.program.display());
        if let Err(e) = self.child.start_kill() {
            debug!("Kill failed (already exited?): {}", e);
        }
        self.reap().await;
    }

    async fn reap(&mut self) -> Option<i32> {
        self.exited = true;
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait for {}: {}", self.program.display(), e);
                None
            }
        };
        self.output.exit_code = code;
        debug!("{} exited with {:?}", self.program.display(), code);
        code
    }
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // Browsers may print arbitrary bytes; never stop reading over them
                    let line = decode_line(&buf);
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Error reading process output: {}", e);
                    break;
                }
            }
        }
    });
}

/// Lossy UTF-8 line without its terminator
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}
