//! Local command backend.
//!
//! Spawns the configured `PlantUML` command line for every render. Two
//! invocation modes are supported:
//! - piped: the source is written to the child's stdin and the artifact is
//!   read from its stdout
//! - file: the source is written to `src.puml` in a temporary directory and
//!   the artifact is read back from the sibling `src.<extension>`

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::{Backend, DiagramFormat, RenderError};

/// Interval between child status checks while waiting for a render.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Source file name used in file mode.
const SRC_FILE_NAME: &str = "src.puml";

/// Split a command line into program and arguments using shell word rules.
///
/// On Windows backslashes are converted to forward slashes first, since the
/// POSIX rules would treat them as escapes (`C:\foo` would become `C:foo`).
///
/// Returns `None` for an empty command or unbalanced quoting.
#[must_use]
pub fn split_command(command_line: &str) -> Option<Vec<String>> {
    let preprocessed = if cfg!(target_family = "windows") {
        command_line.replace('\\', "/")
    } else {
        command_line.to_owned()
    };

    let parts = shlex::split(&preprocessed)?;
    if parts.is_empty() {
        return None;
    }
    Some(parts)
}

/// Captured result of a finished child process.
struct CapturedOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl CapturedOutput {
    fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }
}

/// `PlantUML` invoked as a local program.
#[derive(Debug, Clone)]
pub struct ShellBackend {
    /// Program to run.
    program: String,
    /// Fixed arguments preceding the per-render ones.
    args: Vec<String>,
    /// Piped (`true`) or file (`false`) invocation.
    piped: bool,
    /// Deadline for a single invocation.
    timeout: Duration,
}

impl ShellBackend {
    /// Create a backend running `program` with its fixed `args`.
    #[must_use]
    pub fn new(program: String, args: Vec<String>, piped: bool, timeout: Duration) -> Self {
        tracing::info!(%program, ?args, piped, "selected PlantUML shell backend");
        Self {
            program,
            args,
            piped,
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    fn spawn(&self, mut command: Command) -> Result<Child, RenderError> {
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::Spawn {
                command: self.program.clone(),
                message: e.to_string(),
            })
    }

    /// Write the source to stdin and read the artifact from stdout.
    fn render_piped(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        let mut command = self.command();
        command
            .arg(format.flag())
            .arg("-nometadata")
            .arg("-pipe")
            .stdin(Stdio::piped());

        let mut child = self.spawn(command)?;
        if let Some(mut stdin) = child.stdin.take() {
            let source = source.to_owned();
            // Written from a separate thread so a child that never drains its
            // stdin still hits the deadline below.
            thread::spawn(move || {
                let _ = stdin.write_all(source.as_bytes());
            });
        }

        let output = wait_with_timeout(child, self.timeout)?;
        if !output.status.success() {
            tracing::error!(status = %output.status, "failed to render image in piped mode");
            return Err(RenderError::Exit {
                status: output.status.to_string(),
                stderr: output.stderr_lossy(),
            });
        }
        Ok(output.stdout)
    }

    /// Render through a temporary source file.
    fn render_file(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        let generation_dir = tempfile::tempdir().map_err(|e| RenderError::Io(e.to_string()))?;
        let src_file = generation_dir.path().join(SRC_FILE_NAME);
        fs::write(&src_file, source).map_err(|e| RenderError::Io(e.to_string()))?;

        let mut command = self.command();
        command
            .arg(format.flag())
            .arg("-nometadata")
            .arg(&src_file)
            .stdin(Stdio::null());

        let child = self.spawn(command)?;
        let output = wait_with_timeout(child, self.timeout)?;
        if !output.status.success() {
            tracing::error!(status = %output.status, "failed to render image in file mode");
            return Err(RenderError::Exit {
                status: output.status.to_string(),
                stderr: output.stderr_lossy(),
            });
        }

        let artifact = src_file.with_extension(format.extension());
        read_artifact(&artifact, &output)
    }
}

impl Backend for ShellBackend {
    fn render(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        tracing::debug!(%format, piped = self.piped, "rendering diagram with PlantUML shell");
        if self.piped {
            self.render_piped(source, format)
        } else {
            self.render_file(source, format)
        }
    }

    fn supports(&self, _format: DiagramFormat) -> bool {
        true
    }

    fn identify(&self) -> Result<String, RenderError> {
        let mut command = self.command();
        command.arg("-version").stdin(Stdio::null());

        let child = self.spawn(command)?;
        let output = wait_with_timeout(child, self.timeout)?;
        if !output.status.success() {
            return Err(RenderError::Exit {
                status: output.status.to_string(),
                stderr: output.stderr_lossy(),
            });
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_owned())
            .filter(|line| !line.is_empty())
            .ok_or_else(|| RenderError::Exit {
                status: output.status.to_string(),
                stderr: "no version information on stdout".to_owned(),
            })
    }
}

fn read_artifact(path: &Path, output: &CapturedOutput) -> Result<Vec<u8>, RenderError> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RenderError::MissingOutput {
            path: path.to_path_buf(),
            stderr: output.stderr_lossy(),
        }),
        Err(e) => Err(RenderError::Io(e.to_string())),
    }
}

/// Read `pipe` to its end on a separate thread.
///
/// The bytes arrive on the returned channel once every holder of the pipe's
/// write end (the child and anything it spawned) has closed it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = sender.send(buf);
    });
    receiver
}

fn timed_out(timeout: Duration) -> RenderError {
    tracing::warn!(?timeout, "PlantUML command timed out");
    RenderError::Timeout(timeout)
}

/// Collect a drained stream, waiting no later than `deadline`.
fn collect(
    stream: &mpsc::Receiver<Vec<u8>>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<u8>, RenderError> {
    match stream.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Ok(buf),
        Err(RecvTimeoutError::Timeout) => Err(timed_out(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(RenderError::Io("output reader stopped unexpectedly".to_owned()))
        }
    }
}

/// Wait for the child to exit and its output to close, killing it once
/// `timeout` has passed.
///
/// Both output streams are drained concurrently so a chatty child never
/// blocks on a full pipe. A process the child leaves behind holding the
/// pipes open counts against the same deadline; its reader threads are
/// abandoned.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<CapturedOutput, RenderError> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(RenderError::Io(e.to_string())),
        }
    };

    Ok(CapturedOutput {
        status,
        stdout: collect(&stdout, deadline, timeout)?,
        stderr: collect(&stderr, deadline, timeout)?,
    })
}
