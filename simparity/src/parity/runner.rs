// src/parity/runner.rs
//
// Command runner: executes one external command under `sh -c` with a working
// directory and a wall-clock timeout, capturing exit status, stdout and stderr.
//
// The orchestrator only depends on the `CommandRunner` trait, so tests can
// swap in a stub that fabricates artifacts without spawning processes.
//
// Constraints:
// - The timeout bounds the whole call, including draining stdout/stderr.
//   Background processes holding the pipes open count against it.
// - The running command's process group is recorded so an interrupt handler
//   can take it down (`kill_active_process_group`).

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Default poll interval while waiting on a child process.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Process group of the command currently running under a `ShellRunner`
/// (0 when idle).
static ACTIVE_GROUP: AtomicU32 = AtomicU32::new(0);

/// Outcome of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Wall time from spawn to exit.
    pub elapsed_ms: u64,
}

impl RunResult {
    /// Build a result from already-captured streams.
    pub fn new(exit_code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            elapsed_ms: 0,
        }
    }

    /// A run succeeded iff it exited 0 and printed the success marker.
    pub fn is_success(&self, marker: &str) -> bool {
        self.exit_code == Some(0) && self.stdout.contains(marker)
    }

    /// The last `max_chars` characters of stdout.
    pub fn stdout_tail(&self, max_chars: usize) -> &str {
        tail_chars(&self.stdout, max_chars)
    }
}

/// Return the last `max_chars` characters of `text` (char-boundary safe).
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Errors raised by a command runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("process exceeded timeout of {timeout:?}")]
    TimeoutExceeded { timeout: Duration },
    #[error("failed waiting on process: {0}")]
    Wait(#[source] io::Error),
    #[error("failed capturing {stream}: {source}")]
    Capture {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{stream} reader thread panicked")]
    ReaderPanicked { stream: &'static str },
}

/// Capability to invoke an external command.
pub trait CommandRunner {
    /// Run `command` rooted at `working_dir`, bounded by `timeout`.
    ///
    /// Exactly one attempt is made; retry policy belongs to the caller.
    fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<RunResult, RunnerError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<RunResult, RunnerError> {
        (**self).run(command, working_dir, timeout)
    }
}

/// Production runner: `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
    poll_interval: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("sh"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ShellRunner {
    /// Use a specific shell binary instead of `sh`.
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            ..Self::default()
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<RunResult, RunnerError> {
        let started_at = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let _group = ActiveGroup::register(child.id());
        debug!(pid = child.id(), command, cwd = %working_dir.display(), "spawned");

        let deadline = started_at + timeout;
        let (tx, rx) = mpsc::channel();
        spawn_reader("stdout", child.stdout.take(), tx.clone());
        spawn_reader("stderr", child.stderr.take(), tx);

        let status = match wait_until(&mut child, deadline, self.poll_interval)? {
            Some(status) => status,
            None => {
                warn!(command, ?timeout, "process timed out; killed");
                return Err(RunnerError::TimeoutExceeded { timeout });
            }
        };

        let (stdout, stderr) = match collect_output(&rx, deadline)? {
            Some(streams) => streams,
            None => {
                // The shell exited but something it started still holds the pipes.
                terminate_and_reap(&mut child);
                warn!(command, ?timeout, "output not drained before timeout; process group killed");
                return Err(RunnerError::TimeoutExceeded { timeout });
            }
        };
        let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(exit_code = ?status.code(), elapsed_ms, "process exited");

        Ok(RunResult {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed_ms,
        })
    }
}

/// Kill the process group of the command currently running, if any.
///
/// Safe to call from a signal-handling thread. Returns the group id that was
/// signalled.
pub fn kill_active_process_group() -> Option<u32> {
    let group = ACTIVE_GROUP.swap(0, Ordering::SeqCst);
    if group == 0 {
        return None;
    }
    kill_group(group);
    Some(group)
}

/// Records the running command's process group for the lifetime of one run.
struct ActiveGroup(u32);

impl ActiveGroup {
    fn register(pid: u32) -> Self {
        ACTIVE_GROUP.store(pid, Ordering::SeqCst);
        Self(pid)
    }
}

impl Drop for ActiveGroup {
    fn drop(&mut self) {
        let _ = ACTIVE_GROUP.compare_exchange(self.0, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// Poll the child until it exits or `deadline` passes.
///
/// Returns `Ok(None)` after killing and reaping a child that ran too long.
fn wait_until(
    child: &mut Child,
    deadline: Instant,
    poll_interval: Duration,
) -> Result<Option<ExitStatus>, RunnerError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if Instant::now() >= deadline {
                    terminate_and_reap(child);
                    return Ok(None);
                }
                thread::sleep(poll_interval);
            }
            Err(error) => {
                terminate_and_reap(child);
                return Err(RunnerError::Wait(error));
            }
        }
    }
}

/// Wait for both reader threads, giving up at `deadline`.
///
/// Returns `Ok(None)` when the deadline passes first.
fn collect_output(
    rx: &Receiver<ReaderMessage>,
    deadline: Instant,
) -> Result<Option<(String, String)>, RunnerError> {
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (stream, captured) = match rx.recv_timeout(remaining) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                let stream = if stdout.is_none() { "stdout" } else { "stderr" };
                return Err(RunnerError::ReaderPanicked { stream });
            }
        };
        let text = captured.map_err(|source| RunnerError::Capture { stream, source })?;
        match stream {
            "stdout" => stdout = Some(text),
            _ => stderr = Some(text),
        }
    }
    Ok(stdout.zip(stderr))
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

fn terminate_and_reap(child: &mut Child) {
    // The launcher forks workers; take the whole group down with it.
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(group: u32) {
    let _ = Command::new("kill")
        .arg("-KILL")
        .arg(format!("-{group}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_group(_group: u32) {}

type ReaderMessage = (&'static str, io::Result<String>);

/// Drain `stream` on its own thread and send the text back tagged with its name.
fn spawn_reader<T>(name: &'static str, stream: Option<T>, tx: Sender<ReaderMessage>)
where
    T: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let captured = match stream {
            Some(mut stream) => stream
                .read_to_end(&mut buf)
                .map(|_| String::from_utf8_lossy(&buf).into_owned()),
            None => Ok(String::new()),
        };
        // The receiver is gone once the run has timed out.
        let _ = tx.send((name, captured));
    });
}
