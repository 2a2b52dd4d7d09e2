//! Subprocess invocation for the external toolchain.
//!
//! Every stage talks to AmberTools, Gaussian or GROMACS through a
//! [`ToolCommand`]. Blocking stages use [`run`]; the equilibration scheduler
//! uses [`run_async`] so several GPU workers can share one runtime. Gaussian
//! jobs are long-lived and started with [`spawn_detached`]; their completion
//! is observed later through the log files they write.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{PrepError, Result};

/// Captured output is capped to this many bytes (tail kept).
const MAX_OUTPUT: usize = 10 * 1024;

// ---------------------------------------------------------------------------
// ToolCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|a| {
                if a.contains(char::is_whitespace) {
                    format!("\"{a}\"")
                } else {
                    a.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_std(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }

    fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

// ---------------------------------------------------------------------------
// ToolOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    /// stdout and stderr joined, as tools like `genrestr` split their chatter across both.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Keep the tail of `text`, capped to `MAX_OUTPUT` bytes on a char boundary.
fn tail(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= MAX_OUTPUT {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX_OUTPUT;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

fn failure_detail(stdout: &str, stderr: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let detail = tail(source);
    // Error messages only need the last few lines.
    let lines: Vec<&str> = detail.lines().collect();
    let keep = lines.len().saturating_sub(20);
    lines[keep..].join("\n")
}

// ---------------------------------------------------------------------------
// Blocking execution
// ---------------------------------------------------------------------------

/// Run `cmd` to completion, capturing output. `None` timeout waits indefinitely.
///
/// stdout/stderr are drained on dedicated threads to avoid pipe-buffer
/// deadlocks; the timeout is enforced by a waiter thread and
/// `mpsc::recv_timeout`.
pub fn run(cmd: &ToolCommand, timeout: Option<Duration>) -> Result<ToolOutput> {
    let (status, stdout, stderr, duration_ms) = execute(cmd, timeout)?;
    if !status.success() {
        return Err(PrepError::ToolFailed {
            tool: cmd.program.clone(),
            code: status.code().unwrap_or(-1),
            detail: failure_detail(&stdout, &stderr),
        });
    }
    Ok(ToolOutput {
        stdout: tail(&stdout),
        stderr: tail(&stderr),
        duration_ms,
    })
}

/// Like [`run`] but a non-zero exit is not an error.
///
/// For interactive tools queried with canned stdin (`genrestr` listing its
/// index groups) that exit non-zero once the input runs out.
pub fn probe(cmd: &ToolCommand, timeout: Option<Duration>) -> Result<ToolOutput> {
    let (status, stdout, stderr, duration_ms) = execute(cmd, timeout)?;
    if !status.success() {
        tracing::debug!("{} exited with {:?}", cmd.program, status.code());
    }
    Ok(ToolOutput {
        stdout: tail(&stdout),
        stderr: tail(&stderr),
        duration_ms,
    })
}

fn execute(
    cmd: &ToolCommand,
    timeout: Option<Duration>,
) -> Result<(std::process::ExitStatus, String, String, u64)> {
    tracing::debug!("executing: {}", cmd.display());
    let start = Instant::now();

    let mut child = cmd
        .to_std()
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PrepError::ToolSpawn {
            tool: cmd.program.clone(),
            reason: e.to_string(),
        })?;

    let child_pid = child.id();

    let stdin_thread = match (child.stdin.take(), cmd.stdin.clone()) {
        (Some(mut pipe), Some(input)) => Some(std::thread::spawn(move || {
            let _ = pipe.write_all(input.as_bytes());
        })),
        _ => None,
    };

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || read_all(stdout_handle));
    let stderr_thread = std::thread::spawn(move || read_all(stderr_handle));

    let wait_result = match timeout {
        None => child.wait(),
        Some(limit) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });
            match rx.recv_timeout(limit) {
                Ok(result) => result,
                Err(_) => {
                    // Reader threads see EOF once the killed process exits.
                    kill_process(child_pid);
                    return Err(PrepError::ToolTimeout {
                        tool: cmd.program.clone(),
                        secs: limit.as_secs(),
                    });
                }
            }
        }
    };

    if let Some(t) = stdin_thread {
        let _ = t.join();
    }
    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    let status = wait_result?;
    Ok((status, stdout, stderr, start.elapsed().as_millis() as u64))
}

fn read_all<R: Read>(handle: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut r) = handle {
        let _ = r.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Terminate a process by PID using SIGKILL. Best-effort; errors are ignored.
fn kill_process(pid: u32) {
    let _ = Command::new("kill")
        .arg("-9")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Background jobs started by this process that have not been reaped yet.
static DETACHED: Mutex<Vec<Child>> = Mutex::new(Vec::new());

fn detached() -> std::sync::MutexGuard<'static, Vec<Child>> {
    DETACHED.lock().unwrap_or_else(|e| e.into_inner())
}

/// Start `cmd` in the background and return its PID without waiting.
///
/// The child gets its own process group so a terminal hang-up on the
/// submitting shell does not take the job down with it. Its handle is kept
/// for [`reap_detached`].
pub fn spawn_detached(cmd: &ToolCommand) -> Result<u32> {
    let mut command = cmd.to_std();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let child = command.spawn().map_err(|e| PrepError::ToolSpawn {
        tool: cmd.program.clone(),
        reason: e.to_string(),
    })?;
    let pid = child.id();
    detached().push(child);
    Ok(pid)
}

/// Collect the exit status of finished background jobs. Returns how many
/// were reaped.
pub fn reap_detached() -> usize {
    let mut children = detached();
    let before = children.len();
    children.retain_mut(|child| match child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(pid = child.id(), "background job exited: {status}");
            false
        }
        Ok(None) => true,
        Err(e) => {
            tracing::warn!(pid = child.id(), "cannot poll background job: {e}");
            false
        }
    });
    before - children.len()
}

/// PIDs of background jobs not yet reaped.
pub fn detached_pids() -> Vec<u32> {
    detached().iter().map(Child::id).collect()
}

// ---------------------------------------------------------------------------
// Async execution
// ---------------------------------------------------------------------------

/// Async counterpart of [`run`]. The child is killed if the timeout elapses
/// or the future is dropped.
pub async fn run_async(cmd: &ToolCommand, timeout: Option<Duration>) -> Result<ToolOutput> {
    use tokio::io::AsyncWriteExt;

    tracing::debug!("executing: {}", cmd.display());
    let start = Instant::now();

    let mut child = cmd
        .to_tokio()
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PrepError::ToolSpawn {
            tool: cmd.program.clone(),
            reason: e.to_string(),
        })?;

    if let (Some(mut pipe), Some(input)) = (child.stdin.take(), cmd.stdin.as_deref()) {
        pipe.write_all(input.as_bytes()).await?;
    }

    let output = match timeout {
        None => child.wait_with_output().await?,
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PrepError::ToolTimeout {
                    tool: cmd.program.clone(),
                    secs: limit.as_secs(),
                })
            }
        },
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(PrepError::ToolFailed {
            tool: cmd.program.clone(),
            code: output.status.code().unwrap_or(-1),
            detail: failure_detail(&stdout, &stderr),
        });
    }

    Ok(ToolOutput {
        stdout: tail(&stdout),
        stderr: tail(&stderr),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolCheck {
    pub role: &'static str,
    pub executable: String,
    pub resolved: Option<PathBuf>,
}

impl ToolCheck {
    pub fn found(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Resolve every configured executable on `PATH`.
pub fn check_tools(config: &Config) -> Vec<ToolCheck> {
    config
        .tools
        .entries()
        .into_iter()
        .map(|(role, exe)| ToolCheck {
            role,
            executable: exe.to_string(),
            resolved: which::which(exe).ok(),
        })
        .collect()
}
