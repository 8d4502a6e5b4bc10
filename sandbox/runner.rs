use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{fs, process::Command, time::timeout, time::Instant};

use crate::{
    limits::SandboxLimits,
    validator::{check_imports, SandboxFailure},
};

/// Result of one sandboxed program run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramOutcome {
    /// Whether the program exited cleanly.
    pub ok: bool,
    /// Captured stdout, truncated to the output limit.
    pub stdout: String,
    /// Captured stderr, truncated to the output limit.
    pub stderr: String,
    /// Last stdout line parsed as JSON, when it parses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Typed failure when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SandboxFailure>,
    /// Wall-clock time of the run.
    pub elapsed_ms: u64,
}

impl ProgramOutcome {
    fn rejected(failure: SandboxFailure) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: String::new(),
            value: None,
            failure: Some(failure),
            elapsed_ms: 0,
        }
    }
}

/// Runs synthesized programs in bounded interpreter subprocesses.
///
/// Each run gets a fresh scratch directory as its working directory; the
/// caller-provided inputs land there as `inputs.json`. The import allowlist
/// is checked before spawning, so a rejected program has no side effects.
#[derive(Debug, Clone)]
pub struct ProgramSandbox {
    interpreter: PathBuf,
    limits: SandboxLimits,
}

impl Default for ProgramSandbox {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            limits: SandboxLimits::default(),
        }
    }
}

impl ProgramSandbox {
    /// Sandbox with the default interpreter and limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the interpreter binary.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Overrides the default limits.
    #[must_use]
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The limits applied when the caller passes none.
    #[must_use]
    pub const fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Runs one program to completion under the given limits.
    pub async fn run_program(
        &self,
        source: &str,
        inputs: &Value,
        limits: Option<&SandboxLimits>,
    ) -> ProgramOutcome {
        let limits = limits.unwrap_or(&self.limits);
        if let Err(failure) = check_imports(source, &limits.allowed_imports) {
            return ProgramOutcome::rejected(failure);
        }

        let started = Instant::now();
        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => return ProgramOutcome::rejected(SandboxFailure::Io(err.to_string())),
        };
        let program_path = scratch.path().join("program.py");
        if let Err(err) = fs::write(&program_path, source).await {
            return ProgramOutcome::rejected(SandboxFailure::Io(err.to_string()));
        }
        let inputs_path = scratch.path().join("inputs.json");
        if let Err(err) = fs::write(&inputs_path, inputs.to_string()).await {
            return ProgramOutcome::rejected(SandboxFailure::Io(err.to_string()));
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("program.py")
            .current_dir(scratch.path())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        apply_rlimits(&mut cmd, limits);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => return ProgramOutcome::rejected(SandboxFailure::Io(err.to_string())),
        };

        let deadline = limits.timeout;
        let output = match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return ProgramOutcome::rejected(SandboxFailure::Io(err.to_string())),
            Err(_) => {
                // kill_on_drop reaped the interpreter when the future dropped.
                let ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                return ProgramOutcome {
                    ok: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    value: None,
                    failure: Some(SandboxFailure::Timeout(ms)),
                    elapsed_ms: ms,
                };
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let stdout = truncate_utf8(
            &String::from_utf8_lossy(&output.stdout),
            limits.max_output_bytes,
        );
        let stderr = truncate_utf8(
            &String::from_utf8_lossy(&output.stderr),
            limits.max_output_bytes,
        );

        if output.status.success() {
            let value = stdout
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .and_then(|line| serde_json::from_str(line.trim()).ok());
            ProgramOutcome {
                ok: true,
                stdout,
                stderr,
                value,
                failure: None,
                elapsed_ms,
            }
        } else {
            let failure = classify_failure(&output.status, &stderr);
            ProgramOutcome {
                ok: false,
                stdout,
                stderr,
                value: None,
                failure: Some(failure),
                elapsed_ms,
            }
        }
    }
}

/// Maps a failed exit to a typed failure.
fn classify_failure(status: &std::process::ExitStatus, stderr: &str) -> SandboxFailure {
    if stderr.contains("SyntaxError") || stderr.contains("IndentationError") {
        return SandboxFailure::Parse(last_line(stderr));
    }
    if stderr.contains("MemoryError") {
        return SandboxFailure::MemoryExceeded;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(libc::SIGKILL) {
            return SandboxFailure::MemoryExceeded;
        }
    }
    #[cfg(not(unix))]
    let _ = status;
    SandboxFailure::Runtime(last_line(stderr))
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("process failed")
        .trim()
        .to_string()
}

fn truncate_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(unix)]
fn apply_rlimits(cmd: &mut Command, limits: &SandboxLimits) {
    let memory = limits.max_memory_bytes;
    // SAFETY: setrlimit is async-signal-safe; nothing else runs pre-exec.
    unsafe {
        cmd.pre_exec(move || {
            let rlimit = libc::rlimit {
                rlim_cur: memory as libc::rlim_t,
                rlim_max: memory as libc::rlim_t,
            };
            // A failed setrlimit leaves the wall-clock deadline as the cap.
            let _ = libc::setrlimit(libc::RLIMIT_AS, &rlimit);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_rlimits(_cmd: &mut Command, _limits: &SandboxLimits) {}
