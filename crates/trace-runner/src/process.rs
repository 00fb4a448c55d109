use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Exit status of a child. `None` means the child was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProcessStatus(pub Option<i32>);

impl ProcessStatus {
    pub fn success(self) -> bool {
        self.0 == Some(0)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "signal"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// When false, stdout/stderr are inherited from this process and the
    /// returned output fields are empty.
    pub capture: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, workdir: &Path, capture: bool) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.to_path_buf(),
            capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn display_command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    /// Raw bytes; trace output is compared and stored without decoding.
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs `spec` to completion on the calling thread.
///
/// A non-zero exit is returned as data; only a failure to spawn or wait on
/// the child is an error.
pub fn run_process(spec: &ProcessSpec) -> Result<ProcessOutput> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    cmd.current_dir(&spec.workdir);
    cmd.stdin(Stdio::null());
    if spec.capture {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
    }

    debug!(command = %spec.display_command(), workdir = %spec.workdir.display(), "spawning");
    let start = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| HarnessError::io(&spec.workdir, e))?;
    let output = child
        .wait_with_output()
        .map_err(|e| HarnessError::io(&spec.workdir, e))?;
    let elapsed = start.elapsed();

    let status = ProcessStatus(output.status.code());
    debug!(command = %spec.display_command(), %status, elapsed_ms = elapsed.as_millis() as u64, "exited");
    Ok(ProcessOutput {
        status,
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed,
    })
}
