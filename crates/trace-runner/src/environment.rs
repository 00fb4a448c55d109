//! Lifecycle control of the mount target.
//!
//! Each operation is a blocking call into an external build tool. A failure
//! here means the harness itself can no longer be trusted, so it is reported
//! as [`HarnessError::Environment`] and aborts the batch.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::config::{HarnessConfig, TargetNames};
use crate::error::{HarnessError, Result};
use crate::process::{run_process, ProcessSpec};

pub trait Environment {
    /// Wipes and reinitializes the mount target and working area. Runs
    /// before every trace's reference phase.
    fn reset_and_initialize(&mut self) -> Result<()>;

    /// Mounts the candidate fresh, after initialization.
    fn mount_candidate(&mut self) -> Result<()>;

    /// Unmounts and remounts the candidate without touching backing state.
    fn remount_candidate_no_init(&mut self) -> Result<()>;
}

/// Drives the lifecycle through `<build_tool> <target>` in `workdir`.
#[derive(Debug, Clone)]
pub struct MakeEnvironment {
    build_tool: String,
    targets: TargetNames,
    workdir: PathBuf,
    capture: bool,
}

impl MakeEnvironment {
    pub fn new(build_tool: impl Into<String>, targets: TargetNames, workdir: &Path, capture: bool) -> Self {
        Self {
            build_tool: build_tool.into(),
            targets,
            workdir: workdir.to_path_buf(),
            capture,
        }
    }

    /// `capture` is false in verbose mode so build output reaches the terminal.
    pub fn from_config(cfg: &HarnessConfig, capture: bool) -> Self {
        Self::new(cfg.build_tool.clone(), cfg.targets.clone(), &cfg.workdir, capture)
    }

    pub fn clean(&mut self) -> Result<()> {
        let target = self.targets.clean.clone();
        self.invoke(&target)
    }

    pub fn initialize(&mut self) -> Result<()> {
        let target = self.targets.init.clone();
        self.invoke(&target)
    }

    fn invoke(&self, target: &str) -> Result<()> {
        let spec = ProcessSpec::new(self.build_tool.clone(), &self.workdir, self.capture).arg(target);
        let out = run_process(&spec)?;
        if !out.status.success() {
            error!(operation = %spec.display_command(), status = %out.status, "environment operation failed");
            return Err(HarnessError::Environment {
                operation: spec.display_command(),
                status: out.status,
                stderr: out.stderr.trim_end().to_string(),
            });
        }
        debug!(operation = %spec.display_command(), elapsed_ms = out.elapsed.as_millis() as u64, "environment ready");
        Ok(())
    }
}

impl Environment for MakeEnvironment {
    fn reset_and_initialize(&mut self) -> Result<()> {
        self.clean()?;
        self.initialize()
    }

    fn mount_candidate(&mut self) -> Result<()> {
        let target = self.targets.mount.clone();
        self.invoke(&target)
    }

    fn remount_candidate_no_init(&mut self) -> Result<()> {
        let target = self.targets.mount_noinit.clone();
        self.invoke(&target)
    }
}
