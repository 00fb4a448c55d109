use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HarnessError, Result};

pub const DEFAULT_MAX_POINTS: u32 = 60;

/// Names of the four lifecycle targets passed to the build tool.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TargetNames {
    pub clean: String,
    pub init: String,
    pub mount: String,
    pub mount_noinit: String,
}

impl Default for TargetNames {
    fn default() -> Self {
        Self {
            clean: "cleand".to_string(),
            init: "init".to_string(),
            mount: "mount".to_string(),
            mount_noinit: "mount_noinit".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Working directory for trace scripts and the build tool. Relative
    /// paths below resolve against it.
    pub workdir: PathBuf,
    pub traces_dir: PathBuf,
    /// Where `<id>.ans` and `<id>.out` land. Defaults to `traces_dir`.
    pub artifacts_dir: Option<PathBuf>,
    pub shell: String,
    pub script_extension: String,
    pub build_tool: String,
    pub targets: TargetNames,
    pub max_points: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            traces_dir: PathBuf::from("tests/traces"),
            artifacts_dir: None,
            shell: "bash".to_string(),
            script_extension: "sh".to_string(),
            build_tool: "make".to_string(),
            targets: TargetNames::default(),
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Self::from_yaml(&raw).map_err(|message| HarnessError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    fn from_yaml(raw: &str) -> std::result::Result<Self, String> {
        let cfg: HarnessConfig = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
        if cfg.shell.trim().is_empty() {
            return Err("shell must not be empty".to_string());
        }
        if cfg.build_tool.trim().is_empty() {
            return Err("build_tool must not be empty".to_string());
        }
        if cfg.script_extension.trim().is_empty() {
            return Err("script_extension must not be empty".to_string());
        }
        Ok(cfg)
    }

    /// Makes `workdir` absolute. Script paths are handed to children whose
    /// cwd is `workdir`, so they must not stay relative.
    pub fn canonicalize_workdir(&mut self) -> Result<()> {
        self.workdir = fs::canonicalize(&self.workdir).map_err(|e| HarnessError::io(&self.workdir, e))?;
        Ok(())
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }

    pub fn traces_path(&self) -> PathBuf {
        self.resolve(&self.traces_dir)
    }

    pub fn artifacts_path(&self) -> PathBuf {
        match &self.artifacts_dir {
            Some(dir) => self.resolve(dir),
            None => self.traces_path(),
        }
    }
}
