use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::catalog::TraceId;
use crate::error::{HarnessError, Result};

/// On-disk answer (`<id>.ans`) and observed (`<id>.out`) outputs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn answer_path(&self, id: &TraceId) -> PathBuf {
        self.dir.join(format!("{}.ans", id.as_str()))
    }

    pub fn observed_path(&self, id: &TraceId) -> PathBuf {
        self.dir.join(format!("{}.out", id.as_str()))
    }

    pub fn write_answer(&self, id: &TraceId, output: &[u8]) -> Result<PathBuf> {
        let path = self.answer_path(id);
        atomic_write_bytes(&path, output)?;
        Ok(path)
    }

    pub fn write_observed(&self, id: &TraceId, output: &[u8]) -> Result<PathBuf> {
        let path = self.observed_path(id);
        atomic_write_bytes(&path, output)?;
        Ok(path)
    }

    pub fn read_answer(&self, id: &TraceId) -> Result<Option<Vec<u8>>> {
        let path = self.answer_path(id);
        match fs::read(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HarnessError::io(path, e)),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(HarnessError::io(path, e));
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
