use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{HarnessError, Result};

/// How a trace is run and graded, derived from the first character of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceCategory {
    Standard,
    /// `o...`: always counted as passed and excluded from the score.
    OpenEnded,
    /// `p...`: run twice with a remount between the runs.
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Single,
    PreRemount,
    PostRemount,
}

impl TraceCategory {
    pub fn of(id: &str) -> Self {
        match id.chars().next() {
            Some('p') => Self::Persistent,
            Some('o') => Self::OpenEnded,
            _ => Self::Standard,
        }
    }

    /// Phases in execution order. Outputs are concatenated in this order.
    pub fn phases(self) -> &'static [Phase] {
        match self {
            Self::Persistent => &[Phase::PreRemount, Phase::PostRemount],
            Self::Standard | Self::OpenEnded => &[Phase::Single],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::OpenEnded => "open_ended",
            Self::Persistent => "persistent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> TraceCategory {
        TraceCategory::of(&self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Forward so width/alignment flags (`{:2}`) apply.
        f.pad(&self.0)
    }
}

/// Trace ids discovered in a workload directory.
#[derive(Debug, Clone)]
pub struct TraceCatalog {
    dir: PathBuf,
    extension: String,
    ids: BTreeSet<TraceId>,
}

impl TraceCatalog {
    /// Lists `<id>.<extension>` files directly inside `dir`. Subdirectories
    /// are not searched.
    pub fn scan(dir: &Path, extension: &str) -> Result<Self> {
        let mut ids = BTreeSet::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                HarnessError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(extension) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.is_empty() {
                    ids.insert(TraceId::new(stem));
                }
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
            ids,
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &TraceId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &TraceId) -> bool {
        self.ids.contains(id)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn script_path(&self, id: &TraceId) -> PathBuf {
        self.dir.join(format!("{}.{}", id.as_str(), self.extension))
    }

    /// Fails on the first requested id the catalog does not contain.
    pub fn validate(&self, requested: &[TraceId]) -> Result<()> {
        match requested.iter().find(|id| !self.contains(id)) {
            Some(id) => Err(HarnessError::UnknownTrace {
                id: id.as_str().to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Splits a `-t a,b,c` style argument. Empty segments are dropped.
/// Splits a `-t` argument on commas. Segments are trimmed; an empty segment
/// is kept as an empty id so validation rejects it.
pub fn parse_trace_list(raw: &str) -> Vec<TraceId> {
    raw.split(',').map(str::trim).map(TraceId::new).collect()
}
