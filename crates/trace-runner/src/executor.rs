//! Runs one trace through its reference and candidate phases.
//!
//! Per trace:
//!
//! ```text
//! reset+init -> REF phase(s) -> write .ans -> [answer mode: stop]
//!            -> mount -> CAND phase 1 -> [p: mount_noinit -> CAND phase 2]
//!            -> write .out -> verdict
//! ```
//!
//! Persistent (`p`) traces run the same script twice per side and the two
//! outputs are concatenated with no separator. On the candidate side the
//! second run follows a remount without reinitialization.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::catalog::{Phase, TraceCatalog, TraceCategory, TraceId};
use crate::environment::Environment;
use crate::error::Result;
use crate::process::{run_process, ProcessSpec, ProcessStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Inherit stdio, skip artifact writes, and do not grade.
    pub verbose: bool,
    /// Only (re)produce the answer artifacts; never touch the candidate.
    pub answer_only: bool,
}

/// Everything a trace run needs besides the environment.
#[derive(Debug, Clone, Copy)]
pub struct TraceContext<'a> {
    pub catalog: &'a TraceCatalog,
    pub artifacts: &'a ArtifactStore,
    pub workdir: &'a Path,
    pub shell: &'a str,
    pub mode: RunMode,
}

impl TraceContext<'_> {
    fn script_spec(&self, script: &Path) -> ProcessSpec {
        ProcessSpec::new(self.shell, self.workdir, !self.mode.verbose)
            .arg(script.to_string_lossy().into_owned())
    }
}

/// Why a trace did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceFailure {
    /// The script failed while producing the answer. Points at a broken
    /// harness environment rather than a candidate defect.
    ReferencePhase {
        phase: u8,
        status: ProcessStatus,
        stderr: String,
    },
    /// The script failed against the mounted candidate.
    CandidatePhase {
        phase: u8,
        status: ProcessStatus,
        stderr: String,
    },
    OutputMismatch,
}

#[derive(Debug, Clone)]
pub struct TraceResult {
    pub id: TraceId,
    pub category: TraceCategory,
    pub passed: bool,
    /// False when no comparison took place (verbose, answer mode, crashes).
    pub graded: bool,
    pub reference_output: Vec<u8>,
    pub candidate_output: Vec<u8>,
    pub reference_time: Duration,
    pub candidate_time: Duration,
    pub failure: Option<TraceFailure>,
}

impl TraceResult {
    fn new(id: &TraceId) -> Self {
        Self {
            id: id.clone(),
            category: id.category(),
            passed: false,
            graded: false,
            reference_output: Vec::new(),
            candidate_output: Vec::new(),
            reference_time: Duration::ZERO,
            candidate_time: Duration::ZERO,
            failure: None,
        }
    }
}

/// Compares captured outputs byte for byte. `None` means the trace passed.
pub fn grade(category: TraceCategory, reference: &[u8], candidate: &[u8]) -> Option<TraceFailure> {
    match category {
        TraceCategory::OpenEnded => None,
        TraceCategory::Standard | TraceCategory::Persistent => {
            (reference != candidate).then_some(TraceFailure::OutputMismatch)
        }
    }
}

fn phase_number(phase: Phase) -> u8 {
    match phase {
        Phase::Single | Phase::PreRemount => 1,
        Phase::PostRemount => 2,
    }
}

#[derive(Debug, Default)]
struct Capture {
    stdout: Vec<u8>,
    elapsed: Duration,
}

enum SideOutcome {
    Completed(Capture),
    Crashed {
        phase: Phase,
        status: ProcessStatus,
        stderr: String,
    },
}

/// Runs every phase of `id` in order, calling `before` ahead of each one.
fn run_side<F>(ctx: &TraceContext<'_>, id: &TraceId, script: &Path, mut before: F) -> Result<SideOutcome>
where
    F: FnMut(Phase) -> Result<()>,
{
    let mut capture = Capture::default();
    for &phase in id.category().phases() {
        before(phase)?;
        let out = run_process(&ctx.script_spec(script))?;
        if !out.status.success() {
            return Ok(SideOutcome::Crashed {
                phase,
                status: out.status,
                stderr: out.stderr,
            });
        }
        capture.elapsed += out.elapsed;
        capture.stdout.extend_from_slice(&out.stdout);
    }
    Ok(SideOutcome::Completed(capture))
}

/// Runs one trace to a verdict.
///
/// `Err` is reserved for environment and artifact failures, which abort the
/// batch. Script failures on either side come back as a failed
/// [`TraceResult`].
pub fn execute_trace(env: &mut dyn Environment, ctx: &TraceContext<'_>, id: &TraceId) -> Result<TraceResult> {
    let script: PathBuf = ctx.catalog.script_path(id);
    let mut result = TraceResult::new(id);
    info!(trace = %id, category = result.category.as_str(), "starting trace");

    env.reset_and_initialize()?;
    let reference = match run_side(ctx, id, &script, |_| Ok(()))? {
        SideOutcome::Completed(capture) => capture,
        SideOutcome::Crashed {
            phase,
            status,
            stderr,
        } => {
            error!(trace = %id, phase = phase_number(phase), %status, "reference run failed");
            result.failure = Some(TraceFailure::ReferencePhase {
                phase: phase_number(phase),
                status,
                stderr,
            });
            return Ok(result);
        }
    };

    if !ctx.mode.verbose {
        ctx.artifacts.write_answer(id, &reference.stdout)?;
    }
    result.reference_time = reference.elapsed;
    result.reference_output = reference.stdout;

    if ctx.mode.answer_only {
        result.passed = true;
        result.candidate_output = result.reference_output.clone();
        result.candidate_time = result.reference_time;
        info!(trace = %id, "answer generated");
        return Ok(result);
    }

    let candidate = run_side(ctx, id, &script, |phase| match phase {
        Phase::PostRemount => env.remount_candidate_no_init(),
        Phase::Single | Phase::PreRemount => env.mount_candidate(),
    })?;
    let candidate = match candidate {
        SideOutcome::Completed(capture) => capture,
        SideOutcome::Crashed {
            phase,
            status,
            stderr,
        } => {
            warn!(trace = %id, phase = phase_number(phase), %status, "candidate run failed");
            result.failure = Some(TraceFailure::CandidatePhase {
                phase: phase_number(phase),
                status,
                stderr,
            });
            return Ok(result);
        }
    };
    result.candidate_time = candidate.elapsed;
    result.candidate_output = candidate.stdout;

    if ctx.mode.verbose {
        return Ok(result);
    }

    ctx.artifacts.write_observed(id, &result.candidate_output)?;
    result.graded = true;
    result.failure = grade(result.category, &result.reference_output, &result.candidate_output);
    result.passed = result.failure.is_none();
    info!(trace = %id, passed = result.passed, "trace finished");
    Ok(result)
}
