use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::artifacts::sha256_hex;
use crate::catalog::{parse_trace_list, TraceCatalog, TraceCategory, TraceId};
use crate::environment::Environment;
use crate::error::Result;
use crate::executor::{execute_trace, TraceContext, TraceFailure, TraceResult};

/// A validated list of traces to run. Only constructible through
/// [`BatchPlan::new`], so a batch cannot start with an unknown id.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    ids: Vec<TraceId>,
    full_catalog: bool,
}

impl BatchPlan {
    /// `requested` is the raw `-t` argument; `None` selects the full catalog.
    /// A blank argument also runs the full catalog but still counts as a
    /// filtered run, so no points are projected.
    pub fn new(catalog: &TraceCatalog, requested: Option<&str>) -> Result<Self> {
        match requested {
            Some(raw) if raw.trim().is_empty() => Ok(Self {
                ids: catalog.ids().cloned().collect(),
                full_catalog: false,
            }),
            Some(raw) => {
                let ids = parse_trace_list(raw);
                catalog.validate(&ids)?;
                Ok(Self {
                    ids,
                    full_catalog: false,
                })
            }
            None => Ok(Self {
                ids: catalog.ids().cloned().collect(),
                full_catalog: true,
            }),
        }
    }

    pub fn ids(&self) -> &[TraceId] {
        &self.ids
    }

    pub fn is_full_catalog(&self) -> bool {
        self.full_catalog
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<TraceResult>,
    pub full_catalog: bool,
    pub max_points: u32,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn total_open(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.category == TraceCategory::OpenEnded)
            .count()
    }

    pub fn total_normal(&self) -> usize {
        self.total() - self.total_open()
    }

    /// Passed traces, open traces excluded.
    pub fn total_passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.category != TraceCategory::OpenEnded && r.passed)
            .count()
    }

    /// Projected score, withheld for filtered runs.
    pub fn points(&self) -> Option<f64> {
        self.full_catalog
            .then(|| compute_points(self.total_passed(), self.total_normal(), self.max_points))
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}/{} traces passed (excluding {} open traces)",
            self.total_passed(),
            self.total_normal(),
            self.total_open()
        )
    }

    pub fn points_line(&self) -> Option<String> {
        self.points().map(|p| {
            format!(
                "Total points: {:.2}/{} ({}/{})",
                p,
                self.max_points,
                self.total_passed(),
                self.total_normal()
            )
        })
    }

    pub fn to_record(&self) -> BatchRecord {
        BatchRecord {
            traces: self.results.iter().map(TraceRecord::from).collect(),
            total: self.total(),
            total_passed: self.total_passed(),
            total_normal: self.total_normal(),
            total_open: self.total_open(),
            full_catalog: self.full_catalog,
            max_points: self.max_points,
            points: self.points(),
        }
    }
}

pub fn compute_points(passed: usize, normal: usize, max_points: u32) -> f64 {
    if normal == 0 {
        return 0.0;
    }
    passed as f64 / normal as f64 * f64::from(max_points)
}

/// Serializable view of a [`BatchReport`] for `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub traces: Vec<TraceRecord>,
    pub total: usize,
    pub total_passed: usize,
    pub total_normal: usize,
    pub total_open: usize,
    pub full_catalog: bool,
    pub max_points: u32,
    pub points: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub id: TraceId,
    pub category: TraceCategory,
    pub passed: bool,
    pub graded: bool,
    pub reference_seconds: f64,
    pub candidate_seconds: f64,
    pub reference_sha256: String,
    pub candidate_sha256: String,
    pub failure: Option<TraceFailure>,
}

impl From<&TraceResult> for TraceRecord {
    fn from(r: &TraceResult) -> Self {
        Self {
            id: r.id.clone(),
            category: r.category,
            passed: r.passed,
            graded: r.graded,
            reference_seconds: r.reference_time.as_secs_f64(),
            candidate_seconds: r.candidate_time.as_secs_f64(),
            reference_sha256: sha256_hex(&r.reference_output),
            candidate_sha256: sha256_hex(&r.candidate_output),
            failure: r.failure.clone(),
        }
    }
}

/// Runs every trace in `plan` sequentially. `on_result` sees each result as
/// soon as it is produced. Stops at the first fatal error.
pub fn run_batch<F>(
    env: &mut dyn Environment,
    ctx: &TraceContext<'_>,
    plan: &BatchPlan,
    max_points: u32,
    mut on_result: F,
) -> Result<BatchReport>
where
    F: FnMut(&TraceResult),
{
    let mut results = Vec::with_capacity(plan.ids().len());
    for id in plan.ids() {
        let result = execute_trace(env, ctx, id)?;
        on_result(&result);
        results.push(result);
    }
    let report = BatchReport {
        results,
        full_catalog: plan.is_full_catalog(),
        max_points,
    };
    info!(
        passed = report.total_passed(),
        normal = report.total_normal(),
        open = report.total_open(),
        "batch finished"
    );
    Ok(report)
}

fn ratio(num: Duration, den: Duration) -> f64 {
    num.as_secs_f64() / den.as_secs_f64()
}

/// `Trace 1  passed [...]` line for a passing trace.
pub fn pass_line(r: &TraceResult) -> String {
    format!(
        "Trace {:2} passed [{:8.4}s] [ref: {:8.4}s] [{:8.5}%]",
        r.id,
        r.candidate_time.as_secs_f64(),
        r.reference_time.as_secs_f64(),
        ratio(r.reference_time, r.candidate_time) * 100.0
    )
}

pub fn fail_line(r: &TraceResult) -> String {
    format!("Trace {:2} failed", r.id)
}

pub fn answer_line(r: &TraceResult) -> String {
    format!(
        "Trace {:2} anwser generated [{:8.4}s] [ref: {:8.4}s] [{:8.2}x]",
        r.id,
        r.candidate_time.as_secs_f64(),
        r.reference_time.as_secs_f64(),
        ratio(r.candidate_time, r.reference_time)
    )
}
