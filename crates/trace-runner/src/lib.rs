//! Differential trace grading for a mountable filesystem.
//!
//! A batch resets the environment for every trace, runs the trace script to
//! produce a reference answer, mounts the candidate, runs the script again,
//! and compares the outputs. See [`executor`] for the per-trace protocol.

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod process;
pub mod scoring;

pub use artifacts::ArtifactStore;
pub use catalog::{parse_trace_list, Phase, TraceCatalog, TraceCategory, TraceId};
pub use config::{HarnessConfig, TargetNames, DEFAULT_MAX_POINTS};
pub use environment::{Environment, MakeEnvironment};
pub use error::{HarnessError, Result};
pub use executor::{execute_trace, grade, RunMode, TraceContext, TraceFailure, TraceResult};
pub use process::{run_process, ProcessOutput, ProcessSpec, ProcessStatus};
pub use scoring::{
    answer_line, compute_points, fail_line, pass_line, run_batch, BatchPlan, BatchRecord,
    BatchReport, TraceRecord,
};
