use anyhow::Result;
use clap::Parser;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::path::PathBuf;
use trace_runner::{
    answer_line, fail_line, pass_line, run_batch, ArtifactStore, BatchPlan, BatchReport,
    HarnessConfig, HarnessError, MakeEnvironment, RunMode, TraceCatalog, TraceCategory,
    TraceContext, TraceFailure, TraceResult,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tracegrade",
    version = "0.3.0",
    disable_version_flag = true,
    about = "Grade a mounted filesystem against reference trace output"
)]
struct Cli {
    /// Comma-separated trace ids. Defaults to every trace in the catalog.
    #[arg(short = 't', long = "trace")]
    trace: Option<String>,
    /// Show trace output on the terminal. Disables artifacts and grading.
    #[arg(short = 'V', long)]
    verbose: bool,
    /// Only regenerate the reference answers.
    #[arg(long, visible_alias = "ans", alias = "anwser")]
    answer: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    workdir: Option<PathBuf>,
    #[arg(long)]
    traces_dir: Option<PathBuf>,
    /// Print the trace catalog and exit.
    #[arg(long)]
    list: bool,
    /// Emit one JSON payload instead of report lines.
    #[arg(long, conflicts_with = "verbose")]
    json: bool,
    /// Print version.
    #[arg(long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

const REFERENCE_HINT: &str =
    "error while generating the reference answer: check that mnt/ was cleaned and unmounted; if this looks like a harness bug, contact the course staff";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let json_mode = cli.json;
    match run(cli) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                let code = err
                    .downcast_ref::<HarnessError>()
                    .map(HarnessError::code)
                    .unwrap_or("command_failed");
                emit_json(&json_error(code, err.to_string(), json!({})));
                std::process::exit(1);
            }
            if let Some(HarnessError::UnknownTrace { .. }) = err.downcast_ref::<HarnessError>() {
                println!("{}", err);
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut cfg = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(workdir) = &cli.workdir {
        cfg.workdir = workdir.clone();
    }
    if let Some(traces_dir) = &cli.traces_dir {
        cfg.traces_dir = traces_dir.clone();
    }
    cfg.canonicalize_workdir()?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<Option<Value>> {
    let cfg = load_config(&cli)?;
    let catalog = TraceCatalog::scan(&cfg.traces_path(), &cfg.script_extension)?;
    tracing::debug!(
        workdir = %cfg.workdir.display(),
        traces_dir = %catalog.dir().display(),
        traces = catalog.len(),
        "catalog loaded"
    );

    if cli.list {
        if cli.json {
            let ids: Vec<Value> = catalog
                .ids()
                .map(|id| json!({ "id": id, "category": id.category() }))
                .collect();
            return Ok(Some(json!({ "ok": true, "command": "list", "traces": ids })));
        }
        let mut out = io::stdout().lock();
        for id in catalog.ids() {
            writeln!(out, "{}", id)?;
        }
        return Ok(None);
    }

    // Validation happens here, before the environment is touched.
    let plan = BatchPlan::new(&catalog, cli.trace.as_deref())?;
    let artifacts = ArtifactStore::new(cfg.artifacts_path());
    let mode = RunMode {
        verbose: cli.verbose,
        answer_only: cli.answer,
    };
    let ctx = TraceContext {
        catalog: &catalog,
        artifacts: &artifacts,
        workdir: &cfg.workdir,
        shell: &cfg.shell,
        mode,
    };
    let mut env = MakeEnvironment::from_config(&cfg, !cli.verbose);

    let human = !cli.json;
    let mut out = io::stdout().lock();
    let mut recap = Vec::new();
    let mut write_err = None;
    let report = run_batch(&mut env, &ctx, &plan, cfg.max_points, |result| {
        if !human || write_err.is_some() {
            return;
        }
        match print_result(&mut out, result, mode) {
            Ok(Some(line)) => recap.push(line),
            Ok(None) => {}
            Err(e) => write_err = Some(e),
        }
    })?;
    if let Some(e) = write_err {
        return Err(e.into());
    }

    if cli.json {
        let command = if cli.answer { "answer" } else { "grade" };
        return Ok(Some(json!({
            "ok": true,
            "command": command,
            "verbose": cli.verbose,
            "report": report.to_record(),
        })));
    }
    if !cli.answer {
        print_summary(&mut out, &report, &recap)?;
    }
    Ok(None)
}

/// Prints the per-trace lines. Returns the line to repeat in the recap for
/// non-open traces.
fn print_result<W: Write>(
    out: &mut W,
    result: &TraceResult,
    mode: RunMode,
) -> io::Result<Option<String>> {
    if let Some(failure) = &result.failure {
        print_failure_detail(out, result, failure)?;
    }
    if mode.answer_only {
        if result.passed {
            writeln!(out, "{}", answer_line(result))?;
        }
        return Ok(None);
    }
    if mode.verbose && result.failure.is_none() {
        writeln!(out, "Verbose mode enabled, skipping output comparison")?;
    }

    let line = if result.passed {
        pass_line(result)
    } else {
        fail_line(result)
    };
    writeln!(out, "{}", line)?;
    if !result.passed {
        // Outputs are raw bytes; decode only for display.
        writeln!(out, "Expected:\n{}", String::from_utf8_lossy(&result.reference_output))?;
        writeln!(out, "Got:\n{}", String::from_utf8_lossy(&result.candidate_output))?;
    }
    Ok((result.category != TraceCategory::OpenEnded).then_some(line))
}

fn print_failure_detail<W: Write>(
    out: &mut W,
    result: &TraceResult,
    failure: &TraceFailure,
) -> io::Result<()> {
    match failure {
        TraceFailure::ReferencePhase { status, stderr, .. } => {
            writeln!(out, "{}", REFERENCE_HINT)?;
            writeln!(out, "Trace {} failed with {}", result.id, status)?;
            writeln!(out, "{}", stderr)
        }
        TraceFailure::CandidatePhase { status, stderr, .. } => {
            writeln!(out, "Trace {} failed with {}", result.id, status)?;
            writeln!(out, "{}", stderr)
        }
        TraceFailure::OutputMismatch => Ok(()),
    }
}

fn print_summary<W: Write>(out: &mut W, report: &BatchReport, recap: &[String]) -> io::Result<()> {
    writeln!(out, "{}", recap.join("\n"))?;
    writeln!(out, "{}", report.summary_line())?;
    if let Some(line) = report.points_line() {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trace_runner::{ProcessStatus, TraceId};

    fn result(id: &str, reference: &[u8], candidate: &[u8]) -> TraceResult {
        let id = TraceId::new(id);
        let passed = reference == candidate;
        TraceResult {
            category: id.category(),
            id,
            passed,
            graded: true,
            reference_output: reference.to_vec(),
            candidate_output: candidate.to_vec(),
            reference_time: Duration::from_millis(10),
            candidate_time: Duration::from_millis(20),
            failure: (!passed).then_some(TraceFailure::OutputMismatch),
        }
    }

    fn rendered(result: &TraceResult, mode: RunMode) -> (String, Option<String>) {
        let mut buf = Vec::new();
        let recap = print_result(&mut buf, result, mode).expect("write");
        (String::from_utf8(buf).expect("utf8"), recap)
    }

    #[test]
    fn answer_flag_accepts_legacy_spellings() {
        for flag in ["--answer", "--ans", "--anwser"] {
            let cli = Cli::try_parse_from(["tracegrade", flag]).expect("parse");
            assert!(cli.answer, "{} should enable answer mode", flag);
        }
    }

    #[test]
    fn short_flags_match_grader() {
        let cli = Cli::try_parse_from(["tracegrade", "-t", "1,p2", "-V"]).expect("parse");
        assert_eq!(cli.trace.as_deref(), Some("1,p2"));
        assert!(cli.verbose);
        assert!(!cli.answer);
    }

    #[test]
    fn json_and_verbose_are_exclusive() {
        let err = Cli::try_parse_from(["tracegrade", "--json", "-V"]).err().expect("conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        assert!(Cli::try_parse_from(["tracegrade", "--json", "--answer"]).is_ok());
    }

    #[test]
    fn mismatch_prints_both_outputs_verbatim() {
        let (text, recap) = rendered(&result("3", b"A\nB\n", b"A\nC\n"), RunMode::default());
        assert_eq!(text, "Trace 3  failed\nExpected:\nA\nB\n\nGot:\nA\nC\n\n");
        assert_eq!(recap.as_deref(), Some("Trace 3  failed"));
    }

    #[test]
    fn mismatch_display_decodes_invalid_utf8_lossily() {
        let (text, _) = rendered(&result("4", &[0xff, b'\n'], &[0xfe, b'\n']), RunMode::default());
        assert!(text.contains("Expected:\n\u{fffd}\n"));
        assert!(text.contains("Got:\n\u{fffd}\n"));
    }

    #[test]
    fn open_traces_are_left_out_of_the_recap() {
        let (text, recap) = rendered(&result("o1", b"x\n", b"x\n"), RunMode::default());
        assert!(text.starts_with("Trace o1 passed ["));
        assert!(recap.is_none());

        let report = BatchReport {
            results: vec![result("1", b"x\n", b"x\n"), result("o1", b"x\n", b"y\n")],
            full_catalog: true,
            max_points: 60,
        };
        let recap: Vec<String> = report
            .results
            .iter()
            .filter_map(|r| rendered(r, RunMode::default()).1)
            .collect();
        let mut buf = Vec::new();
        print_summary(&mut buf, &report, &recap).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Trace 1  passed"));
        assert_eq!(lines[1], "1/1 traces passed (excluding 1 open traces)");
        assert_eq!(lines[2], "Total points: 60.00/60 (1/1)");
    }

    #[test]
    fn verbose_mode_prints_skip_line() {
        let mut r = result("2", b"", b"");
        r.passed = false;
        r.graded = false;
        r.failure = None;
        let mode = RunMode {
            verbose: true,
            answer_only: false,
        };
        let (text, _) = rendered(&r, mode);
        assert!(text.starts_with("Verbose mode enabled, skipping output comparison\nTrace 2  failed\n"));
    }

    #[test]
    fn reference_crash_prints_hint_and_stderr() {
        let mut r = result("5", b"", b"");
        r.passed = false;
        r.graded = false;
        r.failure = Some(TraceFailure::ReferencePhase {
            phase: 1,
            status: ProcessStatus(Some(2)),
            stderr: "mnt busy".to_string(),
        });
        let (text, _) = rendered(&r, RunMode::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], REFERENCE_HINT);
        assert_eq!(lines[1], "Trace 5 failed with exit code 2");
        assert_eq!(lines[2], "mnt busy");
        assert_eq!(lines[3], "Trace 5  failed");
    }

    #[test]
    fn answer_mode_prints_only_generated_line() {
        let mode = RunMode {
            verbose: false,
            answer_only: true,
        };
        let (text, recap) = rendered(&result("1", b"x\n", b"x\n"), mode);
        assert!(text.starts_with("Trace 1  anwser generated ["));
        assert_eq!(text.lines().count(), 1);
        assert!(recap.is_none());
    }

    #[test]
    fn json_error_shape() {
        let v = json_error("unknown_trace", "Trace 9 is not a valid trace.".to_string(), json!({}));
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "unknown_trace");
    }
}
