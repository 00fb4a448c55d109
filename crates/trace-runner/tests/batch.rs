use std::fs;
use std::path::PathBuf;

use trace_runner::{
    run_batch, ArtifactStore, BatchPlan, HarnessConfig, HarnessError, MakeEnvironment, RunMode,
    TraceCatalog, TraceContext,
};

struct Project {
    cfg: HarnessConfig,
}

impl Project {
    fn new(tag: &str, build_tool: &str, scripts: &[(&str, &str)]) -> Self {
        let root = std::env::temp_dir().join(format!(
            "tracegrade_it_{}_{}_{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        let mut cfg = HarnessConfig {
            workdir: root.clone(),
            build_tool: build_tool.to_string(),
            ..HarnessConfig::default()
        };
        let traces = cfg.traces_path();
        fs::create_dir_all(&traces).expect("traces dir");
        for (id, body) in scripts {
            fs::write(traces.join(format!("{}.sh", id)), body).expect("script");
        }
        cfg.canonicalize_workdir().expect("canonical");
        Self { cfg }
    }

    fn root(&self) -> PathBuf {
        self.cfg.workdir.clone()
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.cfg.workdir);
    }
}

#[test]
fn full_catalog_batch_writes_artifacts_and_projects_score() {
    let project = Project::new(
        "full",
        "true",
        &[
            ("1", "echo one\n"),
            ("2", "pwd\n"),
            ("o1", "date +%N\n"),
        ],
    );
    let cfg = &project.cfg;
    let catalog = TraceCatalog::scan(&cfg.traces_path(), &cfg.script_extension).expect("scan");
    let artifacts = ArtifactStore::new(cfg.artifacts_path());
    let plan = BatchPlan::new(&catalog, None).expect("plan");
    let ctx = TraceContext {
        catalog: &catalog,
        artifacts: &artifacts,
        workdir: &cfg.workdir,
        shell: &cfg.shell,
        mode: RunMode::default(),
    };
    let mut env = MakeEnvironment::from_config(cfg, true);

    let report = run_batch(&mut env, &ctx, &plan, cfg.max_points, |_| {}).expect("batch");
    assert_eq!(report.points_line().as_deref(), Some("Total points: 60.00/60 (2/2)"));

    // Scripts run with the project root as cwd.
    let pwd = artifacts
        .read_answer(&trace_runner::TraceId::new("2"))
        .expect("read")
        .expect("answer written");
    let pwd = String::from_utf8(pwd).expect("utf8 path");
    assert_eq!(PathBuf::from(pwd.trim_end()), project.root());
    assert!(cfg.traces_path().join("1.ans").exists());
    assert!(cfg.traces_path().join("1.out").exists());
}

#[test]
fn failing_reset_runs_no_trace_script() {
    let project = Project::new("env_fail", "false", &[("1", "touch ran\n")]);
    let cfg = &project.cfg;
    let catalog = TraceCatalog::scan(&cfg.traces_path(), &cfg.script_extension).expect("scan");
    let artifacts = ArtifactStore::new(cfg.artifacts_path());
    let plan = BatchPlan::new(&catalog, Some("1")).expect("plan");
    let ctx = TraceContext {
        catalog: &catalog,
        artifacts: &artifacts,
        workdir: &cfg.workdir,
        shell: &cfg.shell,
        mode: RunMode::default(),
    };
    let mut env = MakeEnvironment::from_config(cfg, true);

    let err = run_batch(&mut env, &ctx, &plan, cfg.max_points, |_| {}).expect_err("fatal");
    match err {
        HarnessError::Environment { operation, .. } => assert_eq!(operation, "false cleand"),
        other => panic!("expected environment error, got {:?}", other),
    }
    assert!(!project.root().join("ran").exists());
}

#[test]
fn unknown_trace_is_rejected_by_plan() {
    let project = Project::new("unknown", "true", &[("1", "echo one\n")]);
    let cfg = &project.cfg;
    let catalog = TraceCatalog::scan(&cfg.traces_path(), &cfg.script_extension).expect("scan");
    let err = BatchPlan::new(&catalog, Some("1,42")).expect_err("unknown");
    assert_eq!(err.to_string(), "Trace 42 is not a valid trace.");
}
