//! Build and load-only behavior against a scripted engine
//!
//! The engine is a small `sh` script that reads the parameter file, records
//! each invocation in a counter file and writes a magnetization artifact at
//! the `outputfile` path it was given.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use sweep_orchestrator::experiment::{
    ArgumentStyle, BuildMode, BuildState, EngineCommand, ExperimentBuilder, ExperimentManifest,
    OutputCapture, PartialRecords, ProjectLayout, RunStatus,
};
use sweep_orchestrator::parameters::{ParameterSet, ScalePoint};
use sweep_orchestrator::parser::ObservableSchema;
use sweep_orchestrator::Error;
use tempfile::TempDir;

// ============================================================================
// Harness
// ============================================================================

const PARAMETER_FILE_ENGINE: &str = r#"
params="$1"
value() { sed -n "s/^$1: //p" "$params"; }
out=$(value outputfile)
lx=$(value Lx)
echo "$lx" >> "$COUNTER_FILE"
case " $FAIL_AT " in *" $lx "*) echo "diverged at L=$lx"; echo "boom" >&2; exit 2;; esac
case " $SLEEP_AT " in *" $lx "*) sleep 5;; esac
case " $SKIP_WRITE_AT " in *" $lx "*) exit 0;; esac
printf 'temperature, magnetization:0.25\n1.0, 0.%s\n2.0, 0.1\n' "$lx" > "$out"
"#;

const FLAG_ENGINE: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --outputfile) out="$2";;
    --Lx) lx="$2";;
  esac
  shift 2
done
echo "$lx" >> "$COUNTER_FILE"
printf 'temperature, magnetization:0.5\n1.0, 0.%s\n' "$lx" > "$out"
"#;

const STDOUT_ENGINE: &str = r#"
echo x >> "$COUNTER_FILE"
printf 'temperature, magnetization:0.5\n1.0, 0.9\n2.0, oops\n3.0, 0.7\n'
"#;

struct Harness {
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [
            ("engine.sh", PARAMETER_FILE_ENGINE),
            ("flags.sh", FLAG_ENGINE),
            ("stdout.sh", STDOUT_ENGINE),
        ] {
            fs::write(dir.path().join(name), body).unwrap();
        }
        Self { dir }
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    fn counter(&self) -> PathBuf {
        self.dir.path().join("invocations")
    }

    fn engine_script(&self, script: &str) -> EngineCommand {
        EngineCommand::new("sh")
            .arg(self.dir.path().join(script).display().to_string())
            .env("COUNTER_FILE", self.counter().display().to_string())
    }

    fn engine(&self) -> EngineCommand {
        self.engine_script("engine.sh")
    }

    fn invocations(&self) -> usize {
        fs::read_to_string(self.counter())
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn builder(&self, sizes: &[i64]) -> ExperimentBuilder {
        let points: Vec<ScalePoint> = sizes.iter().map(|&l| ScalePoint::uniform(l, 2)).collect();
        let mut params = ParameterSet::new();
        params.set_scale_variable_names(["Lx", "Ly"]);
        params.add_static_parameter("temperatures", vec![1.0, 2.0]).unwrap();
        params
            .add_scaling_parameter("therm_steps", points.iter().map(|p| (p.clone(), 1000)))
            .unwrap();
        ExperimentBuilder::new(params, ProjectLayout::new(self.output_dir(), "ising"))
            .schema(ObservableSchema::Magnetization)
            .scale_points(points)
    }
}

fn point(l: i64) -> ScalePoint {
    ScalePoint::uniform(l, 2)
}

// ============================================================================
// Build mode
// ============================================================================

#[test]
fn test_build_invokes_engine_once_per_point() {
    let harness = Harness::new();
    let mut builder = harness.builder(&[8, 16]).engine(harness.engine());
    let experiment = builder.build(BuildMode::Build).unwrap();

    assert_eq!(harness.invocations(), 2);
    assert_eq!(builder.state(), BuildState::Ready);
    assert_eq!(experiment.get_scale_variable_values(), vec![&point(8), &point(16)]);

    let record = experiment.get_result(&point(16)).unwrap();
    assert_eq!(record.elapsed_time(), Some(0.25));
    assert_eq!(record.series("magnetization"), Some(&[0.16, 0.1][..]));
    assert!(harness.output_dir().join("ising_Lx16_Ly16.txt").is_file());
    assert!(!harness.output_dir().join("ising_Lx16_Ly16.txt.partial").exists());
    assert!(experiment.runs().iter().all(|r| r.status() == RunStatus::Success));
}

#[test]
fn test_rebuild_reuses_artifacts() {
    let harness = Harness::new();
    let first = harness
        .builder(&[8, 16])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();
    let second = harness
        .builder(&[8, 16])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();

    assert_eq!(harness.invocations(), 2);
    assert_eq!(first.get_results(), second.get_results());
    assert!(second.runs().iter().all(|r| r.status() == RunStatus::Reused));
}

#[test]
fn test_force_rebuild_reinvokes() {
    let harness = Harness::new();
    harness
        .builder(&[8])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();
    harness
        .builder(&[8])
        .engine(harness.engine())
        .force_rebuild(true)
        .build(BuildMode::Build)
        .unwrap();
    assert_eq!(harness.invocations(), 2);
}

#[test]
fn test_extending_sweep_only_runs_new_points() {
    let harness = Harness::new();
    harness
        .builder(&[8])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();
    let experiment = harness
        .builder(&[8, 32])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();

    assert_eq!(harness.invocations(), 2);
    assert_eq!(experiment.get_results().len(), 2);
    assert_eq!(experiment.runs()[0].status(), RunStatus::Reused);
    assert_eq!(experiment.runs()[1].status(), RunStatus::Success);
}

#[test]
fn test_coverage_error_starts_no_engine() {
    let harness = Harness::new();
    let mut params = ParameterSet::new();
    params.set_scale_variable_names(["Lx", "Ly"]);
    params
        .add_scaling_parameter("therm_steps", [(point(16), 1000), (point(32), 2000)])
        .unwrap();
    let mut builder = ExperimentBuilder::new(params, ProjectLayout::new(harness.output_dir(), "ising"))
        .engine(harness.engine())
        .scale_points([point(16), point(32), point(64)]);

    let err = builder.build(BuildMode::Build).unwrap_err();
    match &err {
        Error::IncompleteScaleCoverage { parameter, scale_point } => {
            assert_eq!(parameter, "therm_steps");
            assert_eq!(scale_point, &point(64));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_configuration());
    assert_eq!(harness.invocations(), 0);
    assert!(!harness.output_dir().exists());
}

#[test]
fn test_engine_failure_is_isolated() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8, 16, 32])
        .engine(harness.engine().env("FAIL_AT", "16"))
        .build(BuildMode::Build)
        .unwrap();

    assert_eq!(harness.invocations(), 3);
    assert_eq!(experiment.get_scale_variable_values(), vec![&point(8), &point(32)]);
    match experiment.failures().get(&point(16)) {
        Some(Error::EngineExecution { stdout, stderr, .. }) => {
            assert!(stdout.contains("diverged at L=16"));
            assert_eq!(stderr.trim(), "boom");
        }
        other => panic!("unexpected failure: {other:?}"),
    }
    assert!(!harness.output_dir().join("ising_Lx16_Ly16.txt").exists());
    assert!(!harness.output_dir().join("ising_Lx16_Ly16.txt.partial").exists());
    assert_eq!(experiment.runs()[1].status(), RunStatus::Failed);
}

#[test]
fn test_missing_output_file_is_a_failure() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8])
        .engine(harness.engine().env("SKIP_WRITE_AT", "8"))
        .build(BuildMode::Build)
        .unwrap();
    assert!(matches!(
        experiment.failures().get(&point(8)),
        Some(Error::EngineExecution { .. })
    ));
}

#[test]
fn test_timeout_marks_run_timed_out() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8, 32])
        .engine(harness.engine().env("SLEEP_AT", "32"))
        .timeout(Duration::from_millis(300))
        .build(BuildMode::Build)
        .unwrap();

    assert!(experiment.get_result(&point(8)).is_some());
    assert!(matches!(
        experiment.failures().get(&point(32)),
        Some(Error::EngineTimeout { .. })
    ));
    assert_eq!(experiment.runs()[1].status(), RunStatus::TimedOut);
}

#[test]
fn test_concurrent_runs_keep_request_order() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[32, 8, 16, 4])
        .engine(harness.engine())
        .max_concurrent_runs(3)
        .build(BuildMode::Build)
        .unwrap();

    assert_eq!(harness.invocations(), 4);
    assert_eq!(
        experiment.get_scale_variable_values(),
        vec![&point(32), &point(8), &point(16), &point(4)]
    );
    let order: Vec<_> = experiment.runs().iter().map(|r| r.run_id().to_string()).collect();
    assert_eq!(order[0], "ising_Lx32_Ly32");
    assert_eq!(order[3], "ising_Lx4_Ly4");
}

#[test]
fn test_flag_arguments() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8])
        .engine(harness.engine_script("flags.sh"))
        .argument_style(ArgumentStyle::Flags)
        .build(BuildMode::Build)
        .unwrap();

    assert_eq!(harness.invocations(), 1);
    let record = experiment.get_result(&point(8)).unwrap();
    assert_eq!(record.series("magnetization"), Some(&[0.8][..]));
    assert!(!harness.output_dir().join("ising_Lx8_Ly8.params").exists());
}

#[test]
fn test_parameter_file_contents() {
    let harness = Harness::new();
    harness
        .builder(&[8])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();

    let params = fs::read_to_string(harness.output_dir().join("ising_Lx8_Ly8.params")).unwrap();
    let lines: Vec<_> = params.lines().collect();
    assert_eq!(lines[0], "Lx: 8");
    assert_eq!(lines[1], "Ly: 8");
    assert_eq!(lines[2], "temperatures: 1, 2");
    assert_eq!(lines[3], "therm_steps: 1000");
    assert!(lines[4].starts_with("outputfile: "));
    assert!(lines[4].ends_with("ising_Lx8_Ly8.txt.partial"));
}

#[test]
fn test_stdout_capture_accepts_partial_record() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8])
        .engine(harness.engine_script("stdout.sh"))
        .output_capture(OutputCapture::Stdout)
        .build(BuildMode::Build)
        .unwrap();

    let record = experiment.get_result(&point(8)).unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(record.rejected_rows().len(), 1);
    assert_eq!(record.rejected_rows()[0].line_number, 2);

    let artifact = fs::read_to_string(harness.output_dir().join("ising_Lx8_Ly8.txt")).unwrap();
    assert!(artifact.starts_with("temperature, magnetization:0.5\n"));
}

#[test]
fn test_reject_partial_records() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8])
        .engine(harness.engine_script("stdout.sh"))
        .output_capture(OutputCapture::Stdout)
        .partial_records(PartialRecords::Reject)
        .build(BuildMode::Build)
        .unwrap();

    match experiment.failures().get(&point(8)) {
        Some(Error::PartialRecord { rejected, first, .. }) => {
            assert_eq!(*rejected, 1);
            assert!(first.content.contains("oops"));
        }
        other => panic!("unexpected failure: {other:?}"),
    }
    assert!(!harness.output_dir().join("ising_Lx8_Ly8.txt").exists());
}

#[test]
fn test_manifest_is_written() {
    let harness = Harness::new();
    harness
        .builder(&[8, 16])
        .engine(harness.engine().env("FAIL_AT", "16"))
        .build(BuildMode::Build)
        .unwrap();

    let manifest =
        ExperimentManifest::from_path(harness.output_dir().join("ising.manifest.json")).unwrap();
    assert_eq!(manifest.experiment, "ising");
    assert_eq!(manifest.mode, BuildMode::Build);
    assert_eq!(manifest.scale_variable_names, ["Lx", "Ly"]);
    assert_eq!(manifest.runs.len(), 2);
    assert_eq!(manifest.runs[0].status(), RunStatus::Success);
    assert_eq!(manifest.runs[1].status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_build_async_on_caller_runtime() {
    let harness = Harness::new();
    let mut builder = harness.builder(&[8, 16]).engine(harness.engine()).max_concurrent_runs(2);
    let experiment = builder.build_async(BuildMode::Build).await.unwrap();
    assert!(experiment.is_complete());
    assert_eq!(harness.invocations(), 2);
}

// ============================================================================
// Load-only mode
// ============================================================================

#[test]
fn test_load_only_reports_missing_points() {
    let harness = Harness::new();
    harness
        .builder(&[8, 32])
        .engine(harness.engine())
        .build(BuildMode::Build)
        .unwrap();

    let experiment = harness.builder(&[8, 16, 32]).build(BuildMode::LoadOnly).unwrap();

    assert_eq!(harness.invocations(), 2);
    assert_eq!(experiment.get_results().len(), 2);
    assert_eq!(experiment.requested().len(), 3);
    assert_eq!(experiment.failures().len(), 1);
    assert!(matches!(
        experiment.failures().get(&point(16)),
        Some(Error::MissingArtifact { .. })
    ));
    assert_eq!(experiment.runs()[0].status(), RunStatus::Loaded);
}

#[test]
fn test_load_only_ignores_engine() {
    let harness = Harness::new();
    let experiment = harness
        .builder(&[8])
        .engine(harness.engine())
        .build(BuildMode::LoadOnly)
        .unwrap();

    assert_eq!(harness.invocations(), 0);
    assert!(experiment.get_results().is_empty());
    assert!(!harness.output_dir().exists());
}

#[tokio::test]
async fn test_load_only_async() {
    let harness = Harness::new();
    let mut builder = harness.builder(&[8]);
    let experiment = builder.build_async(BuildMode::LoadOnly).await.unwrap();
    assert_eq!(experiment.failures().len(), 1);
}
