//! Experiment Builder - validates a sweep and materializes it
//!
//! ## State Machine
//!
//! ```text
//! Unconfigured ──validate──> Validated ──Build────> Building ──> Ready
//!                                      └─LoadOnly─> Loading  ──> Ready
//! ```
//!
//! Validation failures leave the builder in `Unconfigured` and no engine is
//! started. Per-point failures during `Building`/`Loading` are collected on
//! the [`Experiment`] instead of aborting the build.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::engine::{
    render_flags, render_parameter_file, ArgumentStyle, EngineCommand, EngineInvocation,
    OutputCapture,
};
use super::run_record::{RunRecord, RunStatus};
use super::Experiment;
use crate::artifact::ARTIFACT_EXTENSION;
use crate::parameters::{ParameterSet, ParameterValue, ScalePoint, OUTPUT_FILE_PARAMETER};
use crate::parser::{ObservableSchema, OutputParser, OutputRecord, RecordParser};
use crate::{Error, Result};

/// Suffix of the file an engine writes before its artifact is committed.
const STAGING_SUFFIX: &str = "partial";

/// Whether a build may invoke the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Invoke the engine for every scale point without an artifact.
    Build,
    /// Only read existing artifacts; never invoke the engine or write files.
    LoadOnly,
}

/// Builder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Parameters may still be invalid.
    Unconfigured,
    /// Parameters and scale points passed validation.
    Validated,
    /// Engine invocations are in flight.
    Building,
    /// Artifacts are being read.
    Loading,
    /// Last build finished and produced an [`Experiment`].
    Ready,
}

/// What to do with a record that had rejected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialRecords {
    /// Keep the valid rows; rejected rows stay on the record as diagnostics.
    #[default]
    Accept,
    /// Treat any rejected row as a failure of the scale point.
    Reject,
}

/// Where an experiment's artifacts live and how they are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    output_dir: PathBuf,
    experiment_name: String,
}

impl ProjectLayout {
    /// Artifacts of `experiment_name` go directly into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, experiment_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            experiment_name: experiment_name.into(),
        }
    }

    /// Artifacts go into `<project_dir>/<folder>`.
    #[must_use]
    pub fn in_project(
        project_dir: impl AsRef<Path>,
        folder: impl AsRef<Path>,
        experiment_name: impl Into<String>,
    ) -> Self {
        Self::new(project_dir.as_ref().join(folder), experiment_name)
    }

    /// Get the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Deterministic run id for a scale point.
    #[must_use]
    pub fn run_id(&self, scale_point: &ScalePoint, scale_variable_names: &[String]) -> String {
        scale_point.run_id(&self.experiment_name, scale_variable_names)
    }

    /// Committed artifact of a run.
    #[must_use]
    pub fn artifact_path(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(format!("{run_id}.{ARTIFACT_EXTENSION}"))
    }

    /// File the engine writes into before the artifact is committed.
    #[must_use]
    pub fn staging_path(&self, run_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{run_id}.{ARTIFACT_EXTENSION}.{STAGING_SUFFIX}"))
    }

    /// Parameter file handed to the engine.
    #[must_use]
    pub fn parameter_file_path(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(format!("{run_id}.params"))
    }

    /// Manifest written after a build.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.manifest.json", self.experiment_name))
    }
}

/// One validated unit of work. Immutable once planned.
#[derive(Debug, Clone)]
struct PlannedRun {
    scale_point: ScalePoint,
    run_id: String,
    artifact: PathBuf,
    staging: PathBuf,
    parameter_file: PathBuf,
    parameters: Vec<(String, ParameterValue)>,
}

impl PlannedRun {
    fn record(&self) -> RunRecord {
        RunRecord::new(&self.run_id, self.scale_point.clone(), &self.artifact)
    }
}

/// Settings shared by every run of one build.
#[derive(Debug)]
struct RunSettings {
    engine: Option<Arc<EngineCommand>>,
    schema: ObservableSchema,
    argument_style: ArgumentStyle,
    output_capture: OutputCapture,
    timeout: Option<Duration>,
    force_rebuild: bool,
    partial_records: PartialRecords,
}

impl RunSettings {
    fn check_partial(&self, planned: &PlannedRun, record: OutputRecord) -> Result<OutputRecord> {
        match (self.partial_records, record.rejected_rows().first()) {
            (PartialRecords::Reject, Some(first)) => Err(Error::PartialRecord {
                scale_point: planned.scale_point.clone(),
                path: planned.artifact.clone(),
                rejected: record.rejected_rows().len(),
                first: first.clone(),
            }),
            _ => Ok(record),
        }
    }
}

struct Outcome {
    run: RunRecord,
    result: Result<OutputRecord>,
}

/// Builds an [`Experiment`] from a [`ParameterSet`] and a list of scale points.
///
/// # Example
///
/// ```rust,no_run
/// use sweep_orchestrator::experiment::{BuildMode, ExperimentBuilder, ProjectLayout};
/// use sweep_orchestrator::parameters::{ParameterSet, ScalePoint};
///
/// let mut params = ParameterSet::new();
/// params.set_scale_variable_names(["L"]);
/// let mut builder = ExperimentBuilder::new(params, ProjectLayout::new("results", "ising"))
///     .scale_points([ScalePoint::from(8), ScalePoint::from(16)]);
/// let experiment = builder.build(BuildMode::LoadOnly)?;
/// println!("{} of 2 points loaded", experiment.get_results().len());
/// # Ok::<(), sweep_orchestrator::Error>(())
/// ```
#[derive(Debug)]
pub struct ExperimentBuilder {
    parameters: ParameterSet,
    layout: ProjectLayout,
    engine: Option<Arc<EngineCommand>>,
    scale_points: Vec<ScalePoint>,
    schema: ObservableSchema,
    argument_style: ArgumentStyle,
    output_capture: OutputCapture,
    timeout: Option<Duration>,
    force_rebuild: bool,
    max_concurrent_runs: usize,
    partial_records: PartialRecords,
    state: BuildState,
}

impl ExperimentBuilder {
    /// Create a builder with the default thermodynamic schema and no engine.
    #[must_use]
    pub fn new(parameters: ParameterSet, layout: ProjectLayout) -> Self {
        Self {
            parameters,
            layout,
            engine: None,
            scale_points: Vec::new(),
            schema: ObservableSchema::default(),
            argument_style: ArgumentStyle::default(),
            output_capture: OutputCapture::default(),
            timeout: None,
            force_rebuild: false,
            max_concurrent_runs: 1,
            partial_records: PartialRecords::default(),
            state: BuildState::Unconfigured,
        }
    }

    /// Set the engine command.
    #[must_use]
    pub fn engine(mut self, engine: EngineCommand) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Set the scale points to materialize, in request order.
    #[must_use]
    pub fn scale_points<I, P>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ScalePoint>,
    {
        self.scale_points = points.into_iter().map(Into::into).collect();
        self
    }

    /// Set the row layout of the engine's output.
    #[must_use]
    pub fn schema(mut self, schema: ObservableSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Set how parameters are passed to the engine.
    #[must_use]
    pub const fn argument_style(mut self, style: ArgumentStyle) -> Self {
        self.argument_style = style;
        self
    }

    /// Set where the artifact comes from.
    #[must_use]
    pub const fn output_capture(mut self, capture: OutputCapture) -> Self {
        self.output_capture = capture;
        self
    }

    /// Terminate any engine invocation running longer than `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Invoke the engine even when an artifact already exists.
    #[must_use]
    pub const fn force_rebuild(mut self, force: bool) -> Self {
        self.force_rebuild = force;
        self
    }

    /// Upper bound on engine invocations running at once (minimum 1).
    #[must_use]
    pub fn max_concurrent_runs(mut self, limit: usize) -> Self {
        self.max_concurrent_runs = limit.max(1);
        self
    }

    /// Set the policy for records with rejected rows.
    #[must_use]
    pub const fn partial_records(mut self, policy: PartialRecords) -> Self {
        self.partial_records = policy;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> BuildState {
        self.state
    }

    /// Get the project layout.
    #[must_use]
    pub const fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Get the parameter set.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Build the experiment, blocking the current thread.
    ///
    /// Inside a tokio runtime use [`Self::build_async`] instead.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if validation fails, or
    /// [`Error::NestedRuntime`] if [`BuildMode::Build`] is requested from
    /// inside a tokio runtime. Per-point failures are reported through
    /// [`Experiment::failures`].
    pub fn build(&mut self, mode: BuildMode) -> Result<Experiment> {
        match mode {
            BuildMode::LoadOnly => {
                let plan = self.plan(mode)?;
                let settings = self.settings();
                self.state = BuildState::Loading;
                let outcomes = load_plan(&settings, &plan);
                Ok(self.finish(mode, outcomes))
            }
            BuildMode::Build => {
                if tokio::runtime::Handle::try_current().is_ok() {
                    return Err(Error::NestedRuntime {
                        experiment: self.layout.experiment_name().to_string(),
                    });
                }
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(self.build_async(mode))
            }
        }
    }

    /// Build the experiment on the caller's tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if validation fails, or an IO error if
    /// the output directory cannot be created.
    pub async fn build_async(&mut self, mode: BuildMode) -> Result<Experiment> {
        let plan = self.plan(mode)?;
        let settings = Arc::new(self.settings());
        let outcomes = match mode {
            BuildMode::Build => {
                self.state = BuildState::Building;
                tokio::fs::create_dir_all(self.layout.output_dir()).await?;
                run_plan(settings, plan, self.max_concurrent_runs).await
            }
            BuildMode::LoadOnly => {
                self.state = BuildState::Loading;
                tokio::task::spawn_blocking(move || load_plan(&settings, &plan))
                    .await
                    .map_err(|err| Error::Io(std::io::Error::other(err)))?
            }
        };
        let experiment = self.finish(mode, outcomes);
        if mode == BuildMode::Build {
            let path = self.layout.manifest_path();
            match experiment.manifest().to_json() {
                Ok(json) => {
                    if let Err(err) = tokio::fs::write(&path, json).await {
                        warn!(path = %path.display(), error = %err, "failed to write manifest");
                    }
                }
                Err(err) => warn!(error = %err, "failed to serialize manifest"),
            }
        }
        Ok(experiment)
    }

    fn plan(&mut self, mode: BuildMode) -> Result<Vec<PlannedRun>> {
        self.state = BuildState::Unconfigured;
        if mode == BuildMode::Build && self.engine.is_none() {
            return Err(Error::EngineNotConfigured {
                experiment: self.layout.experiment_name().to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for point in &self.scale_points {
            if !seen.insert(point) {
                return Err(Error::DuplicateScalePoint {
                    scale_point: point.clone(),
                });
            }
        }
        self.parameters.validate(&self.scale_points)?;

        let names = self.parameters.scale_variable_names();
        let plan = self
            .scale_points
            .iter()
            .map(|point| {
                let run_id = self.layout.run_id(point, names);
                Ok(PlannedRun {
                    scale_point: point.clone(),
                    artifact: self.layout.artifact_path(&run_id),
                    staging: self.layout.staging_path(&run_id),
                    parameter_file: self.layout.parameter_file_path(&run_id),
                    parameters: self.parameters.resolve_all(point)?,
                    run_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            experiment = self.layout.experiment_name(),
            ?mode,
            points = plan.len(),
            "validated experiment"
        );
        self.state = BuildState::Validated;
        Ok(plan)
    }

    fn settings(&self) -> RunSettings {
        RunSettings {
            engine: self.engine.clone(),
            schema: self.schema.clone(),
            argument_style: self.argument_style,
            output_capture: self.output_capture,
            timeout: self.timeout,
            force_rebuild: self.force_rebuild,
            partial_records: self.partial_records,
        }
    }

    fn finish(&mut self, mode: BuildMode, outcomes: Vec<Outcome>) -> Experiment {
        let mut experiment = Experiment::new(
            self.layout.experiment_name().to_string(),
            mode,
            self.parameters.clone(),
            self.schema.clone(),
        );
        for Outcome { run, result } in outcomes {
            if let Err(err) = &result {
                warn!(run_id = run.run_id(), error = %err, "scale point not populated");
            }
            experiment.record_outcome(run, result);
        }
        info!(
            experiment = experiment.name(),
            populated = experiment.get_results().len(),
            failed = experiment.failures().len(),
            "experiment ready"
        );
        self.state = BuildState::Ready;
        experiment
    }
}

fn load_plan(settings: &RunSettings, plan: &[PlannedRun]) -> Vec<Outcome> {
    plan.par_iter().map(|planned| load_one(settings, planned)).collect()
}

fn load_one(settings: &RunSettings, planned: &PlannedRun) -> Outcome {
    let mut run = planned.record();
    let result = if planned.artifact.is_file() {
        OutputRecord::from_path(settings.schema.clone(), &planned.artifact)
            .and_then(|record| settings.check_partial(planned, record))
    } else {
        Err(Error::MissingArtifact {
            scale_point: planned.scale_point.clone(),
            path: planned.artifact.clone(),
        })
    };
    match &result {
        Ok(_) => run.complete(RunStatus::Loaded),
        Err(err) => run.fail(RunStatus::Failed, err),
    }
    Outcome { run, result }
}

async fn run_plan(settings: Arc<RunSettings>, plan: Vec<PlannedRun>, limit: usize) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(plan.len());
    if limit <= 1 {
        for planned in plan {
            outcomes.push(execute(&settings, planned).await);
        }
        return outcomes;
    }

    let permits = Arc::new(Semaphore::new(limit));
    let handles: Vec<_> = plan
        .into_iter()
        .map(|planned| {
            let run = planned.record();
            let settings = Arc::clone(&settings);
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                execute(&settings, planned).await
            });
            (run, handle)
        })
        .collect();

    for (mut run, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                let err = Error::Io(std::io::Error::other(err.to_string()));
                run.fail(RunStatus::Failed, &err);
                outcomes.push(Outcome { run, result: Err(err) });
            }
        }
    }
    outcomes
}

async fn execute(settings: &RunSettings, planned: PlannedRun) -> Outcome {
    let mut run = planned.record();

    if !settings.force_rebuild && planned.artifact.is_file() {
        debug!(run_id = %planned.run_id, "reusing existing artifact");
        let result = parse_file(settings.schema.clone(), planned.artifact.clone())
            .await
            .and_then(|record| settings.check_partial(&planned, record));
        match &result {
            Ok(_) => run.complete(RunStatus::Reused),
            Err(err) => run.fail(RunStatus::Failed, err),
        }
        return Outcome { run, result };
    }

    run.start();
    info!(run_id = %planned.run_id, scale_point = %planned.scale_point, "invoking engine");
    let result = invoke(settings, &planned).await;
    match &result {
        Ok(_) => run.complete(RunStatus::Success),
        Err(err @ Error::EngineTimeout { .. }) => run.fail(RunStatus::TimedOut, err),
        Err(err) => run.fail(RunStatus::Failed, err),
    }
    if result.is_err() {
        // best effort, the staging file may never have been written
        let _ = tokio::fs::remove_file(&planned.staging).await;
    }
    info!(run_id = %planned.run_id, status = ?run.status(), "engine run finished");
    Outcome { run, result }
}

async fn invoke(settings: &RunSettings, planned: &PlannedRun) -> Result<OutputRecord> {
    let engine = settings
        .engine
        .as_deref()
        .ok_or_else(|| Error::EngineNotConfigured {
            experiment: planned.run_id.clone(),
        })?;

    let mut parameters = planned.parameters.clone();
    parameters.push((
        OUTPUT_FILE_PARAMETER.to_string(),
        ParameterValue::Text(planned.staging.display().to_string()),
    ));
    let arguments = match settings.argument_style {
        ArgumentStyle::ParameterFile => {
            tokio::fs::write(&planned.parameter_file, render_parameter_file(&parameters)).await?;
            vec![planned.parameter_file.display().to_string()]
        }
        ArgumentStyle::Flags => render_flags(&parameters),
    };

    if tokio::fs::try_exists(&planned.staging).await? {
        tokio::fs::remove_file(&planned.staging).await?;
    }

    let invocation =
        EngineInvocation::new(engine, arguments, &planned.scale_point, settings.timeout);
    let record = match settings.output_capture {
        OutputCapture::Stdout => {
            let mut parser = RecordParser::new(settings.schema.clone());
            let output = invocation
                .run(|line_number, line| parser.consume_bytes(line_number, line))
                .await?;
            let record = parser.finish()?;
            let mut body = output.stdout.join("\n");
            body.push('\n');
            tokio::fs::write(&planned.staging, body).await?;
            record
        }
        OutputCapture::File => {
            let output = invocation.run(|_, _| {}).await?;
            if !tokio::fs::try_exists(&planned.staging).await? {
                return Err(Error::EngineExecution {
                    scale_point: planned.scale_point.clone(),
                    status: format!(
                        "exited successfully without writing {}",
                        planned.staging.display()
                    ),
                    stdout: output.stdout.join("\n"),
                    stderr: output.stderr,
                });
            }
            parse_file(settings.schema.clone(), planned.staging.clone()).await?
        }
    };

    let record = settings.check_partial(planned, record)?;
    tokio::fs::rename(&planned.staging, &planned.artifact).await?;
    debug!(artifact = %planned.artifact.display(), rows = record.len(), "artifact committed");
    Ok(record)
}

async fn parse_file(schema: ObservableSchema, path: PathBuf) -> Result<OutputRecord> {
    tokio::task::spawn_blocking(move || OutputRecord::from_path(schema, path))
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))?
}
