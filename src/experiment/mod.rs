//! Experiment - scale-point keyed results of one sweep
//!
//! ## Overview
//!
//! ```text
//! ParameterSet ──> ExperimentBuilder ──(Build | LoadOnly)──> Experiment
//!                        │                                      │
//!                        ├──< EngineInvocation (per point)      ├──< OutputRecord (per point)
//!                        └──> <name>.manifest.json              └──< RunRecord (per point)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sweep_orchestrator::experiment::{BuildMode, EngineCommand, ExperimentBuilder, ProjectLayout};
//! use sweep_orchestrator::parameters::{ParameterSet, ScalePoint};
//!
//! let mut params = ParameterSet::new();
//! params.set_scale_variable_names(["Lx", "Ly"]);
//! params.add_static_parameter("temperatures", vec![1.5, 2.27, 3.0])?;
//! params.add_scaling_parameter("therm_steps", [(ScalePoint::uniform(16, 2), 10_000)])?;
//!
//! let mut builder = ExperimentBuilder::new(params, ProjectLayout::new("results", "ising"))
//!     .engine(EngineCommand::cargo("../ising_calculation/Cargo.toml"))
//!     .scale_points([ScalePoint::uniform(16, 2)]);
//! let experiment = builder.build(BuildMode::Build)?;
//!
//! for (point, record) in experiment.get_results() {
//!     println!("{point}: {} rows", record.len());
//! }
//! # Ok::<(), sweep_orchestrator::Error>(())
//! ```

mod builder;
mod engine;
mod run_record;

pub use builder::{BuildMode, BuildState, ExperimentBuilder, PartialRecords, ProjectLayout};
pub use engine::{
    render_flags, render_parameter_file, ArgumentStyle, CapturedOutput, EngineCommand,
    EngineInvocation, OutputCapture,
};
pub use run_record::{RunRecord, RunStatus};

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parameters::{ParameterSet, ParameterValue, ScalePoint};
use crate::parser::{ObservableSchema, OutputRecord};
use crate::{Error, Result};

/// Built experiment: one parsed record per successfully materialized scale point.
///
/// Records are parsed once, during the build; accessors never touch the
/// engine or the filesystem.
#[derive(Debug)]
pub struct Experiment {
    name: String,
    mode: BuildMode,
    created_at: DateTime<Utc>,
    parameters: ParameterSet,
    schema: ObservableSchema,
    requested: Vec<ScalePoint>,
    results: BTreeMap<ScalePoint, OutputRecord>,
    failures: BTreeMap<ScalePoint, Error>,
    runs: Vec<RunRecord>,
}

impl Experiment {
    pub(crate) fn new(
        name: String,
        mode: BuildMode,
        parameters: ParameterSet,
        schema: ObservableSchema,
    ) -> Self {
        Self {
            name,
            mode,
            created_at: Utc::now(),
            parameters,
            schema,
            requested: Vec::new(),
            results: BTreeMap::new(),
            failures: BTreeMap::new(),
            runs: Vec::new(),
        }
    }

    pub(crate) fn record_outcome(&mut self, run: RunRecord, result: Result<OutputRecord>) {
        let point = run.scale_point().clone();
        self.requested.push(point.clone());
        match result {
            Ok(record) => {
                self.results.insert(point, record);
            }
            Err(err) => {
                self.failures.insert(point, err);
            }
        }
        self.runs.push(run);
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mode the experiment was built in.
    #[must_use]
    pub const fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Parameter set the experiment was built from.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Row layout every record was parsed with.
    #[must_use]
    pub const fn schema(&self) -> &ObservableSchema {
        &self.schema
    }

    /// Ordered scale-variable names.
    #[must_use]
    pub fn scale_variable_names(&self) -> &[String] {
        self.parameters.scale_variable_names()
    }

    /// Scale points that were populated, in request order.
    #[must_use]
    pub fn get_scale_variable_values(&self) -> Vec<&ScalePoint> {
        self.requested
            .iter()
            .filter(|point| self.results.contains_key(*point))
            .collect()
    }

    /// Parsed record per populated scale point.
    #[must_use]
    pub const fn get_results(&self) -> &BTreeMap<ScalePoint, OutputRecord> {
        &self.results
    }

    /// Parsed record for one scale point.
    #[must_use]
    pub fn get_result(&self, scale_point: &ScalePoint) -> Option<&OutputRecord> {
        self.results.get(scale_point)
    }

    /// Every scale point the build was asked for, in request order.
    #[must_use]
    pub fn requested(&self) -> &[ScalePoint] {
        &self.requested
    }

    /// Failure per scale point that was requested but not populated.
    #[must_use]
    pub const fn failures(&self) -> &BTreeMap<ScalePoint, Error> {
        &self.failures
    }

    /// Whether every requested scale point was populated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Run bookkeeping, in request order.
    #[must_use]
    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Serializable summary of the build.
    #[must_use]
    pub fn manifest(&self) -> ExperimentManifest {
        ExperimentManifest {
            experiment: self.name.clone(),
            mode: self.mode,
            created_at: self.created_at,
            scale_variable_names: self.parameters.scale_variable_names().to_vec(),
            static_parameters: self.parameters.static_parameters().clone(),
            runs: self.runs.clone(),
        }
    }
}

/// Persisted summary of one build: parameters and per-run bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentManifest {
    /// Experiment name
    pub experiment: String,
    /// Build mode
    pub mode: BuildMode,
    /// When the experiment was built
    pub created_at: DateTime<Utc>,
    /// Ordered scale-variable names
    pub scale_variable_names: Vec<String>,
    /// Parameters shared by every scale point
    pub static_parameters: BTreeMap<String, ParameterValue>,
    /// One record per requested scale point
    pub runs: Vec<RunRecord>,
}

impl ExperimentManifest {
    /// Read a manifest written by a previous build.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read or is not a manifest.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&bytes).map_err(|err| Error::Io(err.into()))
    }

    /// Pretty JSON form of the manifest.
    ///
    /// # Errors
    ///
    /// Returns an IO error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::Io(err.into()))
    }
}
