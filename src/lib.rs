//! # Sweep Orchestrator: scale-variable sweeps over external simulation engines
//!
//! **Version**: 0.1.0
//!
//! Runs an external engine (e.g. a Monte Carlo Ising simulation) once per
//! point of a finite-size scaling sweep, hands it the parameters resolved for
//! that point, and ingests the structured output it writes into per-point
//! records keyed by scale point.
//!
//! ## Design Principles
//!
//! - **Validate before invoking**: parameter coverage and scale arity are
//!   checked for the whole sweep before the first engine starts
//! - **Idempotent builds**: existing artifacts are reused, never recomputed
//! - **Failure isolation**: one bad scale point or bad row never poisons its siblings
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sweep_orchestrator::experiment::{BuildMode, EngineCommand, ExperimentBuilder, ProjectLayout};
//! use sweep_orchestrator::parameters::{ParameterSet, ScalePoint};
//! use sweep_orchestrator::storage::ResultTable;
//!
//! let mut params = ParameterSet::new();
//! params.set_scale_variable_names(["Lx", "Ly"]);
//! params.add_static_parameter("temperatures", vec![2.0, 2.27, 2.5])?;
//!
//! let points = [8, 16, 32].map(|l| ScalePoint::uniform(l, 2));
//! params.add_scaling_parameter("therm_steps", points.iter().map(|p| (p.clone(), 10_000)))?;
//!
//! let mut builder = ExperimentBuilder::new(params, ProjectLayout::new("results", "ising"))
//!     .engine(EngineCommand::cargo("ising_calculation/Cargo.toml"))
//!     .scale_points(points);
//! let experiment = builder.build(BuildMode::Build)?;
//!
//! ResultTable::from_experiment(&experiment)?.write_parquet("results/ising.parquet")?;
//! # Ok::<(), sweep_orchestrator::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod error;
pub mod experiment;
pub mod parameters;
pub mod parser;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};
