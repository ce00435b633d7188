//! Ising Sweep: finite-size scaling over square lattices
//!
//! Builds one engine run per lattice size, then prints the magnetisation
//! near the critical temperature for each size and exports everything to
//! Parquet. Re-running only invokes the engine for sizes without an artifact.
//!
//! Run with: cargo run --example ising_sweep -- <engine Cargo.toml> [output dir]
//! Load existing results only: SWEEP_LOAD_ONLY=1 cargo run --example ising_sweep -- <engine Cargo.toml>

use std::time::Duration;

use anyhow::{Context, Result};
use sweep_orchestrator::experiment::{BuildMode, EngineCommand, ExperimentBuilder, ProjectLayout};
use sweep_orchestrator::parameters::{ParameterSet, ScalePoint};
use sweep_orchestrator::storage::ResultTable;
use sweep_orchestrator::telemetry;

fn main() -> Result<()> {
    telemetry::init(telemetry::DEFAULT_DIRECTIVE)?;

    let mut args = std::env::args().skip(1);
    let engine_manifest = args
        .next()
        .context("usage: ising_sweep <engine Cargo.toml> [output dir]")?;
    let output_dir = args.next().unwrap_or_else(|| "results".to_string());
    let mode = if std::env::var_os("SWEEP_LOAD_ONLY").is_some() {
        BuildMode::LoadOnly
    } else {
        BuildMode::Build
    };

    let sizes = [8, 16, 32, 64];
    let points: Vec<ScalePoint> = sizes.iter().map(|&l| ScalePoint::uniform(l, 2)).collect();
    let temperatures: Vec<f64> = (0..21).map(|i| 2.0 + 0.025 * f64::from(i)).collect();

    let mut params = ParameterSet::new();
    params.set_scale_variable_names(["Lx", "Ly"]);
    params.add_static_parameter("temperatures", temperatures)?;
    params.add_static_parameter("measure_corr_len", true)?;
    // larger lattices decorrelate more slowly near T_c
    params.add_scaling_parameter(
        "therm_steps",
        points.iter().map(|p| (p.clone(), 1_000 * p.coordinates()[0])),
    )?;
    params.add_scaling_parameter(
        "measure_steps",
        points.iter().map(|p| (p.clone(), 5_000 * p.coordinates()[0])),
    )?;

    println!("=== Ising Finite-Size Sweep ({mode:?}) ===\n");
    let mut builder = ExperimentBuilder::new(params, ProjectLayout::new(&output_dir, "ising"))
        .engine(EngineCommand::cargo(&engine_manifest))
        .scale_points(points)
        .timeout(Duration::from_secs(3_600))
        .max_concurrent_runs(2);
    let experiment = builder.build(mode)?;

    for point in experiment.get_scale_variable_values() {
        let Some(record) = experiment.get_result(point) else {
            continue;
        };
        let (Some(temperature), Some(magnetisation)) =
            (record.series("temperature"), record.series("magnetisation"))
        else {
            continue;
        };
        println!("L = {point}");
        if let Some(elapsed) = record.elapsed_time() {
            println!("  elapsed: {elapsed:.1} s");
        }
        for (t, m) in temperature.iter().zip(magnetisation) {
            println!("  T = {t:.3}  |m| = {m:.4}");
        }
        if !record.is_complete() {
            println!("  ({} rows rejected)", record.rejected_rows().len());
        }
    }

    for (point, err) in experiment.failures() {
        println!("L = {point} failed: {err}");
    }

    let parquet = std::path::Path::new(&output_dir).join("ising.parquet");
    if !experiment.get_results().is_empty() {
        ResultTable::from_experiment(&experiment)?
            .write_parquet(&parquet)
            .with_context(|| format!("writing {}", parquet.display()))?;
        println!("\nWrote {}", parquet.display());
    }
    Ok(())
}
