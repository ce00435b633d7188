//! Latest Artifact: inspect the newest result without an orchestrator session
//!
//! Scans a results directory, keeps `.txt` artifacts whose name contains the
//! keyword, and prints the series of the most recently modified one.
//!
//! Run with: cargo run --example latest_artifact -- [results dir] [keyword]

use anyhow::{bail, Result};
use sweep_orchestrator::artifact::ArtifactSelector;
use sweep_orchestrator::parser::ObservableSchema;
use sweep_orchestrator::telemetry;

fn main() -> Result<()> {
    telemetry::init(telemetry::DEFAULT_DIRECTIVE)?;

    let mut args = std::env::args().skip(1);
    let directory = args.next().unwrap_or_else(|| "results".to_string());
    let keyword = args.next().unwrap_or_else(|| "magnetization".to_string());

    let mut selector = ArtifactSelector::new();
    let found = selector.discover(&directory)?;
    println!("Found {found} artifact(s) in {directory}");

    if !selector.filter_by_keyword(&keyword) {
        bail!("no artifact in {directory} matches \"{keyword}\"");
    }
    let latest = selector.latest()?;
    println!("Latest: {} (modified {})", latest.name(), latest.modified());

    let record = selector.load_latest(ObservableSchema::Magnetization)?;
    for row in record.rows() {
        println!("  {row:?}");
    }
    Ok(())
}
