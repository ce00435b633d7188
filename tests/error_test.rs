//! Tests for error types

use std::path::PathBuf;
use std::time::Duration;

use sweep_orchestrator::parameters::ScalePoint;
use sweep_orchestrator::parser::{ObservableSchema, OutputRecord};
use sweep_orchestrator::Error;

fn point() -> ScalePoint {
    ScalePoint::new(vec![16, 16])
}

#[test]
fn test_incomplete_coverage_error() {
    let error = Error::IncompleteScaleCoverage {
        parameter: "therm_steps".to_string(),
        scale_point: point(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("therm_steps"));
    assert!(error_str.contains("[16, 16]"));
    assert!(error.is_configuration());
    assert_eq!(error.scale_point(), Some(&point()));
}

#[test]
fn test_dimension_mismatch_error() {
    let error = Error::ScaleDimensionMismatch {
        scale_point: ScalePoint::from(8),
        expected: 2,
        actual: 1,
        names: "Lx, Ly".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("expected 2"));
    assert!(error_str.contains("Lx, Ly"));
}

#[test]
fn test_engine_execution_error_carries_streams() {
    let error = Error::EngineExecution {
        scale_point: point(),
        status: "exit status: 2".to_string(),
        stdout: "diverged".to_string(),
        stderr: "segfault".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("exit status: 2"));
    assert!(error_str.contains("diverged"));
    assert!(error_str.contains("segfault"));
    assert!(!error.is_configuration());
}

#[test]
fn test_engine_timeout_error() {
    let error = Error::EngineTimeout {
        scale_point: point(),
        timeout: Duration::from_secs(30),
    };
    assert!(format!("{error}").contains("timed out after 30s"));
}

#[test]
fn test_missing_artifact_error() {
    let error = Error::MissingArtifact {
        scale_point: point(),
        path: PathBuf::from("results/ising_Lx16_Ly16.txt"),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Missing artifact"));
    assert!(error_str.contains("results/ising_Lx16_Ly16.txt"));
}

#[test]
fn test_parse_error_is_transparent() {
    let error = OutputRecord::from_reader(ObservableSchema::Magnetization, "".as_bytes()).unwrap_err();
    let error_str = format!("{error}");
    assert!(error_str.contains("missing header line"));
    assert!(error.scale_point().is_none());
}

#[test]
fn test_no_artifact_error() {
    let error = Error::NoArtifact {
        directory: PathBuf::from("results"),
        reason: "no .txt file retained".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("No artifact available in results"));
}

#[test]
fn test_storage_error() {
    let error = Error::Storage("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
}

#[test]
fn test_nested_runtime_error() {
    let error = Error::NestedRuntime {
        experiment: "ising".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("\"ising\""));
    assert!(error_str.contains("build_async"));
    assert!(error.is_configuration());
    assert_eq!(error.scale_point(), None);
}
