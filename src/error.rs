//! Error types for the sweep orchestrator
//!
//! Configuration errors abort a whole build request. Engine, artifact and
//! record errors are scoped to one scale point and collected alongside the
//! results that did succeed.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::parameters::ScalePoint;
use crate::parser::ParseError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sweep orchestrator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Parameter name registered twice (static, scaling, or reserved)
    #[error("Duplicate parameter \"{name}\": already registered as {existing}")]
    DuplicateParameter {
        /// Offending parameter name
        name: String,
        /// Where the name is already in use
        existing: &'static str,
    },

    /// Parameter is neither static nor scaling
    #[error("Unknown parameter \"{name}\" requested for scale point {scale_point}")]
    UnknownParameter {
        /// Requested parameter name
        name: String,
        /// Scale point the lookup was made for
        scale_point: ScalePoint,
    },

    /// Scaling parameter has no value for a requested scale point
    #[error("Scaling parameter \"{parameter}\" has no value for scale point {scale_point}")]
    IncompleteScaleCoverage {
        /// Scaling parameter lacking an entry
        parameter: String,
        /// Scale point without a value
        scale_point: ScalePoint,
    },

    /// Scale point arity differs from the declared scale variables
    #[error("Scale point {scale_point} has {actual} coordinates, expected {expected} ({names})")]
    ScaleDimensionMismatch {
        /// Offending scale point
        scale_point: ScalePoint,
        /// Number of declared scale variables
        expected: usize,
        /// Number of coordinates in the scale point
        actual: usize,
        /// Declared scale variable names, comma separated
        names: String,
    },

    /// Scale point requested more than once in one build
    #[error("Scale point {scale_point} requested more than once")]
    DuplicateScalePoint {
        /// Repeated scale point
        scale_point: ScalePoint,
    },

    /// Build mode requested without an engine command
    #[error("No engine command configured for experiment \"{experiment}\"; use load-only mode or set an engine")]
    EngineNotConfigured {
        /// Experiment name
        experiment: String,
    },

    /// Blocking build requested from inside an async runtime
    #[error("Cannot block on building experiment \"{experiment}\" from inside a tokio runtime; use build_async")]
    NestedRuntime {
        /// Experiment name
        experiment: String,
    },

    /// Engine exited with a non-zero status
    #[error("Engine failed for scale point {scale_point} ({status})\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    EngineExecution {
        /// Scale point whose invocation failed
        scale_point: ScalePoint,
        /// Exit status description
        status: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Engine exceeded the caller-supplied timeout and was terminated
    #[error("Engine timed out after {timeout:?} for scale point {scale_point}")]
    EngineTimeout {
        /// Scale point whose invocation was cancelled
        scale_point: ScalePoint,
        /// Configured timeout
        timeout: Duration,
    },

    /// Load-only mode found no artifact for a scale point
    #[error("Missing artifact for scale point {scale_point}: {}", .path.display())]
    MissingArtifact {
        /// Scale point without an artifact
        scale_point: ScalePoint,
        /// Expected artifact location
        path: PathBuf,
    },

    /// Row-level or header-level parse failure
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Record had rejected rows while partial records are refused
    #[error("Artifact {} for scale point {scale_point} has {rejected} rejected row(s); first: {first}", .path.display())]
    PartialRecord {
        /// Scale point of the partial record
        scale_point: ScalePoint,
        /// Artifact that was parsed
        path: PathBuf,
        /// Number of rejected rows
        rejected: usize,
        /// First row error
        first: ParseError,
    },

    /// Artifact selection found nothing to return
    #[error("No artifact available in {}: {reason}", .directory.display())]
    NoArtifact {
        /// Directory that was scanned, empty if none was
        directory: PathBuf,
        /// Why selection came up empty
        reason: String,
    },

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Logging could not be installed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is a configuration error that aborts a whole build.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateParameter { .. }
                | Self::UnknownParameter { .. }
                | Self::IncompleteScaleCoverage { .. }
                | Self::ScaleDimensionMismatch { .. }
                | Self::DuplicateScalePoint { .. }
                | Self::EngineNotConfigured { .. }
                | Self::NestedRuntime { .. }
        )
    }

    /// The scale point this error is scoped to, if any.
    #[must_use]
    pub const fn scale_point(&self) -> Option<&ScalePoint> {
        match self {
            Self::UnknownParameter { scale_point, .. }
            | Self::IncompleteScaleCoverage { scale_point, .. }
            | Self::ScaleDimensionMismatch { scale_point, .. }
            | Self::DuplicateScalePoint { scale_point }
            | Self::EngineExecution { scale_point, .. }
            | Self::EngineTimeout { scale_point, .. }
            | Self::MissingArtifact { scale_point, .. }
            | Self::PartialRecord { scale_point, .. } => Some(scale_point),
            _ => None,
        }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Self::Storage(err.to_string())
    }
}
