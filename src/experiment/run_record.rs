//! Run Record - bookkeeping for one scale point's invocation or load

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parameters::ScalePoint;

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is planned but not yet started.
    Pending,
    /// Engine is currently executing.
    Running,
    /// Engine exited successfully and its artifact was parsed.
    Success,
    /// An existing artifact was reused instead of invoking the engine.
    Reused,
    /// Artifact was read in load-only mode.
    Loaded,
    /// Invocation, artifact or record failed.
    Failed,
    /// Engine exceeded its timeout and was terminated.
    TimedOut,
}

impl RunStatus {
    /// Whether the run produced a usable record.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Reused | Self::Loaded)
    }
}

/// Run Record tracks one scale point from planning to completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    scale_point: ScalePoint,
    artifact: PathBuf,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Deterministic identifier derived from the scale point
    /// * `scale_point` - Scale point the run materializes
    /// * `artifact` - Where the run's artifact lives
    #[must_use]
    pub fn new(run_id: impl Into<String>, scale_point: ScalePoint, artifact: impl Into<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            scale_point,
            artifact: artifact.into(),
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the scale point.
    #[must_use]
    pub const fn scale_point(&self) -> &ScalePoint {
        &self.scale_point
    }

    /// Get the artifact path.
    #[must_use]
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Failure description, if the run failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start the run, transitioning from Pending to Running.
    ///
    /// Sets the `started_at` timestamp to now.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Complete the run with the given final status.
    ///
    /// Sets the `ended_at` timestamp to now; `started_at` is filled in too if
    /// the run never went through [`Self::start`].
    pub fn complete(&mut self, status: RunStatus) {
        let now = Utc::now();
        self.status = status;
        self.started_at.get_or_insert(now);
        self.ended_at = Some(now);
    }

    /// Complete the run as failed, keeping the failure description.
    pub fn fail(&mut self, status: RunStatus, error: impl ToString) {
        self.complete(status);
        self.error = Some(error.to_string());
    }
}
