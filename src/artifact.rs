//! Artifact Selector - locate result files by recency and keyword
//!
//! Used when results are inspected without an orchestrator session, e.g.
//! picking the newest magnetization run from a results directory:
//!
//! ```rust,no_run
//! use sweep_orchestrator::artifact::ArtifactSelector;
//! use sweep_orchestrator::parser::ObservableSchema;
//!
//! let mut selector = ArtifactSelector::new();
//! selector.discover("results")?;
//! if selector.filter_by_keyword("magnetization") {
//!     let record = selector.load_latest(ObservableSchema::Magnetization)?;
//!     println!("{} rows", record.len());
//! }
//! # Ok::<(), sweep_orchestrator::Error>(())
//! ```
//!
//! Modification times are a heuristic: filesystems with coarse timestamps
//! can report equal times for distinct runs. Ties are broken by file name,
//! the lexically greatest name wins.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::{ObservableSchema, OutputRecord};
use crate::{Error, Result};

/// Extension of engine artifacts.
pub const ARTIFACT_EXTENSION: &str = "txt";

/// A candidate artifact and its modification time.
///
/// Immutable once constructed; every scan builds fresh entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimedFile {
    name: String,
    path: PathBuf,
    modified: DateTime<Utc>,
}

impl TimedFile {
    /// Create a timed file entry.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            modified,
        }
    }

    /// Build an entry from file metadata.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the metadata or modification time is unavailable.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let modified = fs::metadata(path)?.modified()?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, path, DateTime::<Utc>::from(modified)))
    }

    /// Get the file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the full path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the modification time.
    #[must_use]
    pub const fn modified(&self) -> DateTime<Utc> {
        self.modified
    }
}

/// Two-stage discover/filter selection of the latest artifact.
#[derive(Debug, Clone)]
pub struct ArtifactSelector {
    extension: String,
    directory: Option<PathBuf>,
    retained: Vec<TimedFile>,
}

impl Default for ArtifactSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactSelector {
    /// Create a selector for `.txt` artifacts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_extension(ARTIFACT_EXTENSION)
    }

    /// Create a selector for files with a different extension.
    #[must_use]
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            directory: None,
            retained: Vec::new(),
        }
    }

    /// Scan `directory` for artifacts, replacing any previous scan.
    ///
    /// Returns the number of entries found; an empty directory yields zero.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be read.
    pub fn discover(&mut self, directory: impl AsRef<Path>) -> Result<usize> {
        let directory = directory.as_ref();
        let mut found = Vec::new();
        for entry in fs::read_dir(directory)? {
            if let Some(file) = self.timed_entry(&entry?.path())? {
                found.push(file);
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(directory = %directory.display(), found = found.len(), "discovered artifacts");

        self.directory = Some(directory.to_path_buf());
        self.retained = found;
        Ok(self.retained.len())
    }

    /// A regular file with the tracked extension; `None` for anything else,
    /// including entries removed between listing and inspection.
    fn timed_entry(&self, path: &Path) -> Result<Option<TimedFile>> {
        let matches = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy() == self.extension);
        if !matches {
            return Ok(None);
        }
        match TimedFile::from_path(path) {
            Ok(file) if path.is_file() => Ok(Some(file)),
            Ok(_) => Ok(None),
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "artifact vanished during discovery");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Keep only entries whose name contains `keyword`.
    ///
    /// Returns whether any entry remains.
    pub fn filter_by_keyword(&mut self, keyword: &str) -> bool {
        self.retained.retain(|file| file.name.contains(keyword));
        !self.retained.is_empty()
    }

    /// Entries currently retained, ordered by name.
    #[must_use]
    pub fn retained(&self) -> &[TimedFile] {
        &self.retained
    }

    /// The retained entry with the greatest modification time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoArtifact`] before any discovery or when nothing is retained.
    pub fn latest(&self) -> Result<&TimedFile> {
        let Some(directory) = &self.directory else {
            return Err(Error::NoArtifact {
                directory: PathBuf::new(),
                reason: "no directory has been discovered".to_string(),
            });
        };
        self.retained
            .iter()
            .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
            .ok_or_else(|| Error::NoArtifact {
                directory: directory.clone(),
                reason: format!("no .{} file retained", self.extension),
            })
    }

    /// Parse the latest retained artifact.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::latest`], or if the artifact cannot be read or has no header.
    pub fn load_latest(&self, schema: ObservableSchema) -> Result<OutputRecord> {
        let latest = self.latest()?;
        debug!(artifact = latest.name(), "loading latest artifact");
        OutputRecord::from_path(schema, latest.path())
    }
}
