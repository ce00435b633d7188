//! Output Record - parsed observable series of one artifact

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ObservableSchema, OutputParser, ParseError, RecordParser};
use crate::Result;

/// Structured form of one artifact.
///
/// All series are kept in lock-step: every accepted row appends exactly one
/// value to each schema field, so `series(a).len() == series(b).len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub(super) schema: ObservableSchema,
    pub(super) observable_names: Vec<String>,
    pub(super) elapsed_time: Option<f64>,
    pub(super) columns: Vec<Vec<f64>>,
    pub(super) rejected_rows: Vec<ParseError>,
}

impl OutputRecord {
    pub(super) fn empty(schema: ObservableSchema) -> Self {
        let columns = vec![Vec::new(); schema.width()];
        Self {
            schema,
            observable_names: Vec::new(),
            elapsed_time: None,
            columns,
            rejected_rows: Vec::new(),
        }
    }

    pub(super) fn push_row(&mut self, row: &[f64]) {
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(*value);
        }
    }

    /// Parse a whole artifact from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an IO error if reading fails, or a parse error if the stream
    /// has no header. Row failures, including rows that are not valid UTF-8,
    /// are kept on the record.
    pub fn from_reader<R: BufRead>(schema: ObservableSchema, reader: R) -> Result<Self> {
        let mut parser = RecordParser::new(schema);
        for (line_number, line) in reader.split(b'\n').enumerate() {
            parser.consume_bytes(line_number, &line?);
        }
        Ok(parser.finish()?)
    }

    /// Parse the artifact at `path`.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::from_reader`], or if the file cannot be opened.
    pub fn from_path(schema: ObservableSchema, path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(schema, BufReader::new(file))
    }

    /// Get the schema rows were decoded with.
    #[must_use]
    pub const fn schema(&self) -> &ObservableSchema {
        &self.schema
    }

    /// Observable names as listed in the header.
    #[must_use]
    pub fn observable_names(&self) -> &[String] {
        &self.observable_names
    }

    /// Elapsed time reported by the header, `None` when absent.
    #[must_use]
    pub const fn elapsed_time(&self) -> Option<f64> {
        self.elapsed_time
    }

    /// Series for one schema field.
    #[must_use]
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.schema
            .index_of(name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// All series keyed by schema field name.
    #[must_use]
    pub fn series_map(&self) -> BTreeMap<&str, &[f64]> {
        self.schema
            .fields()
            .into_iter()
            .zip(self.columns.iter().map(Vec::as_slice))
            .collect()
    }

    /// Series in schema order.
    #[must_use]
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Number of accepted rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Whether no row was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row `idx` across all series, in schema order.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|column| column[idx]).collect())
    }

    /// Iterate over accepted rows in source order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..self.len()).filter_map(|idx| self.row(idx))
    }

    /// Rows rejected while parsing.
    #[must_use]
    pub fn rejected_rows(&self) -> &[ParseError] {
        &self.rejected_rows
    }

    /// Whether every data row was accepted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.rejected_rows.is_empty()
    }

    /// Write the record back in artifact format.
    ///
    /// Rejected rows are not written.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let names = self.observable_names.join(", ");
        match self.elapsed_time {
            Some(elapsed) => writeln!(writer, "{names}:{elapsed}")?,
            None => writeln!(writer, "{names}")?,
        }
        for row in self.rows() {
            let fields: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(writer, "{}", fields.join(", "))?;
        }
        Ok(())
    }
}
