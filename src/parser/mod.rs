//! Output Parser - turns one engine output stream into an [`OutputRecord`]
//!
//! ## Artifact Format
//!
//! ```text
//! temperature, energy, magnetisation, specific_heat, susceptibility, corr_length:12.5
//! 2.0, -1.5, 0.8, 0.3, 0.01, 4.2
//! 2.1, -1.4, 0.7, 0.4, 0.02, 3.9
//! ```
//!
//! Line 0 is the header: observable names, optionally followed by `:` and
//! the elapsed time. Every later line is one row of comma separated floats
//! in the order of the record's [`ObservableSchema`].
//!
//! A bad row is rejected on its own and kept as a [`ParseError`] on the
//! record; sibling rows are unaffected.

mod record;
mod schema;

pub use record::OutputRecord;
pub use schema::{ObservableSchema, MAGNETIZATION_FIELDS, THERMODYNAMIC_FIELDS};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Separator between the header's names and its elapsed time.
pub const METADATA_SEPARATOR: char = ':';

/// Separator between the fields of a row. Header names may also be
/// separated by whitespace.
pub const FIELD_SEPARATOR: char = ',';

/// A line that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("line {line_number}: {reason} (\"{content}\")")]
pub struct ParseError {
    /// 0-based line index in the artifact
    pub line_number: usize,
    /// Raw line content
    pub content: String,
    /// Cause of the rejection
    pub reason: String,
}

impl ParseError {
    fn new(line_number: usize, content: &str, reason: impl Into<String>) -> Self {
        Self {
            line_number,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}

/// Consumes one line at a time and accumulates structured state.
pub trait OutputParser {
    /// Structured result produced once the stream is exhausted.
    type Output;

    /// Decode one line given its 0-based index.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] naming the line when it cannot be decoded.
    fn parse_line(&mut self, line_number: usize, line: &str) -> Result<(), ParseError>;

    /// Keep a row-level failure as a diagnostic.
    fn reject(&mut self, error: ParseError);

    /// Finish the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the stream never produced a header.
    fn finish(self) -> Result<Self::Output, ParseError>;

    /// Decode one line, recording instead of returning any failure.
    fn consume(&mut self, line_number: usize, line: &str) {
        if let Err(err) = self.parse_line(line_number, line) {
            warn!(line = line_number, reason = %err.reason, "rejected output row");
            self.reject(err);
        }
    }

    /// Decode one raw line. A row that is not valid UTF-8 is rejected on its
    /// own; a header is decoded lossily so the rows after it still parse.
    fn consume_bytes(&mut self, line_number: usize, bytes: &[u8]) {
        match std::str::from_utf8(bytes) {
            Ok(line) => self.consume(line_number, line),
            Err(_) if line_number == 0 => {
                warn!("header is not valid UTF-8");
                self.consume(line_number, &String::from_utf8_lossy(bytes));
            }
            Err(err) => {
                let content = String::from_utf8_lossy(bytes);
                warn!(line = line_number, "rejected output row: invalid UTF-8");
                self.reject(ParseError::new(line_number, &content, format!("invalid UTF-8: {err}")));
            }
        }
    }
}

/// Schema-driven parser producing an [`OutputRecord`].
#[derive(Debug, Clone)]
pub struct RecordParser {
    record: OutputRecord,
    header_seen: bool,
}

impl RecordParser {
    /// Create a parser for rows laid out as `schema`.
    #[must_use]
    pub fn new(schema: ObservableSchema) -> Self {
        Self {
            record: OutputRecord::empty(schema),
            header_seen: false,
        }
    }

    fn parse_header(&mut self, line: &str) {
        let with_time = line.split_once(METADATA_SEPARATOR).and_then(|(names, time)| {
            time.trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite() && *t >= 0.0)
                .map(|t| (names, t))
        });
        let names = match with_time {
            Some((names, elapsed)) => {
                self.record.elapsed_time = Some(elapsed);
                names
            }
            None => {
                warn!(header = line, "no elapsed time found in header");
                self.record.elapsed_time = None;
                line
            }
        };
        self.record.observable_names = names
            .split(|c: char| c == FIELD_SEPARATOR || c.is_whitespace())
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect();
        if self.record.observable_names.len() != self.record.schema.width() {
            debug!(
                header = self.record.observable_names.len(),
                schema = self.record.schema.width(),
                "header names differ from schema width"
            );
        }
    }

    fn parse_row(&self, line_number: usize, line: &str) -> Result<Vec<f64>, ParseError> {
        let width = self.record.schema.width();
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
        if fields.len() < width {
            return Err(ParseError::new(
                line_number,
                line,
                format!("expected {width} fields, found {}", fields.len()),
            ));
        }
        fields
            .iter()
            .take(width)
            .enumerate()
            .map(|(idx, field)| {
                field.parse::<f64>().map_err(|err| {
                    ParseError::new(line_number, line, format!("field {idx} \"{field}\": {err}"))
                })
            })
            .collect()
    }
}

impl OutputParser for RecordParser {
    type Output = OutputRecord;

    fn parse_line(&mut self, line_number: usize, line: &str) -> Result<(), ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line_number == 0 {
            self.header_seen = true;
            self.parse_header(line);
            return Ok(());
        }
        if line.trim().is_empty() {
            return Ok(());
        }
        let row = self.parse_row(line_number, line)?;
        self.record.push_row(&row);
        Ok(())
    }

    fn reject(&mut self, error: ParseError) {
        self.record.rejected_rows.push(error);
    }

    fn finish(self) -> Result<OutputRecord, ParseError> {
        if self.header_seen {
            Ok(self.record)
        } else {
            Err(ParseError::new(0, "", "missing header line"))
        }
    }
}
