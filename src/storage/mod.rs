//! Columnar export of experiment results (Arrow/Parquet)
//!
//! One [`RecordBatch`] per populated scale point, in request order:
//!
//! ```text
//! Lx: Int64 | Ly: Int64 | temperature: Float64 | energy: Float64 | ...
//! ```
//!
//! Scale-variable columns repeat the point's coordinates on every row so
//! the file can be filtered without a join. Batches are append-only.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::experiment::Experiment;
use crate::parameters::ScalePoint;
use crate::parser::{ObservableSchema, OutputRecord};
use crate::{Error, Result};

/// Arrow table of every populated scale point of an experiment.
#[derive(Debug, Clone)]
pub struct ResultTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ResultTable {
    /// Create an empty table for the given scale variables and observables.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a scale variable shares a name with an observable.
    pub fn new(scale_variable_names: &[String], observables: &ObservableSchema) -> Result<Self> {
        let fields = observables.fields();
        if let Some(clash) = scale_variable_names
            .iter()
            .find(|name| fields.contains(&name.as_str()))
        {
            return Err(Error::Storage(format!(
                "Column \"{clash}\" is both a scale variable and an observable"
            )));
        }
        let columns: Vec<Field> = scale_variable_names
            .iter()
            .map(|name| Field::new(name, DataType::Int64, false))
            .chain(
                fields
                    .iter()
                    .map(|name| Field::new(*name, DataType::Float64, false)),
            )
            .collect();
        Ok(Self {
            schema: Arc::new(Schema::new(columns)),
            batches: Vec::new(),
        })
    }

    /// Flatten an experiment's results into one batch per scale point.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the columns cannot be assembled.
    pub fn from_experiment(experiment: &Experiment) -> Result<Self> {
        let mut table = Self::new(experiment.scale_variable_names(), experiment.schema())?;
        for point in experiment.get_scale_variable_values() {
            if let Some(record) = experiment.get_result(point) {
                table.push_record(point, record)?;
            }
        }
        debug!(
            experiment = experiment.name(),
            batches = table.batches.len(),
            rows = table.num_rows(),
            "built result table"
        );
        Ok(table)
    }

    /// Append one scale point's record as a batch.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the point's arity or the record's width
    /// does not match the table.
    pub fn push_record(&mut self, scale_point: &ScalePoint, record: &OutputRecord) -> Result<()> {
        let rows = record.len();
        let mut arrays: Vec<ArrayRef> = scale_point
            .coordinates()
            .iter()
            .map(|&value| Arc::new(Int64Array::from(vec![value; rows])) as ArrayRef)
            .collect();
        arrays.extend(
            record
                .columns()
                .iter()
                .map(|column| Arc::new(Float64Array::from(column.clone())) as ArrayRef),
        );
        if arrays.len() != self.schema.fields().len() {
            return Err(Error::Storage(format!(
                "Scale point {scale_point} yields {} columns, table has {}",
                arrays.len(),
                self.schema.fields().len()
            )));
        }
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), arrays)?;
        self.append_batch(batch)
    }

    /// Append a batch.
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match the table
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.schema() != self.schema {
            return Err(Error::Storage(format!(
                "Schema mismatch: expected {:?}, got {:?}",
                self.schema,
                batch.schema()
            )));
        }
        self.batches.push(batch);
        Ok(())
    }

    /// Get the table schema.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total rows across batches.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Write the table to a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(file, Arc::clone(&self.schema), Some(props))?;
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.close()?;
        debug!(path = %path.as_ref().display(), rows = self.num_rows(), "wrote parquet");
        Ok(())
    }

    /// Load table from Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Storage(format!("Failed to parse Parquet file: {e}")))?;
        let schema = Arc::clone(builder.schema());

        let reader = builder
            .build()
            .map_err(|e| Error::Storage(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch =
                batch.map_err(|e| Error::Storage(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        Ok(Self { schema, batches })
    }
}
