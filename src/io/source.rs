//! Flat record sources.
//!
//! [`BatchSource`] serves rows out of Arrow record batches held in memory. It
//! is built directly from batches, or from one or more Parquet files which are
//! read whole, in file order.

use crate::error::{FillError, IoContext, Result};
use crate::value::ValueSlot;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A value slot bound to one input column.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub column: usize,
    pub slot: ValueSlot,
}

/// Row-addressable input with a fixed schema.
pub trait RecordSource {
    fn schema(&self) -> SchemaRef;

    fn num_rows(&self) -> usize;

    /// Load row `row` into every binding's slot.
    ///
    /// # Errors
    /// Returns an `IOError` if the row does not exist, or a `TypeError` if a
    /// column does not match its slot.
    fn load(&mut self, row: usize, bindings: &mut [Binding]) -> Result<()>;
}

/// Record batches with a shared schema, addressed by global row index.
#[derive(Debug, Clone)]
pub struct BatchSource {
    origin: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    /// First global row of each batch.
    starts: Vec<usize>,
    rows: usize,
}

impl BatchSource {
    /// Serve a single batch.
    #[must_use]
    pub fn new(batch: RecordBatch) -> Self {
        let schema = batch.schema();
        let rows = batch.num_rows();
        Self {
            origin: "<memory>".to_string(),
            schema,
            batches: vec![batch],
            starts: vec![0],
            rows,
        }
    }

    /// Serve several batches in order.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if a batch's fields differ from `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        Self::assemble("<memory>".to_string(), schema, batches)
    }

    /// Read a whole Parquet file.
    ///
    /// # Errors
    /// Returns an `IOError` if the file cannot be opened or decoded.
    pub fn open_parquet(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (schema, batches) = read_parquet_batches(path)?;
        Self::assemble(path.display().to_string(), schema, batches)
    }

    /// Read several Parquet files with identical fields, concatenated in order.
    ///
    /// # Errors
    /// Returns an `IOError` if no path is given or a file cannot be read, and
    /// a `ConfigurationError` if the files' fields differ.
    pub fn open_parquet_files(paths: &[PathBuf]) -> Result<Self> {
        let Some(first) = paths.first() else {
            return Err(FillError::io(
                "open parquet inputs",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no input files"),
            ));
        };
        let (schema, mut batches) = read_parquet_batches(first)?;
        for path in &paths[1..] {
            let (other, more) = read_parquet_batches(path)?;
            if other.fields() != schema.fields() {
                return Err(FillError::configuration(format!(
                    "fields of {} differ from {}",
                    path.display(),
                    first.display()
                )));
            }
            batches.extend(more);
        }
        let origin = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self::assemble(origin, schema, batches)
    }

    /// Read every Parquet file matching a glob pattern, in sorted order.
    ///
    /// # Errors
    /// Returns an `IOError` if the pattern matches nothing or a file cannot be
    /// read, and a `ConfigurationError` if the files' fields differ.
    #[cfg(feature = "glob")]
    pub fn open_parquet_glob(pattern: &str) -> Result<Self> {
        let files = crate::io::glob::expand_glob_required(pattern)?;
        Self::open_parquet_files(&files)
    }

    fn assemble(origin: String, schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        let mut kept = Vec::with_capacity(batches.len());
        let mut starts = Vec::with_capacity(batches.len());
        let mut rows = 0usize;
        for batch in batches {
            if batch.schema().fields() != schema.fields() {
                return Err(FillError::configuration(format!(
                    "record batch fields differ from the schema of {origin}"
                )));
            }
            if batch.num_rows() == 0 {
                continue;
            }
            starts.push(rows);
            rows += batch.num_rows();
            kept.push(batch);
        }
        Ok(Self {
            origin,
            schema,
            batches: kept,
            starts,
            rows,
        })
    }

    /// Index of a named column.
    ///
    /// # Errors
    /// Returns a `LookupError` if the column does not exist.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .map_err(|_| FillError::missing_field(name))
    }
}

impl RecordSource for BatchSource {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn num_rows(&self) -> usize {
        self.rows
    }

    fn load(&mut self, row: usize, bindings: &mut [Binding]) -> Result<()> {
        if row >= self.rows {
            return Err(FillError::invalid_data(format!(
                "read row {row} of {} ({} rows)",
                self.origin, self.rows
            )));
        }
        let b = self.starts.partition_point(|&s| s <= row) - 1;
        let batch = &self.batches[b];
        let local = row - self.starts[b];
        for binding in bindings.iter_mut() {
            binding
                .slot
                .load(&binding.name, batch.column(binding.column).as_ref(), local)?;
        }
        Ok(())
    }
}

fn read_parquet_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path).with_io_context(|| format!("open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_io_context(|| format!("open ParquetRecordBatchReader for {}", path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(64 * 1024)
        .build()
        .with_io_context(|| format!("build ParquetRecordBatchReader for {}", path.display()))?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_io_context(|| format!("read batches from {}", path.display()))?;
    Ok((schema, batches))
}
