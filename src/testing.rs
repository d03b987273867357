//! Testing utilities.
//!
//! Scratch directories and small record-batch fixtures for exercising fillers
//! and projections without real acquisition data.
//!
//! ```no_run
//! use entrytree::testing::{TempDirPath, sample_hits_batch, write_parquet_batch};
//!
//! # fn main() -> entrytree::Result<()> {
//! let dir = TempDirPath::new().expect("temp dir");
//! let input = dir.file("hits.parquet");
//! write_parquet_batch(&input, &sample_hits_batch())?;
//! # Ok(())
//! # }
//! ```

use crate::error::{IoContext, Result};
use arrow::array::{ArrayRef, BooleanArray, Float32Array, Int8Array, Int16Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary directory that is deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a (not yet created) file inside the directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Build a record batch from named columns.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the columns differ in length.
pub fn record_batch(columns: Vec<(&str, ArrayRef)>) -> Result<RecordBatch> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, a)| a).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(|e| {
        crate::error::FillError::configuration(format!("build fixture batch: {e}"))
    })
}

/// Six detector hits spread over three events.
///
/// | column      | type    | values                          |
/// |-------------|---------|---------------------------------|
/// | `event_id`  | Int32   | 5, 5, 7, 7, 7, 3                |
/// | `energy`    | Float32 | 1.5, 2.5, 0.25, 4.0, -1.0, 3.75 |
/// | `adc`       | Int16   | 100 .. 600                      |
/// | `saturated` | Boolean | F, T, F, F, T, F                |
/// | `plane`     | Int8    | 0, 1, 1, 0, 2, 1                |
#[must_use]
pub fn sample_hits_batch() -> RecordBatch {
    let schema = Arc::new(sample_hits_schema());
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(vec![5, 5, 7, 7, 7, 3])),
        Arc::new(Float32Array::from(vec![1.5, 2.5, 0.25, 4.0, -1.0, 3.75])),
        Arc::new(Int16Array::from(vec![100, 200, 300, 400, 500, 600])),
        Arc::new(BooleanArray::from(vec![false, true, false, false, true, false])),
        Arc::new(Int8Array::from(vec![0, 1, 1, 0, 2, 1])),
    ];
    match RecordBatch::try_new(schema, columns) {
        Ok(batch) => batch,
        Err(e) => unreachable!("fixture columns match their schema: {e}"),
    }
}

/// Schema of [`sample_hits_batch`].
#[must_use]
pub fn sample_hits_schema() -> Schema {
    Schema::new(vec![
        Field::new("event_id", DataType::Int32, false),
        Field::new("energy", DataType::Float32, false),
        Field::new("adc", DataType::Int16, false),
        Field::new("saturated", DataType::Boolean, false),
        Field::new("plane", DataType::Int8, false),
    ])
}

/// [`sample_hits_batch`] plus a `label` string column no slot can hold.
#[must_use]
pub fn sample_hits_with_label() -> RecordBatch {
    let base = sample_hits_batch();
    let mut fields: Vec<Field> = base
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new("label", DataType::Utf8, false));
    let mut columns = base.columns().to_vec();
    columns.push(Arc::new(StringArray::from(vec!["a", "b", "c", "d", "e", "f"])));
    match RecordBatch::try_new(Arc::new(Schema::new(fields)), columns) {
        Ok(batch) => batch,
        Err(e) => unreachable!("fixture columns match their schema: {e}"),
    }
}

/// Write one batch to a Parquet file.
///
/// # Errors
///
/// Returns an `IOError` if the file cannot be created or written.
pub fn write_parquet_batch(path: impl AsRef<Path>, batch: &RecordBatch) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_io_context(|| format!("create dir {}", parent.display()))?;
    }
    let file = File::create(path).with_io_context(|| format!("create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_io_context(|| format!("open ArrowWriter for {}", path.display()))?;
    writer
        .write(batch)
        .with_io_context(|| format!("write batch to {}", path.display()))?;
    writer
        .close()
        .with_io_context(|| format!("close {}", path.display()))?;
    Ok(())
}
