//! Parquet storage for entry containers and flat tables.
//!
//! This module provides:
//! - [`ParquetContainerWriter`] - a [`ContainerSink`] writing one Parquet row
//!   per entry: a `#channels` count column plus one list column per stored
//!   field, holding that field's value for every channel of the entry
//! - [`ContainerReader`] - reads such a file back as [`Entry`] values together
//!   with the registry it was written with
//! - [`ParquetTableWriter`] - a [`TableSink`] writing typed scalar columns
//!
//! Both writers buffer rows into Arrow builders and hand a `RecordBatch` to
//! `parquet::arrow::ArrowWriter` every `batch_rows` rows. The registry (or the
//! projection manifest) is stored as JSON in the Arrow schema metadata, which
//! `ArrowWriter` embeds in the file footer.

use crate::container::{Channel, Entry};
use crate::error::{FillError, IoContext, Result};
use crate::io::{ContainerSink, TableSink};
use crate::projection::{OutputKind, OutputSchema, OutputValue};
use crate::registry::{Configuration, FieldType, GroupConfig};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Float32Builder, Int32Builder, ListBuilder,
    UInt32Builder,
};
use arrow::datatypes::{DataType, Field, Float32Type, Int32Type, Schema, SchemaRef, UInt32Type};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema metadata key holding the registry JSON.
pub const CONFIGURATION_KEY: &str = "entrytree.configuration";
/// Schema metadata key holding the container's group name.
pub const GROUP_KEY: &str = "entrytree.group";
/// Schema metadata key holding a flat table's manifest JSON.
pub const OUTPUT_SCHEMA_KEY: &str = "entrytree.output_schema";
/// Name of the per-entry channel count column.
pub const CHANNELS_COLUMN: &str = "#channels";

/// Rows buffered before a batch is handed to the Parquet writer.
pub const DEFAULT_BATCH_ROWS: usize = 8 * 1024;

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_io_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    File::create(path).with_io_context(|| format!("create {}", path.display()))
}

fn open_writer(path: &Path, schema: SchemaRef) -> Result<ArrowWriter<File>> {
    let file = create_file(path)?;
    let props = WriterProperties::builder().build();
    ArrowWriter::try_new(file, schema, Some(props))
        .with_io_context(|| format!("create ArrowWriter for {}", path.display()))
}

fn item_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Float => DataType::Float32,
        FieldType::Integer => DataType::Int32,
        FieldType::Boolean => DataType::Boolean,
    }
}

/// Per-field list builder; one list per entry, one item per channel.
enum ListColumn {
    Float(ListBuilder<Float32Builder>),
    Integer(ListBuilder<Int32Builder>),
    Boolean(ListBuilder<BooleanBuilder>),
}

impl ListColumn {
    fn new(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Float => Self::Float(ListBuilder::new(Float32Builder::new())),
            FieldType::Integer => Self::Integer(ListBuilder::new(Int32Builder::new())),
            FieldType::Boolean => Self::Boolean(ListBuilder::new(BooleanBuilder::new())),
        }
    }

    fn append(&mut self, entry: &Entry, field_id: i32) {
        let values = entry.channels().iter().map(|c| c.value(field_id));
        match self {
            Self::Float(b) => {
                values.for_each(|v| b.values().append_value(v as f32));
                b.append(true);
            }
            Self::Integer(b) => {
                values.for_each(|v| b.values().append_value(v as i32));
                b.append(true);
            }
            Self::Boolean(b) => {
                values.for_each(|v| b.values().append_value(v != 0.0));
                b.append(true);
            }
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Float(b) => Arc::new(b.finish()),
            Self::Integer(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
        }
    }
}

struct OpenContainer {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
    sizes: UInt32Builder,
    /// `(field id, builder)` for every stored field, in id order.
    columns: Vec<(i32, ListColumn)>,
    pending: usize,
}

/// Writes committed entries of one group to a Parquet file.
pub struct ParquetContainerWriter {
    path: PathBuf,
    batch_rows: usize,
    open: Option<OpenContainer>,
    entries: usize,
}

impl ParquetContainerWriter {
    /// Prepare a writer; the file is created when the sink is opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_rows: DEFAULT_BATCH_ROWS,
            open: None,
            entries: 0,
        }
    }

    /// Entries buffered per record batch (at least one).
    #[must_use]
    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries committed so far.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    fn not_open(&self) -> FillError {
        FillError::configuration(format!(
            "container writer for {} used before open",
            self.path.display()
        ))
    }

    fn flush_batch(path: &Path, open: &mut OpenContainer) -> Result<()> {
        if open.pending == 0 {
            return Ok(());
        }
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(open.columns.len() + 1);
        arrays.push(Arc::new(open.sizes.finish()));
        arrays.extend(open.columns.iter_mut().map(|(_, c)| c.finish()));
        let batch = RecordBatch::try_new(open.schema.clone(), arrays)
            .with_io_context(|| format!("build entry batch for {}", path.display()))?;
        open.writer
            .write(&batch)
            .with_io_context(|| format!("write entry batch to {}", path.display()))?;
        open.pending = 0;
        Ok(())
    }
}

impl ContainerSink for ParquetContainerWriter {
    fn open(&mut self, group: &GroupConfig, registry: &Configuration) -> Result<()> {
        if group.stored_fields().any(|f| f.name == CHANNELS_COLUMN) {
            return Err(FillError::configuration(format!(
                "field name '{CHANNELS_COLUMN}' in group '{}' is reserved for the channel count column",
                group.name()
            )));
        }
        let mut fields = vec![Field::new(CHANNELS_COLUMN, DataType::UInt32, false)];
        let mut columns = Vec::with_capacity(group.width());
        for field in group.stored_fields() {
            let item = Field::new_list_field(item_type(field.field_type), true);
            fields.push(Field::new(&field.name, DataType::List(Arc::new(item)), false));
            columns.push((field.id, ListColumn::new(field.field_type)));
        }
        let metadata = HashMap::from([
            (CONFIGURATION_KEY.to_string(), registry.to_json()?),
            (GROUP_KEY.to_string(), group.name().to_string()),
        ]);
        let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
        let writer = open_writer(&self.path, schema.clone())?;
        self.open = Some(OpenContainer {
            writer,
            schema,
            sizes: UInt32Builder::new(),
            columns,
            pending: 0,
        });
        Ok(())
    }

    fn commit(&mut self, entry: &Entry) -> Result<()> {
        let batch_rows = self.batch_rows;
        let Some(open) = self.open.as_mut() else {
            return Err(self.not_open());
        };
        let size = u32::try_from(entry.len())
            .map_err(|_| FillError::configuration("entry has more than u32::MAX channels"))?;
        open.sizes.append_value(size);
        for (field_id, column) in &mut open.columns {
            column.append(entry, *field_id);
        }
        open.pending += 1;
        self.entries += 1;
        if open.pending >= batch_rows {
            Self::flush_batch(&self.path, open)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut open) = self.open.take() else {
            return Err(self.not_open());
        };
        Self::flush_batch(&self.path, &mut open)?;
        open.writer
            .close()
            .with_io_context(|| format!("close ArrowWriter for {}", self.path.display()))?;
        Ok(())
    }
}

/// Reads a container file written by [`ParquetContainerWriter`].
///
/// Iterating the reader yields the entries in file order.
pub struct ContainerReader {
    path: PathBuf,
    configuration: Configuration,
    group: GroupConfig,
    reader: ParquetRecordBatchReader,
    /// `(column index, field id, field type)` per stored field.
    columns: Vec<(usize, i32, FieldType)>,
    batch: Option<RecordBatch>,
    row: usize,
}

impl ContainerReader {
    /// Open a container file and restore its registry.
    ///
    /// # Errors
    /// - `IOError` if the file cannot be opened or decoded.
    /// - `ConfigurationError` if the container metadata is missing or malformed.
    /// - `LookupError` if the group or one of its field columns is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_io_context(|| format!("open {}", path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_io_context(|| format!("open ParquetRecordBatchReader for {}", path.display()))?;
        let schema = builder.schema().clone();
        let metadata = schema.metadata();
        let meta = |key: &str| {
            metadata.get(key).ok_or_else(|| {
                FillError::configuration(format!(
                    "{} is not an entry container: missing metadata key {key}",
                    path.display()
                ))
            })
        };
        let configuration = Configuration::from_json(meta(CONFIGURATION_KEY)?)?;
        let group = configuration.require_group(meta(GROUP_KEY)?)?.clone();

        let columns = group
            .stored_fields()
            .map(|f| {
                schema
                    .index_of(&f.name)
                    .map(|i| (i, f.id, f.field_type))
                    .map_err(|_| FillError::missing_field(&f.name))
            })
            .collect::<Result<Vec<_>>>()?;

        let reader = builder
            .with_batch_size(64 * 1024)
            .build()
            .with_io_context(|| format!("build ParquetRecordBatchReader for {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            configuration,
            group,
            reader,
            columns,
            batch: None,
            row: 0,
        })
    }

    /// Registry stored with the container.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Group the container's entries belong to.
    #[must_use]
    pub fn group(&self) -> &GroupConfig {
        &self.group
    }

    /// Read every remaining entry.
    ///
    /// # Errors
    /// Returns the first read failure.
    pub fn read_all(self) -> Result<Vec<Entry>> {
        self.collect()
    }

    fn decode(&self, batch: &RecordBatch, row: usize) -> Result<Entry> {
        let bad = || FillError::invalid_data(format!("decode entry {row} of {}", self.path.display()));
        let sizes = batch
            .column(0)
            .as_primitive_opt::<UInt32Type>()
            .ok_or_else(bad)?;
        let n = sizes.value(row) as usize;
        let mut values = vec![vec![0.0; self.group.width()]; n];

        for &(column, field_id, field_type) in &self.columns {
            let list = batch.column(column).as_list_opt::<i32>().ok_or_else(bad)?;
            let items = list.value(row);
            if items.len() != n {
                return Err(bad());
            }
            let slot = usize::try_from(field_id).map_err(|_| bad())?;
            match field_type {
                FieldType::Float => {
                    let a = items.as_primitive_opt::<Float32Type>().ok_or_else(bad)?;
                    for (k, v) in a.values().iter().enumerate() {
                        values[k][slot] = f64::from(*v);
                    }
                }
                FieldType::Integer => {
                    let a = items.as_primitive_opt::<Int32Type>().ok_or_else(bad)?;
                    for (k, v) in a.values().iter().enumerate() {
                        values[k][slot] = f64::from(*v);
                    }
                }
                FieldType::Boolean => {
                    let a = items.as_boolean_opt().ok_or_else(bad)?;
                    for (k, v) in a.iter().enumerate() {
                        values[k][slot] = f64::from(u8::from(v.unwrap_or(false)));
                    }
                }
            }
        }

        let mut entry = Entry::new(self.group.width());
        for (k, v) in values.into_iter().enumerate() {
            entry.push_channel(Channel::from_values(k, v));
        }
        Ok(entry)
    }
}

impl Iterator for ContainerReader {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &self.batch
                && self.row < batch.num_rows()
            {
                let row = self.row;
                self.row += 1;
                return Some(self.decode(batch, row));
            }
            match self.reader.next()? {
                Ok(batch) => {
                    self.batch = Some(batch);
                    self.row = 0;
                }
                Err(e) => {
                    return Some(Err(FillError::io(
                        format!("read entry batch from {}", self.path.display()),
                        e,
                    )));
                }
            }
        }
    }
}

enum ScalarColumn {
    Float(Float32Builder),
    Integer(Int32Builder),
    Boolean(BooleanBuilder),
}

impl ScalarColumn {
    fn new(kind: OutputKind) -> Self {
        match kind {
            OutputKind::Float32 => Self::Float(Float32Builder::new()),
            OutputKind::Int32 => Self::Integer(Int32Builder::new()),
            OutputKind::Boolean => Self::Boolean(BooleanBuilder::new()),
        }
    }

    fn data_type(kind: OutputKind) -> DataType {
        match kind {
            OutputKind::Float32 => DataType::Float32,
            OutputKind::Int32 => DataType::Int32,
            OutputKind::Boolean => DataType::Boolean,
        }
    }

    fn kind(&self) -> OutputKind {
        match self {
            Self::Float(_) => OutputKind::Float32,
            Self::Integer(_) => OutputKind::Int32,
            Self::Boolean(_) => OutputKind::Boolean,
        }
    }

    /// Callers check `value.kind()` against [`ScalarColumn::kind`] first.
    fn append(&mut self, value: OutputValue) {
        match (self, value) {
            (Self::Float(b), OutputValue::Float32(v)) => b.append_value(v),
            (Self::Integer(b), OutputValue::Int32(v)) => b.append_value(v),
            (Self::Boolean(b), OutputValue::Boolean(v)) => b.append_value(v),
            _ => {}
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Float(b) => Arc::new(b.finish()),
            Self::Integer(b) => Arc::new(b.finish()),
            Self::Boolean(b) => Arc::new(b.finish()),
        }
    }
}

struct OpenTable {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
    names: Vec<String>,
    columns: Vec<ScalarColumn>,
    pending: usize,
}

/// Writes flat projected rows to a Parquet file.
pub struct ParquetTableWriter {
    path: PathBuf,
    batch_rows: usize,
    open: Option<OpenTable>,
    rows: usize,
}

impl ParquetTableWriter {
    /// Prepare a writer; the file is created when the sink is opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_rows: DEFAULT_BATCH_ROWS,
            open: None,
            rows: 0,
        }
    }

    /// Rows buffered per record batch (at least one).
    #[must_use]
    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    /// Rows appended so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn not_open(&self) -> FillError {
        FillError::configuration(format!(
            "table writer for {} used before open",
            self.path.display()
        ))
    }

    fn flush_batch(path: &Path, open: &mut OpenTable) -> Result<()> {
        if open.pending == 0 {
            return Ok(());
        }
        let arrays: Vec<ArrayRef> = open.columns.iter_mut().map(ScalarColumn::finish).collect();
        let options = RecordBatchOptions::new().with_row_count(Some(open.pending));
        let batch = RecordBatch::try_new_with_options(open.schema.clone(), arrays, &options)
            .with_io_context(|| format!("build table batch for {}", path.display()))?;
        open.writer
            .write(&batch)
            .with_io_context(|| format!("write table batch to {}", path.display()))?;
        open.pending = 0;
        Ok(())
    }
}

impl TableSink for ParquetTableWriter {
    fn open(&mut self, schema: &OutputSchema, manifest: &str) -> Result<()> {
        let fields: Vec<Field> = schema
            .columns()
            .iter()
            .map(|c| Field::new(&c.name, ScalarColumn::data_type(c.kind), false))
            .collect();
        let metadata = HashMap::from([(OUTPUT_SCHEMA_KEY.to_string(), manifest.to_string())]);
        let arrow_schema = Arc::new(Schema::new_with_metadata(fields, metadata));
        let writer = open_writer(&self.path, arrow_schema.clone())?;
        self.open = Some(OpenTable {
            writer,
            schema: arrow_schema,
            names: schema.names().map(str::to_string).collect(),
            columns: schema.columns().iter().map(|c| ScalarColumn::new(c.kind)).collect(),
            pending: 0,
        });
        Ok(())
    }

    fn append_row(&mut self, row: &[OutputValue]) -> Result<()> {
        let batch_rows = self.batch_rows;
        let Some(open) = self.open.as_mut() else {
            return Err(self.not_open());
        };
        if row.len() != open.columns.len() {
            return Err(FillError::invalid_data(format!(
                "row of {} values for {} columns in {}",
                row.len(),
                open.columns.len(),
                self.path.display()
            )));
        }
        // Check the whole row before touching any builder so columns stay aligned.
        for ((column, name), value) in open.columns.iter().zip(&open.names).zip(row) {
            if column.kind() != value.kind() {
                return Err(FillError::unsupported_type(name.as_str(), format!("{:?}", value.kind())));
            }
        }
        for (column, value) in open.columns.iter_mut().zip(row) {
            column.append(*value);
        }
        open.pending += 1;
        self.rows += 1;
        if open.pending >= batch_rows {
            Self::flush_batch(&self.path, open)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut open) = self.open.take() else {
            return Err(self.not_open());
        };
        Self::flush_batch(&self.path, &mut open)?;
        open.writer
            .close()
            .with_io_context(|| format!("close ArrowWriter for {}", self.path.display()))?;
        Ok(())
    }
}

/// Read the manifest stored in a flat table written by [`ParquetTableWriter`].
///
/// # Errors
/// Returns an `IOError` if the file cannot be read and a `ConfigurationError`
/// if it carries no manifest.
pub fn read_table_manifest(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).with_io_context(|| format!("open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_io_context(|| format!("open ParquetRecordBatchReader for {}", path.display()))?;
    builder
        .schema()
        .metadata()
        .get(OUTPUT_SCHEMA_KEY)
        .cloned()
        .ok_or_else(|| {
            FillError::configuration(format!(
                "{} carries no {OUTPUT_SCHEMA_KEY} metadata",
                path.display()
            ))
        })
}
