//! # entrytree
//!
//! Group flat columnar records into **entries** of **channels**, and flatten
//! them back into plain tables.
//!
//! A flat input has one row per channel: a detector hit, a sample, a
//! sub-record. `entrytree` reads such rows from Arrow record batches or
//! Parquet files, discovers which fields to keep at runtime, and groups
//! consecutive rows into entries. An entry ends when a trigger field changes
//! value or a fixed number of rows has been read. The result is stored one
//! entry per Parquet row, together with the field registry describing it.
//! A projection reads that container back and writes one typed row per
//! channel.
//!
//! ## Key Features
//!
//! - **Runtime schema discovery** - fields are classified by their Arrow type
//!   and registered in a shared [`Configuration`]
//! - **Ignore or preserve filters** - drop fields by name, or keep only a set
//! - **Trigger and row-count boundaries** - group rows by event id, by a fixed
//!   size, or both
//! - **Typed projection** - Float, Integer, and Boolean output columns with
//!   renaming and group prefixes
//! - **JSON job files** - describe a fill or flatten run without code
//!
//! ## Quick Start
//!
//! ```no_run
//! use entrytree::*;
//!
//! # fn main() -> entrytree::Result<()> {
//! let mut registry = Configuration::new();
//!
//! let source = BatchSource::open_parquet("hits.parquet")?;
//! let options = FillerOptions {
//!     group_name: "hits".into(),
//!     trigger_field: Some("event_id".into()),
//!     ..FillerOptions::default()
//! };
//! ContainerFiller::new(source, ParquetContainerWriter::new("entries.parquet"), options)
//!     .fill(&mut registry, None)?;
//!
//! let reader = ContainerReader::open("entries.parquet")?;
//! let projection = FieldProjection::default()
//!     .add_group("hits")
//!     .suppress_default_fields(true);
//! flatten(reader, projection, ParquetTableWriter::new("hits_flat.parquet"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`registry`] - groups, fields, and their ids
//! - [`schema`] - discovery of the input fields
//! - [`boundary`] - entry boundary rules
//! - [`value`] - narrow Arrow scalars widened to `f64`
//! - [`container`] - entries and channels
//! - [`filler`] - the row-to-entry driver
//! - [`projection`] - the entry-to-row driver
//! - [`io`] - record sources and sinks
//! - [`config`] - JSON job files
//! - [`testing`] - fixtures for tests
//!
//! ## Errors
//!
//! Every fallible operation returns [`FillError`], which distinguishes
//! configuration, I/O, lookup, and type errors. Filter names that match no
//! field are not errors: they are reported as [`FilterWarning`]s and logged
//! through `tracing`.

pub mod boundary;
pub mod config;
pub mod container;
pub mod error;
pub mod filler;
pub mod io;
pub mod projection;
pub mod registry;
pub mod schema;
pub mod testing;
pub mod validation;
pub mod value;

pub use boundary::{BoundaryDecision, EntryBoundary, UNSET_TRIGGER};
pub use config::{FillerJob, FlattenJob};
pub use container::{Channel, Entry};
pub use error::{FillError, Result};
pub use filler::{ContainerFiller, FillReport, FillerOptions, FillerSession, FillerState};
pub use io::memory::{MemoryContainerSink, MemoryTable};
pub use io::parquet::{ContainerReader, ParquetContainerWriter, ParquetTableWriter};
pub use io::{BatchSource, Binding, ContainerSink, RecordSource, TableSink};
pub use projection::{
    FieldProjection, OutputColumn, OutputKind, OutputSchema, OutputValue, ProjectionOptions,
    ProjectionReport, ProjectionSession, RangeCut, flatten,
};
pub use registry::{Configuration, FieldEntry, FieldType, GroupConfig};
pub use schema::{FieldDescriptor, FilterPolicy, Schema, UnsupportedField, discover};
pub use validation::{FilterOption, FilterWarning};
pub use value::{StorageKind, ValueSlot};
