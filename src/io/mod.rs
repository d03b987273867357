//! External storage adapters.
//!
//! The filling and projection cores only talk to three traits:
//!
//! - [`RecordSource`] - flat input rows with an Arrow schema
//! - [`ContainerSink`] - committed entries of a single group
//! - [`TableSink`] - flat, typed output rows
//!
//! Parquet implementations live in [`parquet`], in-memory ones in [`memory`].
//! Every sink is also implemented for `&mut S`, so a caller can keep
//! ownership of a sink and inspect it after a session finishes.

pub mod memory;
pub mod parquet;
pub mod source;

#[cfg_attr(docsrs, doc(cfg(feature = "glob")))]
#[cfg(feature = "glob")]
pub mod glob;

pub use source::{BatchSource, Binding, RecordSource};

use crate::container::Entry;
use crate::error::Result;
use crate::projection::{OutputSchema, OutputValue};
use crate::registry::{Configuration, GroupConfig};

/// Destination for committed entries.
pub trait ContainerSink {
    /// Prepare storage for `group`. `registry` is persisted next to the data.
    ///
    /// # Errors
    /// Returns an `IOError` if the storage cannot be created.
    fn open(&mut self, group: &GroupConfig, registry: &Configuration) -> Result<()>;

    /// Append one completed entry.
    ///
    /// # Errors
    /// Returns an `IOError` if the entry cannot be written.
    fn commit(&mut self, entry: &Entry) -> Result<()>;

    /// Flush and close.
    ///
    /// # Errors
    /// Returns an `IOError` if buffered data cannot be written.
    fn finish(&mut self) -> Result<()>;
}

/// Destination for flat output rows.
pub trait TableSink {
    /// Register the output columns. `manifest` is persisted next to the data.
    ///
    /// # Errors
    /// Returns an `IOError` if the storage cannot be created.
    fn open(&mut self, schema: &OutputSchema, manifest: &str) -> Result<()>;

    /// Append one row; values are ordered like the schema columns.
    ///
    /// # Errors
    /// Returns a `TypeError` if a value does not match its column kind, or an
    /// `IOError` if the row cannot be written.
    fn append_row(&mut self, row: &[OutputValue]) -> Result<()>;

    /// Flush and close.
    ///
    /// # Errors
    /// Returns an `IOError` if buffered data cannot be written.
    fn finish(&mut self) -> Result<()>;
}

impl<S: ContainerSink + ?Sized> ContainerSink for &mut S {
    fn open(&mut self, group: &GroupConfig, registry: &Configuration) -> Result<()> {
        (**self).open(group, registry)
    }

    fn commit(&mut self, entry: &Entry) -> Result<()> {
        (**self).commit(entry)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

impl<S: TableSink + ?Sized> TableSink for &mut S {
    fn open(&mut self, schema: &OutputSchema, manifest: &str) -> Result<()> {
        (**self).open(schema, manifest)
    }

    fn append_row(&mut self, row: &[OutputValue]) -> Result<()> {
        (**self).append_row(row)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
