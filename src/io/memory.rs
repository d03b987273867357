//! In-memory sinks.
//!
//! Useful for tests and for hosts that want to hand entries straight to a
//! projection without a round trip through a file.

use crate::container::Entry;
use crate::error::{FillError, Result};
use crate::io::{ContainerSink, TableSink};
use crate::projection::{OutputSchema, OutputValue};
use crate::registry::{Configuration, GroupConfig};

/// Keeps committed entries in a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainerSink {
    pub group: Option<GroupConfig>,
    pub configuration: Option<Configuration>,
    pub entries: Vec<Entry>,
    pub finished: bool,
}

impl MemoryContainerSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total channels across all committed entries.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.entries.iter().map(Entry::len).sum()
    }

    /// Channel count of every committed entry, in order.
    #[must_use]
    pub fn entry_sizes(&self) -> Vec<usize> {
        self.entries.iter().map(Entry::len).collect()
    }
}

impl ContainerSink for MemoryContainerSink {
    fn open(&mut self, group: &GroupConfig, registry: &Configuration) -> Result<()> {
        self.group = Some(group.clone());
        self.configuration = Some(registry.clone());
        Ok(())
    }

    fn commit(&mut self, entry: &Entry) -> Result<()> {
        if self.group.is_none() {
            return Err(FillError::configuration("memory sink used before open"));
        }
        self.entries.push(entry.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Keeps projected rows in a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub schema: Option<OutputSchema>,
    pub manifest: Option<String>,
    pub rows: Vec<Vec<OutputValue>>,
    pub finished: bool,
}

impl MemoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All values of one column, in row order.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<OutputValue>> {
        let schema = self.schema.as_ref()?;
        let idx = schema.names().position(|n| n == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }
}

impl TableSink for MemoryTable {
    fn open(&mut self, schema: &OutputSchema, manifest: &str) -> Result<()> {
        self.schema = Some(schema.clone());
        self.manifest = Some(manifest.to_string());
        Ok(())
    }

    fn append_row(&mut self, row: &[OutputValue]) -> Result<()> {
        let Some(schema) = self.schema.as_ref() else {
            return Err(FillError::configuration("memory table used before open"));
        };
        for (column, value) in schema.columns().iter().zip(row) {
            if column.kind != value.kind() {
                return Err(FillError::unsupported_type(
                    column.name.as_str(),
                    format!("{:?}", value.kind()),
                ));
            }
        }
        self.rows.push(row.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
