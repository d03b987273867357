//! Container filling: flat rows in, entries of channels out.
//!
//! The lifecycle is a typestate chain:
//!
//! - [`ContainerFiller`] holds the source, sink, and options;
//! - [`ContainerFiller::init`] discovers the schema, binds value slots, and
//!   opens the sink, yielding a [`FillerSession`];
//! - [`FillerSession::exec`] consumes one row at a time;
//! - [`FillerSession::run`] drives every row, flushes the last entry, and
//!   returns a [`FillReport`].
//!
//! ```no_run
//! use entrytree::filler::{ContainerFiller, FillerOptions};
//! use entrytree::io::BatchSource;
//! use entrytree::io::parquet::ParquetContainerWriter;
//! use entrytree::Configuration;
//!
//! let source = BatchSource::open_parquet("hits.parquet")?;
//! let sink = ParquetContainerWriter::new("entries.parquet");
//! let options = FillerOptions {
//!     group_name: "hits".into(),
//!     trigger_field: Some("event_id".into()),
//!     ..FillerOptions::default()
//! };
//! let mut registry = Configuration::new();
//! let report = ContainerFiller::new(source, sink, options).fill(&mut registry, None)?;
//! println!("{} entries", report.entries);
//! # Ok::<(), entrytree::FillError>(())
//! ```

use crate::boundary::{EntryBoundary, UNSET_TRIGGER};
use crate::container::Entry;
use crate::error::{FillError, Result};
use crate::io::{Binding, ContainerSink, RecordSource};
use crate::registry::{Configuration, GroupConfig};
use crate::schema::{FilterPolicy, Schema, discover};
use crate::validation::{FilterOption, unknown_names};
use crate::value::ValueSlot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Group name used when none is configured.
pub const DEFAULT_GROUP_NAME: &str = "records";

/// How a filler groups its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerOptions {
    pub group_name: String,
    pub fields_to_ignore: BTreeSet<String>,
    pub fields_to_preserve: BTreeSet<String>,
    /// Field whose value change opens a new entry. Empty means none.
    pub trigger_field: Option<String>,
    pub rows_per_entry: Option<usize>,
}

impl Default for FillerOptions {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_GROUP_NAME.to_string(),
            fields_to_ignore: BTreeSet::new(),
            fields_to_preserve: BTreeSet::new(),
            trigger_field: None,
            rows_per_entry: None,
        }
    }
}

impl FillerOptions {
    /// The trigger field name, treating an empty string as unset.
    #[must_use]
    pub fn trigger(&self) -> Option<&str> {
        self.trigger_field.as_deref().filter(|t| !t.is_empty())
    }
}

/// Summary of a finished fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub group: String,
    pub rows: usize,
    pub entries: usize,
    pub channels: usize,
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerState {
    /// Initialized, no row consumed yet.
    Ready,
    Running,
}

/// A filler that has not been initialized.
pub struct ContainerFiller<R, S> {
    source: R,
    sink: S,
    options: FillerOptions,
}

impl<R: RecordSource, S: ContainerSink> ContainerFiller<R, S> {
    #[must_use]
    pub fn new(source: R, sink: S, options: FillerOptions) -> Self {
        Self {
            source,
            sink,
            options,
        }
    }

    /// Discover the input schema, register the group, and open the sink.
    ///
    /// # Errors
    /// - `ConfigurationError` for mixed ignore/preserve sets, a zero
    ///   `rows_per_entry`, or a group the registry cannot accept;
    /// - `TypeError` if a retained field has no storage kind;
    /// - `LookupError` if the trigger field was not retained;
    /// - whatever the sink returns from `open`.
    pub fn init(self, registry: &mut Configuration) -> Result<FillerSession<R, S>> {
        let Self {
            source,
            mut sink,
            options,
        } = self;

        let policy = FilterPolicy::new(
            options.fields_to_ignore.iter().cloned(),
            options.fields_to_preserve.iter().cloned(),
        )?;
        if options.rows_per_entry == Some(0) {
            return Err(FillError::configuration("rows_per_entry must be positive"));
        }

        let input = source.schema();
        let scope = format!("input of group '{}'", options.group_name);
        let exists = |name: &str| input.index_of(name).is_ok();
        unknown_names(
            FilterOption::FieldsToIgnore,
            &options.fields_to_ignore,
            &scope,
            exists,
        );
        unknown_names(
            FilterOption::FieldsToPreserve,
            &options.fields_to_preserve,
            &scope,
            exists,
        );

        // Registration is staged so a failed init leaves the registry untouched.
        let mut staged = registry.clone();
        let schema = discover(&input, &options.group_name, &policy, &mut staged)?;

        // Unsupported retained fields cannot be bound; surface them first.
        for field in &schema.unsupported {
            let data_type = input.field(field.column).data_type();
            ValueSlot::for_data_type(&field.name, data_type)?;
        }

        let bindings: Vec<Binding> = schema
            .fields
            .iter()
            .map(|d| Binding {
                name: d.name.clone(),
                column: d.column,
                slot: ValueSlot::bind(d.kind),
            })
            .collect();
        let targets = schema
            .fields
            .iter()
            .map(|d| {
                usize::try_from(d.field_id).map_err(|_| {
                    FillError::configuration(format!(
                        "field '{}' has non-storable id {}",
                        d.name, d.field_id
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let trigger = options
            .trigger()
            .map(|name| schema.position(name))
            .transpose()?;
        let boundary = EntryBoundary::new(trigger, options.rows_per_entry);

        let group = staged.require_group(&schema.group)?.clone();
        sink.open(&group, &staged)?;
        *registry = staged;

        tracing::info!(
            group = %group.name(),
            fields = bindings.len(),
            trigger = ?options.trigger(),
            rows_per_entry = ?options.rows_per_entry,
            rows = source.num_rows(),
            "container filler initialized"
        );

        let entry = Entry::new(group.width());
        let report = FillReport {
            group: group.name().to_string(),
            ..FillReport::default()
        };
        Ok(FillerSession {
            source,
            sink,
            schema,
            group,
            bindings,
            targets,
            boundary,
            entry,
            state: FillerState::Ready,
            report,
        })
    }

    /// Run the whole lifecycle over at most `max_rows` rows.
    ///
    /// # Errors
    /// See [`ContainerFiller::init`] and [`FillerSession::run`].
    pub fn fill(self, registry: &mut Configuration, max_rows: Option<usize>) -> Result<FillReport> {
        self.init(registry)?.run(max_rows)
    }
}

/// An initialized filler.
pub struct FillerSession<R, S> {
    source: R,
    sink: S,
    schema: Schema,
    group: GroupConfig,
    bindings: Vec<Binding>,
    /// Stored field id of each binding.
    targets: Vec<usize>,
    boundary: EntryBoundary,
    entry: Entry,
    state: FillerState,
    report: FillReport,
}

impl<R: RecordSource, S: ContainerSink> FillerSession<R, S> {
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn group(&self) -> &GroupConfig {
        &self.group
    }

    #[must_use]
    pub fn state(&self) -> FillerState {
        self.state
    }

    /// The entry currently being filled.
    #[must_use]
    pub fn current_entry(&self) -> &Entry {
        &self.entry
    }

    /// Consume row `row` and return the trigger value to pass for the next row.
    ///
    /// # Errors
    /// Returns the source's load error, or the sink's error when a new entry
    /// forces the previous one to be committed.
    pub fn exec(&mut self, row: usize, previous: i64) -> Result<i64> {
        self.state = FillerState::Running;
        self.source.load(row, &mut self.bindings)?;

        let current = self
            .boundary
            .trigger
            .map(|i| self.bindings[i].slot.get() as i64);
        let decision = self.boundary.evaluate(row, previous, current);

        if decision.new_entry {
            if row != 0 {
                self.commit()?;
            }
            self.entry.clear_channels();
        }

        let channel = self.entry.add_channel();
        for (binding, &id) in self.bindings.iter().zip(&self.targets) {
            channel.set(id, binding.slot.get());
        }
        self.report.rows += 1;
        Ok(decision.trigger_value)
    }

    /// Fill every row up to `max_rows`, flush the open entry, and finish.
    ///
    /// The last entry is committed exactly once even when it holds no
    /// channels, so an empty input yields one empty entry.
    ///
    /// # Errors
    /// Returns the first error from [`FillerSession::exec`] or the sink.
    pub fn run(mut self, max_rows: Option<usize>) -> Result<FillReport> {
        let total = self.source.num_rows();
        let limit = max_rows.map_or(total, |m| m.min(total));
        let mut previous = UNSET_TRIGGER;
        for row in 0..limit {
            previous = self.exec(row, previous)?;
        }
        self.commit()?;
        self.finish()
    }

    /// Close the sink and release the source.
    ///
    /// # Errors
    /// Returns the sink's error from `finish`.
    pub fn finish(mut self) -> Result<FillReport> {
        self.sink.finish()?;
        let report = self.report;
        tracing::info!(
            group = %report.group,
            rows = report.rows,
            entries = report.entries,
            channels = report.channels,
            "container filler finished"
        );
        Ok(report)
    }

    fn commit(&mut self) -> Result<()> {
        self.sink.commit(&self.entry)?;
        self.report.entries += 1;
        self.report.channels += self.entry.len();
        tracing::debug!(
            group = %self.group.name(),
            entry = self.report.entries - 1,
            channels = self.entry.len(),
            "committed entry"
        );
        Ok(())
    }
}
