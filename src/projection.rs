//! Field projection: flatten grouped entries into a plain table.
//!
//! A [`FieldProjection`] turns one registry group into an [`OutputSchema`]:
//! the group's fields are enumerated as float, integer, then boolean fields,
//! filtered through the ignore or preserve set, renamed, and given output-safe
//! names. A [`ProjectionSession`] then writes one output row per channel of
//! every entry it is fed, coercing each value to its column kind.
//!
//! # Naming
//!
//! Filter and rename options use bare field names. For a field `px` in group
//! `tracks`:
//!
//! - `rename = {"px": "mom.x"}` gives `mom_x`
//! - with `prepend_group_name`, the same field becomes `tracks_mom_x`
//!
//! # Coercion
//!
//! Integer and boolean columns round to the nearest integer with ties away
//! from zero (`2.5 -> 3`, `-2.5 -> -3`) before narrowing; boolean columns then
//! map any non-zero result to `true`. Float columns narrow to `f32` unchanged.
//!
//! # Channel cuts
//!
//! A [`RangeCut`] on a field keeps only channels whose value lies inside an
//! inclusive range. Cuts may name any field of the group, projected or not,
//! including the default fields. A channel must pass every cut to be written.

use crate::container::Entry;
use crate::error::{FillError, Result};
use crate::io::TableSink;
use crate::io::parquet::ContainerReader;
use crate::registry::{Configuration, FieldType, GroupConfig};
use crate::validation::{FilterOption, FilterWarning, unknown_names};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Storage kind of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    Float32,
    Int32,
    Boolean,
}

impl OutputKind {
    #[must_use]
    pub fn for_field(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Float => Self::Float32,
            FieldType::Integer => Self::Int32,
            FieldType::Boolean => Self::Boolean,
        }
    }

    /// Coerce a canonical value into this kind.
    #[must_use]
    pub fn coerce(self, value: f64) -> OutputValue {
        match self {
            Self::Float32 => OutputValue::Float32(value as f32),
            Self::Int32 => OutputValue::Int32(value.round() as i32),
            Self::Boolean => OutputValue::Boolean(value.round() as i32 != 0),
        }
    }
}

/// One coerced output value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OutputValue {
    Float32(f32),
    Int32(i32),
    Boolean(bool),
}

impl OutputValue {
    #[must_use]
    pub fn kind(&self) -> OutputKind {
        match self {
            Self::Float32(_) => OutputKind::Float32,
            Self::Int32(_) => OutputKind::Int32,
            Self::Boolean(_) => OutputKind::Boolean,
        }
    }
}

/// One column of the flat output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub kind: OutputKind,
    /// Bare name of the group field the column reads.
    pub source_field: String,
    pub field_id: i32,
}

/// Ordered output columns, fixed once a projection is initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    columns: Vec<OutputColumn>,
}

impl OutputSchema {
    #[must_use]
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&OutputColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Inclusive range a field value must fall in. An open bound is unchecked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeCut {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeCut {
    #[must_use]
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    #[must_use]
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    #[must_use]
    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Whether `value` passes. NaN fails any bounded cut.
    #[must_use]
    pub fn accepts(&self, value: f64) -> bool {
        self.min.is_none_or(|m| value >= m) && self.max.is_none_or(|m| value <= m)
    }
}

/// Projection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionOptions {
    /// Input groups; exactly one is supported.
    pub groups: Vec<String>,
    pub fields_to_ignore: BTreeSet<String>,
    pub fields_to_preserve: BTreeSet<String>,
    /// Bare input field name to bare output name.
    pub rename: BTreeMap<String, String>,
    /// Drop the group's default fields (`ones`, `channel_index`).
    pub suppress_default_fields: bool,
    /// Keep the `group.` prefix in output names.
    pub prepend_group_name: bool,
    /// Bare field name to the range its value must fall in.
    pub cuts: BTreeMap<String, RangeCut>,
}

/// Counters for a finished projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub entries: usize,
    pub rows: usize,
    /// Channels dropped by a cut.
    pub rejected: usize,
}

#[derive(Serialize)]
struct Manifest<'a> {
    group: &'a str,
    schema: &'a OutputSchema,
    options: &'a ProjectionOptions,
}

/// Builder for a projection over one group.
#[derive(Debug, Clone, Default)]
pub struct FieldProjection {
    options: ProjectionOptions,
}

impl FieldProjection {
    #[must_use]
    pub fn new(options: ProjectionOptions) -> Self {
        Self { options }
    }

    /// Read from `group`.
    #[must_use]
    pub fn add_group(mut self, group: impl Into<String>) -> Self {
        self.options.groups.push(group.into());
        self
    }

    #[must_use]
    pub fn ignore<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.options
            .fields_to_ignore
            .extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn preserve<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.options
            .fields_to_preserve
            .extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.options.rename.insert(from.into(), to.into());
        self
    }

    #[must_use]
    pub fn suppress_default_fields(mut self, on: bool) -> Self {
        self.options.suppress_default_fields = on;
        self
    }

    #[must_use]
    pub fn prepend_group_name(mut self, on: bool) -> Self {
        self.options.prepend_group_name = on;
        self
    }

    /// Keep only channels whose `field` value passes `cut`.
    #[must_use]
    pub fn cut(mut self, field: impl Into<String>, cut: RangeCut) -> Self {
        self.options.cuts.insert(field.into(), cut);
        self
    }

    #[must_use]
    pub fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    /// Resolve the input group and build the output schema.
    ///
    /// Returns the schema together with a warning for every configured
    /// filter or rename name that does not exist in the group.
    ///
    /// # Errors
    /// - `ConfigurationError` if the number of input groups is not one, if
    ///   ignore and preserve sets are both populated (default-field
    ///   suppression counts as ignoring), or if two fields map to the same
    ///   output name.
    /// - `LookupError` if the group is not registered.
    pub fn build_schema(
        &self,
        registry: &Configuration,
    ) -> Result<(OutputSchema, Vec<FilterWarning>)> {
        let group = self.resolve_group(registry)?;
        let name = group.name();
        let qualify = |field: &str| format!("{name}.{field}");

        let mut ignore: BTreeSet<String> =
            self.options.fields_to_ignore.iter().map(|f| qualify(f)).collect();
        if self.options.suppress_default_fields {
            ignore.extend(group.fields().filter(|f| f.is_default()).map(|f| qualify(&f.name)));
        }
        let preserve: BTreeSet<String> =
            self.options.fields_to_preserve.iter().map(|f| qualify(f)).collect();
        if !ignore.is_empty() && !preserve.is_empty() {
            return Err(FillError::configuration(
                "only one of fields_to_ignore and fields_to_preserve can be set",
            ));
        }

        let warnings = self.validate_names(group);

        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        for field_type in FieldType::ORDER {
            for field in group.fields_of(field_type) {
                let qualified = qualify(&field.name);
                if ignore.contains(&qualified) {
                    continue;
                }
                if !preserve.is_empty() && !preserve.contains(&qualified) {
                    continue;
                }
                let base = self.options.rename.get(&field.name).unwrap_or(&field.name);
                let out = (if self.options.prepend_group_name {
                    qualify(base)
                } else {
                    base.clone()
                })
                .replace('.', "_");
                if !seen.insert(out.clone()) {
                    return Err(FillError::configuration(format!(
                        "output name '{out}' is produced by more than one field"
                    )));
                }
                columns.push(OutputColumn {
                    name: out,
                    kind: OutputKind::for_field(field.field_type),
                    source_field: field.name.clone(),
                    field_id: field.id,
                });
            }
        }

        Ok((OutputSchema { columns }, warnings))
    }

    /// Build the schema and open `sink` with it.
    ///
    /// # Errors
    /// See [`FieldProjection::build_schema`]. A cut on a field the group does
    /// not have is a `LookupError`, and a cut whose `min` exceeds its `max` is a
    /// `ConfigurationError`. Sink failures are returned as-is.
    pub fn init<S: TableSink>(
        self,
        registry: &Configuration,
        mut sink: S,
    ) -> Result<ProjectionSession<S>> {
        let (schema, warnings) = self.build_schema(registry)?;
        let group_config = self.resolve_group(registry)?;
        let cuts = self.resolve_cuts(group_config)?;
        let group = group_config.name().to_string();
        let manifest = serde_json::to_string(&Manifest {
            group: &group,
            schema: &schema,
            options: &self.options,
        })
        .map_err(|e| FillError::configuration(format!("serialize output manifest: {e}")))?;
        sink.open(&schema, &manifest)?;
        tracing::info!(
            group = %group,
            columns = schema.len(),
            cuts = cuts.len(),
            warnings = warnings.len(),
            "initialized field projection"
        );
        Ok(ProjectionSession {
            row: Vec::with_capacity(schema.len()),
            schema,
            warnings,
            cuts,
            sink,
            report: ProjectionReport::default(),
        })
    }

    fn resolve_group<'a>(&self, registry: &'a Configuration) -> Result<&'a GroupConfig> {
        match self.options.groups.as_slice() {
            [one] => registry.require_group(one),
            _ => Err(FillError::configuration(format!(
                "only one output group supported, got {}",
                self.options.groups.len()
            ))),
        }
    }

    fn resolve_cuts(&self, group: &GroupConfig) -> Result<Vec<(i32, RangeCut)>> {
        self.options
            .cuts
            .iter()
            .map(|(name, cut)| {
                if let (Some(min), Some(max)) = (cut.min, cut.max)
                    && min > max
                {
                    return Err(FillError::configuration(format!(
                        "cut on '{name}' has min {min} above max {max}"
                    )));
                }
                Ok((group.field_id(name)?, *cut))
            })
            .collect()
    }

    fn validate_names(&self, group: &GroupConfig) -> Vec<FilterWarning> {
        let scope = format!("group '{}'", group.name());
        let exists = |name: &str| group.field(name).is_some();
        let mut warnings =
            unknown_names(FilterOption::FieldsToIgnore, &self.options.fields_to_ignore, &scope, exists);
        warnings.extend(unknown_names(
            FilterOption::FieldsToPreserve,
            &self.options.fields_to_preserve,
            &scope,
            exists,
        ));
        warnings.extend(unknown_names(
            FilterOption::Rename,
            self.options.rename.keys(),
            &scope,
            exists,
        ));
        warnings
    }
}

/// An initialized projection writing into `S`.
pub struct ProjectionSession<S> {
    schema: OutputSchema,
    warnings: Vec<FilterWarning>,
    /// `(field id, cut)` pairs every written channel satisfies.
    cuts: Vec<(i32, RangeCut)>,
    sink: S,
    row: Vec<OutputValue>,
    report: ProjectionReport,
}

impl<S: TableSink> ProjectionSession<S> {
    #[must_use]
    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Filter names that did not match any field.
    #[must_use]
    pub fn warnings(&self) -> &[FilterWarning] {
        &self.warnings
    }

    /// Write one output row per channel of `entry` that passes every cut.
    ///
    /// # Errors
    /// Returns the sink's error if a row cannot be appended.
    pub fn exec(&mut self, entry: &Entry) -> Result<()> {
        for channel in entry.channels() {
            if !self
                .cuts
                .iter()
                .all(|(id, cut)| cut.accepts(channel.value(*id)))
            {
                self.report.rejected += 1;
                continue;
            }
            self.row.clear();
            self.row.extend(
                self.schema
                    .columns
                    .iter()
                    .map(|c| c.kind.coerce(channel.value(c.field_id))),
            );
            self.sink.append_row(&self.row)?;
            self.report.rows += 1;
        }
        self.report.entries += 1;
        Ok(())
    }

    /// Close the sink.
    ///
    /// # Errors
    /// Returns the sink's error if buffered rows cannot be written.
    pub fn finish(mut self) -> Result<ProjectionReport> {
        self.sink.finish()?;
        tracing::info!(
            entries = self.report.entries,
            rows = self.report.rows,
            rejected = self.report.rejected,
            "finished field projection"
        );
        Ok(self.report)
    }
}

/// Project every entry of a container file into `sink`.
///
/// # Errors
/// Propagates initialization, read, and write failures.
pub fn flatten<S: TableSink>(
    reader: ContainerReader,
    projection: FieldProjection,
    sink: S,
) -> Result<ProjectionReport> {
    let mut session = projection.init(reader.configuration(), sink)?;
    for entry in reader {
        session.exec(&entry?)?;
    }
    session.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_rounding_is_half_away_from_zero() {
        assert_eq!(OutputKind::Int32.coerce(2.49), OutputValue::Int32(2));
        assert_eq!(OutputKind::Int32.coerce(2.5), OutputValue::Int32(3));
        assert_eq!(OutputKind::Int32.coerce(-2.5), OutputValue::Int32(-3));
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(OutputKind::Boolean.coerce(0.49), OutputValue::Boolean(false));
        assert_eq!(OutputKind::Boolean.coerce(0.5), OutputValue::Boolean(true));
        assert_eq!(OutputKind::Boolean.coerce(7.0), OutputValue::Boolean(true));
        assert_eq!(OutputKind::Boolean.coerce(f64::NAN), OutputValue::Boolean(false));
    }

    #[test]
    fn range_cut_bounds_are_inclusive() {
        let cut = RangeCut::between(1.0, 2.0);
        assert!(cut.accepts(1.0));
        assert!(cut.accepts(2.0));
        assert!(!cut.accepts(2.01));
        assert!(!cut.accepts(f64::NAN));
        assert!(RangeCut::at_least(0.0).accepts(1e9));
        assert!(!RangeCut::at_most(0.0).accepts(0.5));
        assert!(RangeCut::default().accepts(-3.0));
    }

    #[test]
    fn float_passes_through() {
        assert_eq!(OutputKind::Float32.coerce(2.49), OutputValue::Float32(2.49));
    }
}
