//! Job files.
//!
//! A job bundles an input, an output, and the options for one stage, so a run
//! can be described in a JSON file instead of code:
//!
//! ```json
//! {
//!   "input": "raw/run-042-*.parquet",
//!   "output": "entries/run-042.parquet",
//!   "max_rows": -1,
//!   "group_name": "hits",
//!   "trigger_field": "event_id",
//!   "fields_to_ignore": ["debug_word"]
//! }
//! ```
//!
//! Filler options sit at the top level of a [`FillerJob`] and projection
//! options at the top level of a [`FlattenJob`].

use crate::error::{FillError, IoContext, Result};
use crate::filler::{ContainerFiller, FillReport, FillerOptions};
use crate::io::BatchSource;
use crate::io::parquet::{ContainerReader, ParquetContainerWriter, ParquetTableWriter};
use crate::projection::{FieldProjection, ProjectionOptions, ProjectionReport, flatten};
use crate::registry::Configuration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_io_context(|| format!("read {}", path.display()))?;
    parse_json(&text, &path.display().to_string())
}

fn parse_json<T: DeserializeOwned>(text: &str, origin: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| FillError::configuration(format!("parse job {origin}: {e}")))
}

/// Fill a container file from flat Parquet input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillerJob {
    /// A Parquet file, or a glob pattern when the `glob` feature is enabled.
    pub input: String,
    pub output: PathBuf,
    /// Row limit; a negative value means every row.
    #[serde(default)]
    pub max_rows: Option<i64>,
    #[serde(flatten)]
    pub options: FillerOptions,
}

impl FillerJob {
    /// Load a job from a JSON file.
    ///
    /// # Errors
    /// Returns an `IOError` if the file cannot be read and a
    /// `ConfigurationError` if it does not parse.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// # Errors
    /// Returns a `ConfigurationError` if `json` does not parse.
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, "<string>")
    }

    /// The effective row limit.
    #[must_use]
    pub fn row_limit(&self) -> Option<usize> {
        self.max_rows.and_then(|m| usize::try_from(m).ok())
    }

    /// Open the input, fill the output, and register the group in `registry`.
    ///
    /// # Errors
    /// Any error from opening the input or from the filler.
    pub fn run(&self, registry: &mut Configuration) -> Result<FillReport> {
        let source = self.open_source()?;
        let sink = ParquetContainerWriter::new(&self.output);
        tracing::info!(
            input = %self.input,
            output = %self.output.display(),
            "running filler job"
        );
        ContainerFiller::new(source, sink, self.options.clone()).fill(registry, self.row_limit())
    }

    #[cfg(feature = "glob")]
    fn open_source(&self) -> Result<BatchSource> {
        if crate::io::glob::is_pattern(&self.input) {
            BatchSource::open_parquet_glob(&self.input)
        } else {
            BatchSource::open_parquet(&self.input)
        }
    }

    #[cfg(not(feature = "glob"))]
    fn open_source(&self) -> Result<BatchSource> {
        BatchSource::open_parquet(&self.input)
    }
}

/// Flatten a container file into a plain table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `groups` defaults to the container's own group when left empty.
    #[serde(flatten)]
    pub options: ProjectionOptions,
}

impl FlattenJob {
    /// Load a job from a JSON file.
    ///
    /// # Errors
    /// Returns an `IOError` if the file cannot be read and a
    /// `ConfigurationError` if it does not parse.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// # Errors
    /// Returns a `ConfigurationError` if `json` does not parse.
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, "<string>")
    }

    /// Read the container, project it, and write the table.
    ///
    /// # Errors
    /// Any error from the reader, the projection, or the writer.
    pub fn run(&self) -> Result<ProjectionReport> {
        let reader = ContainerReader::open(&self.input)?;
        let mut options = self.options.clone();
        if options.groups.is_empty() {
            options.groups.push(reader.group().name().to_string());
        }
        tracing::info!(
            input = %self.input.display(),
            output = %self.output.display(),
            groups = ?options.groups,
            "running flatten job"
        );
        let sink = ParquetTableWriter::new(&self.output);
        flatten(reader, FieldProjection::new(options), sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_options_sit_at_top_level() {
        let job = FillerJob::from_json_str(
            r#"{"input": "a.parquet", "output": "b.parquet", "max_rows": -1,
                "group_name": "hits", "trigger_field": "event_id"}"#,
        )
        .unwrap();
        assert_eq!(job.options.group_name, "hits");
        assert_eq!(job.options.trigger(), Some("event_id"));
        assert_eq!(job.row_limit(), None);
    }

    #[test]
    fn missing_options_take_defaults() {
        let job = FillerJob::from_json_str(r#"{"input": "a", "output": "b", "max_rows": 10}"#)
            .unwrap();
        assert_eq!(job.options, FillerOptions::default());
        assert_eq!(job.row_limit(), Some(10));
    }

    #[test]
    fn malformed_job_is_a_configuration_error() {
        let err = FlattenJob::from_json_str(r#"{"input": 3}"#).unwrap_err();
        assert!(matches!(err, FillError::Configuration(_)));
    }
}
