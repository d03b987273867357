//! File globbing for multi-file inputs.
//!
//! A filler can read a set of Parquet files as one continuous row stream, in
//! the way a run over several acquisition files is usually set up:
//!
//! ```no_run
//! use entrytree::io::glob::expand_glob;
//!
//! let files = expand_glob("data/run-042/part-*.parquet")?;
//! # Ok::<(), entrytree::FillError>(())
//! ```

use crate::error::{FillError, IoContext, Result};
use glob::glob;
use std::path::PathBuf;

/// Whether `input` contains glob metacharacters.
#[must_use]
pub fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Directories are skipped. Zero matches is not an error here.
///
/// # Errors
///
/// Returns an `IOError` if the pattern is invalid or a matched path cannot be
/// read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_io_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_io_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }

    // Sort for deterministic row order across files
    result.sort();

    Ok(result)
}

/// Expand a glob pattern, returning an error if no files are found.
///
/// # Errors
///
/// Returns an `IOError` if the pattern is invalid, a matched path cannot be
/// read, or nothing matches.
pub fn expand_glob_required(pattern: &str) -> Result<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        return Err(FillError::io(
            format!("no files found matching pattern: {pattern}"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }
    Ok(files)
}
