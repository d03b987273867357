//! Filter-name validation.
//!
//! Ignore, preserve, and rename options are written by hand, so a typo would
//! silently keep (or drop) the wrong field. The checks here compare every
//! configured name against the names that actually exist and report the
//! unknown ones as [`FilterWarning`]s. They never fail a run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which option a warning refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOption {
    FieldsToIgnore,
    FieldsToPreserve,
    Rename,
}

impl fmt::Display for FilterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FieldsToIgnore => "fields_to_ignore",
            Self::FieldsToPreserve => "fields_to_preserve",
            Self::Rename => "rename",
        };
        f.write_str(s)
    }
}

/// A configured field name that does not exist in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterWarning {
    pub option: FilterOption,
    pub field: String,
    /// Group or input the name was checked against.
    pub scope: String,
}

impl fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] field '{}' does not exist in {}",
            self.option, self.field, self.scope
        )
    }
}

/// Report every name in `names` for which `exists` is false.
///
/// Each warning is also logged at `warn` level.
pub fn unknown_names<'a, I, F>(
    option: FilterOption,
    names: I,
    scope: &str,
    exists: F,
) -> Vec<FilterWarning>
where
    I: IntoIterator<Item = &'a String>,
    F: Fn(&str) -> bool,
{
    names
        .into_iter()
        .filter(|name| !exists(name))
        .map(|name| {
            let warning = FilterWarning {
                option,
                field: name.clone(),
                scope: scope.to_string(),
            };
            tracing::warn!(option = %option, field = %name, scope, "{warning}");
            warning
        })
        .collect()
}
