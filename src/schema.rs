//! Runtime schema discovery over an Arrow input schema.
//!
//! [`discover`] walks the input fields in order, drops the ones excluded by the
//! [`FilterPolicy`], classifies the rest by [`StorageKind`], and registers them
//! in a new [`GroupConfig`] that is added to the shared [`Configuration`].

use crate::error::{FillError, Result};
use crate::registry::{Configuration, GroupConfig};
use crate::value::StorageKind;
use arrow::datatypes::Schema as ArrowSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which input fields to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterPolicy {
    #[default]
    KeepAll,
    Ignore(BTreeSet<String>),
    Preserve(BTreeSet<String>),
}

impl FilterPolicy {
    /// Build a policy from the two configured sets.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if both sets are non-empty.
    pub fn new<I, P>(ignore: I, preserve: P) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let ignore: BTreeSet<String> = ignore.into_iter().map(Into::into).collect();
        let preserve: BTreeSet<String> = preserve.into_iter().map(Into::into).collect();
        match (ignore.is_empty(), preserve.is_empty()) {
            (false, false) => Err(FillError::configuration(
                "only one of fields_to_ignore and fields_to_preserve can be set",
            )),
            (false, true) => Ok(Self::Ignore(ignore)),
            (true, false) => Ok(Self::Preserve(preserve)),
            (true, true) => Ok(Self::KeepAll),
        }
    }

    /// Whether a field with this name is retained.
    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        match self {
            Self::KeepAll => true,
            Self::Ignore(set) => !set.contains(name),
            Self::Preserve(set) => set.contains(name),
        }
    }
}

/// A retained input field with a supported storage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: StorageKind,
    pub field_id: i32,
    /// Position of the field in the input schema.
    pub column: usize,
}

/// A retained input field whose native type has no storage kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedField {
    pub name: String,
    pub type_name: String,
    pub column: usize,
}

/// Result of one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub group: String,
    pub group_id: u32,
    pub fields: Vec<FieldDescriptor>,
    pub unsupported: Vec<UnsupportedField>,
}

impl Schema {
    /// Position of a descriptor by field name.
    ///
    /// # Errors
    /// Returns a `LookupError` naming the field if it was not retained.
    pub fn position(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| FillError::missing_field(name))
    }
}

/// Discover the input fields and register them under `group_name`.
///
/// # Errors
/// Returns a `ConfigurationError` if a field name repeats, the group name is
/// already registered, or `registry` is frozen.
pub fn discover(
    input: &ArrowSchema,
    group_name: &str,
    policy: &FilterPolicy,
    registry: &mut Configuration,
) -> Result<Schema> {
    let mut group = GroupConfig::new(group_name);
    let mut fields = Vec::new();
    let mut unsupported = Vec::new();

    for (column, field) in input.fields().iter().enumerate() {
        let name = field.name();
        if !policy.admits(name) {
            continue;
        }
        match StorageKind::classify(field.data_type()) {
            Some(kind) => {
                let field_id = group.add_field(name.clone(), kind.field_type())?;
                fields.push(FieldDescriptor {
                    name: name.clone(),
                    kind,
                    field_id,
                    column,
                });
            }
            None => {
                tracing::debug!(
                    field = %name,
                    data_type = %field.data_type(),
                    "skipping field with unsupported type"
                );
                unsupported.push(UnsupportedField {
                    name: name.clone(),
                    type_name: field.data_type().to_string(),
                    column,
                });
            }
        }
    }

    let group_id = registry.add_group(group)?;
    tracing::info!(
        group = group_name,
        retained = fields.len(),
        unsupported = unsupported.len(),
        "discovered input schema"
    );

    Ok(Schema {
        group: group_name.to_string(),
        group_id,
        fields,
        unsupported,
    })
}
