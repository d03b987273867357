//! Field registry shared by fillers and projections.
//!
//! A [`Configuration`] holds one [`GroupConfig`] per output group. Field ids are
//! handed out by the group a field is registered in, and group ids by the
//! configuration, so several discoverers writing into the same configuration
//! never produce clashing `(group, field)` ids.
//!
//! # Write-once discipline
//!
//! Registration happens during setup (`ContainerFiller::init` takes
//! `&mut Configuration`). Once every filler has been initialized the
//! configuration is only read. Call [`Configuration::freeze`] to make any
//! later registration attempt fail instead of silently changing ids.

use crate::error::{FillError, Result};
use serde::{Deserialize, Serialize};

/// Id of the default `ones` field, always `1.0`.
pub const ONES_FIELD_ID: i32 = -1;
/// Id of the default `channel_index` field, the channel's position in its entry.
pub const CHANNEL_INDEX_FIELD_ID: i32 = -2;

/// Name of the default `ones` field.
pub const ONES_FIELD: &str = "ones";
/// Name of the default `channel_index` field.
pub const CHANNEL_INDEX_FIELD: &str = "channel_index";

/// Kind of value a registered field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Float,
    Integer,
    Boolean,
}

impl FieldType {
    /// Fixed enumeration order used when a group is flattened.
    pub const ORDER: [FieldType; 3] = [FieldType::Float, FieldType::Integer, FieldType::Boolean];
}

/// One registered field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub field_type: FieldType,
    /// Non-negative for stored fields, negative for default fields.
    pub id: i32,
}

impl FieldEntry {
    /// Default fields are computed per channel rather than stored.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.id < 0
    }
}

/// Fields registered under one group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    name: String,
    id: u32,
    fields: Vec<FieldEntry>,
    stored: usize,
}

impl GroupConfig {
    /// Create a group carrying only the default fields.
    ///
    /// The group id is assigned when the group is added to a [`Configuration`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: 0,
            fields: vec![
                FieldEntry {
                    name: ONES_FIELD.to_string(),
                    field_type: FieldType::Float,
                    id: ONES_FIELD_ID,
                },
                FieldEntry {
                    name: CHANNEL_INDEX_FIELD.to_string(),
                    field_type: FieldType::Integer,
                    id: CHANNEL_INDEX_FIELD_ID,
                },
            ],
            stored: 0,
        }
    }

    /// Register a stored field and return its id.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if a field with this name already exists.
    pub fn add_field(&mut self, name: impl Into<String>, field_type: FieldType) -> Result<i32> {
        let name = name.into();
        if self.field(&name).is_some() {
            return Err(FillError::configuration(format!(
                "field '{name}' is already registered in group '{}'",
                self.name
            )));
        }
        let id = i32::try_from(self.stored)
            .map_err(|_| FillError::configuration(format!("too many fields in group '{}'", self.name)))?;
        self.fields.push(FieldEntry {
            name,
            field_type,
            id,
        });
        self.stored += 1;
        Ok(id)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Id of a named field.
    ///
    /// # Errors
    /// Returns a `LookupError` naming the field if it is not registered.
    pub fn field_id(&self, name: &str) -> Result<i32> {
        self.field(name)
            .map(|f| f.id)
            .ok_or_else(|| FillError::missing_field(name))
    }

    /// All fields in registration order, defaults first.
    pub fn fields(&self) -> impl Iterator<Item = &FieldEntry> {
        self.fields.iter()
    }

    /// Fields of one kind in registration order.
    pub fn fields_of(&self, field_type: FieldType) -> impl Iterator<Item = &FieldEntry> {
        self.fields.iter().filter(move |f| f.field_type == field_type)
    }

    /// Stored (non-default) fields ordered by id.
    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldEntry> {
        self.fields.iter().filter(|f| !f.is_default())
    }

    /// Number of stored values per channel.
    #[must_use]
    pub fn width(&self) -> usize {
        self.stored
    }
}

/// Registry of all groups known to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    groups: Vec<GroupConfig>,
    #[serde(skip)]
    frozen: bool,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group and return the id assigned to it.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if the configuration is frozen or a group
    /// with the same name already exists.
    pub fn add_group(&mut self, mut group: GroupConfig) -> Result<u32> {
        if self.frozen {
            return Err(FillError::configuration(format!(
                "cannot register group '{}': configuration is frozen",
                group.name
            )));
        }
        if self.group(&group.name).is_some() {
            return Err(FillError::configuration(format!(
                "group '{}' is already registered",
                group.name
            )));
        }
        let id = u32::try_from(self.groups.len())
            .map_err(|_| FillError::configuration("too many groups"))?;
        group.id = id;
        self.groups.push(group);
        Ok(id)
    }

    /// Look up a group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Look up a group by name, failing with a `LookupError`.
    ///
    /// # Errors
    /// Returns a `LookupError` if no group has this name.
    pub fn require_group(&self, name: &str) -> Result<&GroupConfig> {
        self.group(name).ok_or_else(|| FillError::missing_group(name))
    }

    #[must_use]
    pub fn group_by_id(&self, id: u32) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupConfig> {
        self.groups.iter()
    }

    /// Seal the configuration against further registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Serialize to JSON for storage next to output data.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| FillError::configuration(format!("serialize configuration: {e}")))
    }

    /// Restore a configuration written by [`Configuration::to_json`].
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FillError::configuration(format!("parse configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_has_defaults_only() {
        let g = GroupConfig::new("hits");
        assert_eq!(g.width(), 0);
        assert_eq!(g.field_id(ONES_FIELD).unwrap(), ONES_FIELD_ID);
        assert_eq!(g.field_id(CHANNEL_INDEX_FIELD).unwrap(), CHANNEL_INDEX_FIELD_ID);
    }

    #[test]
    fn field_ids_follow_registration_order() {
        let mut g = GroupConfig::new("hits");
        assert_eq!(g.add_field("x", FieldType::Float).unwrap(), 0);
        assert_eq!(g.add_field("n", FieldType::Integer).unwrap(), 1);
        assert_eq!(g.add_field("y", FieldType::Float).unwrap(), 2);
        let floats: Vec<_> = g.fields_of(FieldType::Float).map(|f| f.name.as_str()).collect();
        assert_eq!(floats, vec!["ones", "x", "y"]);
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let mut g = GroupConfig::new("hits");
        g.add_field("x", FieldType::Float).unwrap();
        let err = g.add_field("x", FieldType::Integer).unwrap_err();
        assert!(matches!(err, FillError::Configuration(_)));
    }

    #[test]
    fn group_ids_are_unique_and_frozen_rejects() {
        let mut c = Configuration::new();
        assert_eq!(c.add_group(GroupConfig::new("a")).unwrap(), 0);
        assert_eq!(c.add_group(GroupConfig::new("b")).unwrap(), 1);
        assert!(c.add_group(GroupConfig::new("a")).is_err());
        c.freeze();
        assert!(c.add_group(GroupConfig::new("c")).is_err());
        assert_eq!(c.group_by_id(1).unwrap().name(), "b");
    }

    #[test]
    fn json_roundtrip() {
        let mut c = Configuration::new();
        let mut g = GroupConfig::new("a");
        g.add_field("x", FieldType::Float).unwrap();
        c.add_group(g).unwrap();
        let back = Configuration::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(back, c);
    }
}
