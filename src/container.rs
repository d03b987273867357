//! Entries and channels.
//!
//! An [`Entry`] is an append-only list of [`Channel`]s. Each channel holds one
//! input row's values indexed by field id; the default fields (negative ids)
//! are computed on read.

use crate::registry::{CHANNEL_INDEX_FIELD_ID, ONES_FIELD_ID};

/// One row's worth of field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    index: usize,
    values: Vec<f64>,
}

impl Channel {
    #[must_use]
    pub fn new(index: usize, width: usize) -> Self {
        Self {
            index,
            values: vec![0.0; width],
        }
    }

    /// Build a channel from already-collected values.
    #[must_use]
    pub fn from_values(index: usize, values: Vec<f64>) -> Self {
        Self { index, values }
    }

    /// Position of the channel within its entry.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Store `value` under a stored field id.
    ///
    /// # Panics
    /// Panics if `field_id` is outside the channel width.
    pub fn set(&mut self, field_id: usize, value: f64) {
        self.values[field_id] = value;
    }

    /// Value of a field; default ids are computed, unknown ids read as `0.0`.
    #[must_use]
    pub fn value(&self, field_id: i32) -> f64 {
        match field_id {
            ONES_FIELD_ID => 1.0,
            CHANNEL_INDEX_FIELD_ID => self.index as f64,
            id => usize::try_from(id)
                .ok()
                .and_then(|i| self.values.get(i))
                .copied()
                .unwrap_or(0.0),
        }
    }

    /// Stored values ordered by field id.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Channels grouped into one logical record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    width: usize,
    channels: Vec<Channel>,
}

impl Entry {
    /// An empty entry whose channels store `width` values.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            width,
            channels: Vec::new(),
        }
    }

    /// Append a zeroed channel and return it for filling.
    pub fn add_channel(&mut self) -> &mut Channel {
        let index = self.channels.len();
        self.channels.push(Channel::new(index, self.width));
        let last = self.channels.len() - 1;
        &mut self.channels[last]
    }

    /// Append an already-built channel, renumbering it to its new position.
    pub fn push_channel(&mut self, mut channel: Channel) {
        channel.index = self.channels.len();
        self.channels.push(channel);
    }

    pub fn clear_channels(&mut self) {
        self.channels.clear();
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fields_are_computed() {
        let mut e = Entry::new(2);
        e.add_channel().set(1, 4.5);
        let ch = e.add_channel();
        ch.set(0, -1.0);
        assert_eq!(e.len(), 2);
        let second = &e.channels()[1];
        assert_eq!(second.value(ONES_FIELD_ID), 1.0);
        assert_eq!(second.value(CHANNEL_INDEX_FIELD_ID), 1.0);
        assert_eq!(second.value(0), -1.0);
        assert_eq!(e.channels()[0].value(1), 4.5);
        assert_eq!(e.channels()[0].value(7), 0.0);
    }

    #[test]
    fn clear_keeps_width() {
        let mut e = Entry::new(3);
        e.add_channel();
        e.clear_channels();
        assert!(e.is_empty());
        assert_eq!(e.add_channel().values().len(), 3);
    }
}
