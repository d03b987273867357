//! Entry boundary detection.
//!
//! [`EntryBoundary::evaluate`] decides for every input row whether it opens a
//! new entry. The detector keeps no state of its own: the caller threads the
//! previous trigger value from one row to the next.

/// Trigger value a run starts from, before any row has been read.
pub const UNSET_TRIGGER: i64 = -799;

/// Outcome of evaluating one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryDecision {
    pub new_entry: bool,
    /// Value to pass as `previous` for the next row.
    pub trigger_value: i64,
}

/// Boundary rule configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryBoundary {
    /// Index of the trigger field's value slot, if a trigger is configured.
    pub trigger: Option<usize>,
    /// Start a new entry every `n` rows.
    pub rows_per_entry: Option<usize>,
}

impl EntryBoundary {
    #[must_use]
    pub fn new(trigger: Option<usize>, rows_per_entry: Option<usize>) -> Self {
        Self {
            trigger,
            rows_per_entry,
        }
    }

    /// Evaluate row `row`.
    ///
    /// `current` is the trigger field's value on this row; it is only
    /// consulted when a trigger is configured. Rules, first match wins:
    ///
    /// 1. row 0 always opens an entry;
    /// 2. a changed trigger value opens an entry;
    /// 3. `row % rows_per_entry == 0` opens an entry.
    ///
    /// With neither a trigger nor a row threshold only row 0 opens an entry,
    /// so the whole stream becomes one entry. A `rows_per_entry` of zero
    /// never fires.
    #[must_use]
    pub fn evaluate(&self, row: usize, previous: i64, current: Option<i64>) -> BoundaryDecision {
        let trigger_value = match (self.trigger, current) {
            (Some(_), Some(value)) => value,
            _ => previous,
        };
        let new_entry = row == 0
            || (self.trigger.is_some() && trigger_value != previous)
            || self.rows_per_entry.is_some_and(|n| n > 0 && row % n == 0);
        BoundaryDecision {
            new_entry,
            trigger_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundaries(detector: EntryBoundary, triggers: &[i64]) -> Vec<usize> {
        let mut previous = UNSET_TRIGGER;
        let mut out = Vec::new();
        for (row, &t) in triggers.iter().enumerate() {
            let d = detector.evaluate(row, previous, Some(t));
            if d.new_entry {
                out.push(row);
            }
            previous = d.trigger_value;
        }
        out
    }

    #[test]
    fn trigger_changes_open_entries() {
        let d = EntryBoundary::new(Some(0), None);
        assert_eq!(boundaries(d, &[5, 5, 7, 7, 7, 3]), vec![0, 2, 5]);
    }

    #[test]
    fn row_threshold_without_trigger() {
        let d = EntryBoundary::new(None, Some(3));
        assert_eq!(boundaries(d, &[0; 11]), vec![0, 3, 6, 9]);
    }

    #[test]
    fn trigger_and_threshold_combine() {
        let d = EntryBoundary::new(Some(0), Some(2));
        assert_eq!(boundaries(d, &[1, 1, 1, 2, 2]), vec![0, 2, 3, 4]);
    }

    #[test]
    fn no_rule_means_one_entry() {
        let d = EntryBoundary::default();
        assert_eq!(boundaries(d, &[4, 9, 4, 1]), vec![0]);
    }

    #[test]
    fn previous_is_carried_without_trigger() {
        let d = EntryBoundary::new(None, Some(10));
        let decision = d.evaluate(3, 42, Some(7));
        assert!(!decision.new_entry);
        assert_eq!(decision.trigger_value, 42);
    }
}
