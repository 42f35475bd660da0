//! Owned, mutable copy of the server dataset used during one merge

use std::collections::HashMap;

use super::error::Result;
use super::types::{Dataset, FieldNames, Record, UniqueKey};

/// Server records addressed by slot
///
/// Slots are stable for the whole merge: physical deletion empties a slot
/// instead of shifting the records behind it, and created records are
/// appended after the original dataset.
#[derive(Debug, Default)]
pub(crate) struct WorkingSet {
    slots: Vec<Option<Record>>,
    positions: HashMap<UniqueKey, usize>,
}

impl WorkingSet {
    /// Take ownership of a server dataset
    ///
    /// When the dataset repeats a unique key, lookups resolve to the first
    /// occurrence.
    pub fn new(records: Dataset, names: &FieldNames) -> Result<Self> {
        let mut positions = HashMap::with_capacity(records.len());
        for (slot, record) in records.iter().enumerate() {
            positions.entry(UniqueKey::of(record, names)?).or_insert(slot);
        }

        Ok(Self {
            slots: records.into_iter().map(Some).collect(),
            positions,
        })
    }

    /// Slot of the record holding `key`, if any
    pub fn position(&self, key: &UniqueKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Record> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Append a newly created record and return its slot
    pub fn append(&mut self, key: UniqueKey, record: Record) -> usize {
        let slot = self.slots.len();
        self.slots.push(Some(record));
        self.positions.entry(key).or_insert(slot);
        slot
    }

    /// Physically remove the record in `slot`
    pub fn remove(&mut self, slot: usize, key: &UniqueKey) -> Option<Record> {
        let removed = self.slots.get_mut(slot).and_then(Option::take);
        if self.positions.get(key) == Some(&slot) {
            self.positions.remove(key);
        }
        removed
    }

    /// Remaining records with their slots, in dataset order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, record)| record.as_ref().map(|r| (slot, r)))
    }

    /// Remaining records, original ones first, then appended ones
    pub fn into_records(self) -> Dataset {
        self.slots.into_iter().flatten().collect()
    }
}
