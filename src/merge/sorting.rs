//! Sort normalization
//!
//! Keeps the sorting key of a client dataset dense and zero-based, and
//! mirrors every correction onto the paired server record.

use std::collections::HashMap;

use serde_json::Value;

use super::error::{MergeError, Result};
use super::types::{kind_of, Dataset, FieldNames, UniqueKey};
use super::working_set::WorkingSet;

/// Sort `records` by the sorting key and renumber them 0..n
///
/// Returns how many records were renumbered. Datasets whose records carry no
/// sorting value are left alone; a dataset where only some records carry one
/// is rejected.
pub(crate) fn normalize(
    records: &mut Dataset,
    claimed: &HashMap<UniqueKey, Option<usize>>,
    working: &mut WorkingSet,
    names: &FieldNames,
) -> Result<usize> {
    let Some(sorting_key) = names.sorting_key.as_deref() else {
        return Ok(0);
    };

    let mut values = Vec::with_capacity(records.len());
    for record in records.iter() {
        match record.get(sorting_key) {
            None | Some(Value::Null) => {}
            Some(value) => values.push(sort_value(value, sorting_key)?),
        }
    }

    if values.is_empty() {
        return Ok(0);
    }
    if values.len() != records.len() {
        return Err(MergeError::schema(
            sorting_key,
            format!(
                "sorting key present on {} of {} records",
                values.len(),
                records.len()
            ),
        ));
    }

    let mut keyed: Vec<(f64, _)> = values.into_iter().zip(records.drain(..)).collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut renumbered = 0;
    for (position, (value, mut record)) in keyed.into_iter().enumerate() {
        let integral = record.get(sorting_key).is_some_and(Value::is_u64);
        if value != position as f64 || !integral {
            record.insert(sorting_key.to_string(), Value::from(position));

            let key = UniqueKey::of(&record, names)?;
            if let Some(server) = claimed
                .get(&key)
                .copied()
                .flatten()
                .and_then(|slot| working.get_mut(slot))
            {
                server.insert(sorting_key.to_string(), Value::from(position));
            }
            renumbered += 1;
        }
        records.push(record);
    }

    Ok(renumbered)
}

fn sort_value(value: &Value, sorting_key: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        MergeError::schema(
            sorting_key,
            format!("sorting value must be a number, got {}", kind_of(value)),
        )
    })
}
