//! Attribute differ
//!
//! Reconciles the fields of one matched local/server pair. Scalars are
//! settled by the direction; nested records and record sequences recurse
//! into the reconciler itself.

use serde_json::Value;

use super::error::{MergeError, Result};
use super::reconciler::{Reconciler, Scope};
use super::types::{records_to_value, Dataset, Direction, FieldValue, Record, UniqueKey};

impl Reconciler<'_> {
    /// Reconcile every non-key, non-flag field of `local` against `server`
    ///
    /// `server` is `None` only while a record is being created; nested
    /// structures are then adopted as creations.
    pub(super) fn diff_attributes(
        &mut self,
        local: &mut Record,
        mut server: Option<&mut Record>,
        direction: Direction,
    ) -> Result<()> {
        let fields: Vec<String> = local
            .keys()
            .filter(|field| !self.names.is_skipped(field))
            .cloned()
            .collect();

        for field in &fields {
            self.diff_field(field, local, server.as_deref_mut(), direction)?;
        }

        if let (Direction::PullToLocal, Some(server)) = (direction, server) {
            for (field, value) in server.iter() {
                if !local.contains_key(field) && !self.names.is_flag(field) {
                    local.insert(field.clone(), value.clone());
                }
            }
        }

        Ok(())
    }

    fn diff_field(
        &mut self,
        field: &str,
        local: &mut Record,
        server: Option<&mut Record>,
        direction: Direction,
    ) -> Result<()> {
        let local_value = local.get_mut(field).map(Value::take).unwrap_or(Value::Null);
        let local_value = FieldValue::classify(local_value, field, self.names)?;

        let Some(server) = server else {
            let adopted = self.adopt(local_value)?;
            local.insert(field.to_string(), adopted);
            return Ok(());
        };

        let taken = server.get_mut(field).map(Value::take);
        let previous = match &taken {
            None => None,
            Some(Value::Array(items)) if items.is_empty() => Some(Value::Array(Vec::new())),
            Some(_) => Some(Value::Null),
        };
        let server_value = match taken {
            None | Some(Value::Null) => None,
            Some(value) => Some(FieldValue::classify(value, field, self.names)?),
        };
        let side = ServerSide {
            field,
            record: server,
            previous,
        };

        match (local_value, server_value) {
            (FieldValue::Records(l), Some(FieldValue::Records(s))) => {
                self.merge_sequence(local, side, l, Some(s), direction)
            }
            (FieldValue::Records(l), None) => self.merge_sequence(local, side, l, None, direction),
            (FieldValue::Record(l), Some(FieldValue::Record(s))) => {
                self.merge_single(local, side, l, Some(s), direction)
            }
            (FieldValue::Record(l), None) => self.merge_single(local, side, l, None, direction),

            // an empty array is compatible with every shape, like null
            (FieldValue::Records(l), Some(s)) if l.is_empty() => {
                merge_scalar(local, side, Value::Array(Vec::new()), Some(s.into()), direction);
                Ok(())
            }
            (FieldValue::Record(l), Some(FieldValue::Records(s))) if s.is_empty() => {
                self.merge_single(local, side, l, None, direction)
            }
            (FieldValue::Scalar(l), Some(FieldValue::Records(s))) if s.is_empty() => {
                merge_scalar(local, side, l, Some(Value::Array(Vec::new())), direction);
                Ok(())
            }

            (FieldValue::Scalar(l), None) => {
                let server_value = side.previous.clone();
                merge_scalar(local, side, l, server_value, direction);
                Ok(())
            }
            (FieldValue::Scalar(Value::Null), Some(s)) => {
                merge_scalar(local, side, Value::Null, Some(s.into()), direction);
                Ok(())
            }
            (FieldValue::Scalar(l), Some(FieldValue::Scalar(s))) => {
                merge_scalar(local, side, l, Some(s), direction);
                Ok(())
            }

            (l, Some(s)) => Err(MergeError::schema(
                field,
                format!("local value is a {} but the server holds a {}", l.kind(), s.kind()),
            )),
        }
    }

    /// Reconcile a nested record sequence with the full algorithm
    fn merge_sequence(
        &mut self,
        local: &mut Record,
        side: ServerSide<'_>,
        local_records: Dataset,
        server_records: Option<Dataset>,
        direction: Direction,
    ) -> Result<()> {
        let had_records = server_records.is_some();
        let outcome = self.reconcile_scoped(
            local_records,
            server_records.unwrap_or_default(),
            Scope::Nested(direction),
            true,
        )?;

        local.insert(side.field.to_string(), records_to_value(outcome.to_client));
        if had_records || !outcome.to_server.is_empty() {
            side.write(records_to_value(outcome.to_server));
        } else {
            side.restore();
        }
        Ok(())
    }

    /// Reconcile a nested record by classification only
    ///
    /// There is no scavenging pass, but when pulling, a live server record
    /// that the client did not reference still reaches the client.
    fn merge_single(
        &mut self,
        local: &mut Record,
        side: ServerSide<'_>,
        local_record: Record,
        server_record: Option<Record>,
        direction: Direction,
    ) -> Result<()> {
        let key = UniqueKey::of(&local_record, self.names)?;
        let had_record = server_record.is_some();
        let outcome = self.reconcile_scoped(
            vec![local_record],
            server_record.into_iter().collect(),
            Scope::Nested(direction),
            false,
        )?;

        let to_server = self.pick(outcome.to_server, &key);

        // pulling: a live server record the client did not reference replaces it
        let to_client = match outcome.to_client.into_iter().next() {
            Some(record) => Some(record),
            None if direction == Direction::PullToLocal => {
                let live = to_server
                    .as_ref()
                    .filter(|server| !self.names.is_soft_deleted(server))
                    .cloned();
                if live.is_some() {
                    self.stats.scavenged += 1;
                }
                live
            }
            None => None,
        };
        local.insert(side.field.to_string(), to_client.map_or(Value::Null, Value::Object));

        match to_server {
            Some(record) => side.write(Value::Object(record)),
            None if had_record => side.write(Value::Null),
            None => side.restore(),
        }
        Ok(())
    }

    /// Settle the nested structure of a record being created
    fn adopt(&mut self, value: FieldValue) -> Result<Value> {
        match value {
            FieldValue::Records(records) => {
                let outcome = self.reconcile_scoped(records, Vec::new(), Scope::Adopted, true)?;
                Ok(records_to_value(outcome.to_client))
            }
            FieldValue::Record(record) => {
                let outcome = self.reconcile_scoped(vec![record], Vec::new(), Scope::Adopted, false)?;
                Ok(outcome
                    .to_client
                    .into_iter()
                    .next()
                    .map_or(Value::Null, Value::Object))
            }
            FieldValue::Scalar(value) => Ok(value),
        }
    }

    /// The record carrying `key`, else the first one
    fn pick(&self, records: Dataset, key: &UniqueKey) -> Option<Record> {
        let position = records
            .iter()
            .position(|record| UniqueKey::of(record, self.names).ok().as_ref() == Some(key))
            .unwrap_or(0);
        records.into_iter().nth(position)
    }
}

/// One field of the server record, taken out while it is reconciled
struct ServerSide<'r> {
    field: &'r str,
    record: &'r mut Record,
    /// What an empty field held before it was taken: `null`, `[]`, or nothing
    previous: Option<Value>,
}

impl ServerSide<'_> {
    fn write(self, value: Value) {
        self.record.insert(self.field.to_string(), value);
    }

    /// Put back an absent, null or empty field untouched
    fn restore(self) {
        if let Some(previous) = self.previous {
            self.record.insert(self.field.to_string(), previous);
        }
    }
}

fn merge_scalar(
    local: &mut Record,
    side: ServerSide<'_>,
    local_value: Value,
    server_value: Option<Value>,
    direction: Direction,
) {
    let field = side.field.to_string();
    match (direction, server_value) {
        (Direction::PushToServer, _) => {
            side.write(local_value.clone());
            local.insert(field, local_value);
        }
        (Direction::PullToLocal, Some(server_value)) => {
            local.insert(field, server_value.clone());
            side.write(server_value);
        }
        (Direction::PullToLocal, None) => {
            local.insert(field, local_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::merge::{dataset_from_value, Dataset, FieldNames, MergeError, Reconciler};
    use serde_json::{json, Value};

    const STAMP: &str = "2024-05-01 12:00:00";

    fn dataset(value: Value) -> Dataset {
        dataset_from_value(value).unwrap()
    }

    fn merge(names: &FieldNames, local: Value, server: Value) -> (Value, Value) {
        let outcome = Reconciler::stamped(names, STAMP)
            .reconcile(dataset(local), dataset(server))
            .unwrap();
        (
            crate::merge::records_to_value(outcome.to_client),
            crate::merge::records_to_value(outcome.to_server),
        )
    }

    #[test]
    fn test_nested_array_joins_by_unique_key() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "items": [
                {"unique": "i2", "qty": 20},
                {"unique": "i1", "qty": 10}
            ]}]),
            json!([{"unique": "p", "items": [
                {"unique": "i1", "qty": 1},
                {"unique": "i2", "qty": 2}
            ]}]),
        );

        assert_eq!(server[0]["items"], json!([{"unique": "i1", "qty": 10}, {"unique": "i2", "qty": 20}]));
        assert_eq!(client[0]["items"], json!([{"unique": "i2", "qty": 20}, {"unique": "i1", "qty": 10}]));
    }

    #[test]
    fn test_nested_array_pull_brings_other_clients_children() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "items": [{"unique": "i1", "qty": 1}]}]),
            json!([{"unique": "p", "items": [
                {"unique": "i1", "qty": 5},
                {"unique": "i2", "qty": 2}
            ]}]),
        );

        assert_eq!(client[0]["items"], json!([{"unique": "i1", "qty": 5}, {"unique": "i2", "qty": 2}]));
        assert_eq!(server[0]["items"], json!([{"unique": "i1", "qty": 5}, {"unique": "i2", "qty": 2}]));
    }

    #[test]
    fn test_nested_child_created_under_unchanged_parent() {
        let names = FieldNames {
            created_at_key: Some("created_at".to_string()),
            ..FieldNames::default()
        };
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "items": [{"unique": "i9", "qty": 9, "is_new": true}]}]),
            json!([{"unique": "p", "items": []}]),
        );

        let expected = json!([{"unique": "i9", "qty": 9, "created_at": STAMP}]);
        assert_eq!(server[0]["items"], expected);
        assert_eq!(client[0]["items"], expected);
    }

    #[test]
    fn test_created_parent_adopts_children() {
        let names = FieldNames {
            created_at_key: Some("created_at".to_string()),
            ..FieldNames::default()
        };
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "is_new": true, "items": [
                {"unique": "c1", "name": "kept"},
                {"unique": "c2", "name": "gone", "deleted": true}
            ], "owner": {"unique": "o1", "name": "me", "is_new": true}}]),
            json!([]),
        );

        assert_eq!(server, client);
        assert_eq!(server[0]["items"], json!([{"unique": "c1", "name": "kept", "created_at": STAMP}]));
        assert_eq!(server[0]["owner"], json!({"unique": "o1", "name": "me", "created_at": STAMP}));
        assert_eq!(server[0]["created_at"], STAMP);
    }

    #[test]
    fn test_nested_delete_under_updated_parent() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "items": [
                {"unique": "i1", "deleted": true},
                {"unique": "i2"}
            ]}]),
            json!([{"unique": "p", "items": [{"unique": "i1"}, {"unique": "i2"}]}]),
        );

        assert_eq!(server[0]["items"], json!([{"unique": "i2"}]));
        assert_eq!(client[0]["items"], json!([{"unique": "i2"}]));
    }

    #[test]
    fn test_nested_sequence_is_renumbered() {
        let names = FieldNames {
            sorting_key: Some("position".to_string()),
            ..FieldNames::default()
        };
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "items": [
                {"unique": "a", "position": 0},
                {"unique": "c", "position": 5}
            ]}]),
            json!([{"unique": "p", "items": [
                {"unique": "a", "position": 0},
                {"unique": "c", "position": 2}
            ]}]),
        );

        assert_eq!(client[0]["items"][1]["position"], 1);
        assert_eq!(server[0]["items"][1]["position"], 1);
    }

    #[test]
    fn test_nested_record_pull() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "address": {"unique": "a1", "city": "Rome"}}]),
            json!([{"unique": "p", "address": {"unique": "a1", "city": "Turin"}}]),
        );

        assert_eq!(client[0]["address"], json!({"unique": "a1", "city": "Turin"}));
        assert_eq!(server[0]["address"], json!({"unique": "a1", "city": "Turin"}));
    }

    #[test]
    fn test_nested_record_pull_with_different_key() {
        let names = FieldNames::default();
        let mut reconciler = Reconciler::stamped(&names, STAMP);
        let outcome = reconciler
            .reconcile(
                dataset(json!([{"unique": "p", "address": {"unique": "a1", "city": "Rome"}}])),
                dataset(json!([{"unique": "p", "address": {"unique": "a2", "city": "Turin"}}])),
            )
            .unwrap();

        let expected = dataset(json!([{"unique": "p", "address": {"unique": "a2", "city": "Turin"}}]));
        assert_eq!(outcome.to_client, expected);
        assert_eq!(outcome.to_server, expected);
        assert_eq!(reconciler.stats().scavenged, 1);
    }

    #[test]
    fn test_nested_record_pull_skips_soft_deleted_server_record() {
        let names = FieldNames {
            deleted_at_key: Some("deleted_at".to_string()),
            ..FieldNames::default()
        };
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "address": {"unique": "a1", "city": "Rome"}}]),
            json!([{"unique": "p", "address": {"unique": "a2", "city": "Turin", "deleted_at": "t1"}}]),
        );

        assert_eq!(client[0]["address"], Value::Null);
        assert_eq!(server[0]["address"]["unique"], "a2");
    }

    #[test]
    fn test_nested_record_replaced_by_client() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "address": {"unique": "a2", "city": "Oslo", "is_new": true}}]),
            json!([{"unique": "p", "address": {"unique": "a1", "city": "Turin"}}]),
        );

        assert_eq!(client[0]["address"], json!({"unique": "a2", "city": "Oslo"}));
        assert_eq!(server[0]["address"], json!({"unique": "a2", "city": "Oslo"}));
    }

    #[test]
    fn test_nested_record_against_null_server_field() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "address": {"unique": "a1", "city": "Rome"}}]),
            json!([{"unique": "p", "address": null}]),
        );

        // not new and unknown to the server: dropped on the client, server untouched
        assert_eq!(client[0]["address"], Value::Null);
        assert_eq!(server[0]["address"], Value::Null);
    }

    #[test]
    fn test_scalar_arrays_and_plain_objects_compare_by_value() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "tags": ["x", "y"], "meta": {"k": 2}}]),
            json!([{"unique": "p", "tags": ["x"], "meta": {"k": 1}}]),
        );

        assert_eq!(server[0]["tags"], json!(["x", "y"]));
        assert_eq!(server[0]["meta"], json!({"k": 2}));
        assert_eq!(client, server);
    }

    #[test]
    fn test_empty_array_against_scalar_array() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "tags": []}]),
            json!([{"unique": "p", "tags": ["x"]}]),
        );

        assert_eq!(client[0]["tags"], json!(["x"]));
        assert_eq!(server[0]["tags"], json!(["x"]));
    }

    #[test]
    fn test_empty_array_against_nested_record() {
        let names = FieldNames::default();
        let address = json!({"unique": "a1", "city": "Rome"});

        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "address": []}]),
            json!([{"unique": "p", "address": address.clone()}]),
        );
        assert_eq!(client[0]["address"], address);
        assert_eq!(server[0]["address"], address);

        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "address": []}]),
            json!([{"unique": "p", "address": address}]),
        );
        assert_eq!(client[0]["address"], json!([]));
        assert_eq!(server[0]["address"], json!([]));
    }

    #[test]
    fn test_empty_array_against_plain_scalar() {
        let names = FieldNames::default();

        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "tags": []}]),
            json!([{"unique": "p", "tags": "x"}]),
        );
        assert_eq!(client[0]["tags"], "x");
        assert_eq!(server[0]["tags"], "x");

        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "tags": "x"}]),
            json!([{"unique": "p", "tags": []}]),
        );
        assert_eq!(client[0]["tags"], json!([]));
        assert_eq!(server[0]["tags"], json!([]));

        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "tags": "x"}]),
            json!([{"unique": "p", "tags": []}]),
        );
        assert_eq!(client[0]["tags"], "x");
        assert_eq!(server[0]["tags"], "x");
    }

    #[test]
    fn test_nested_record_against_empty_server_array() {
        let names = FieldNames::default();

        // unknown to the server and not new: dropped, the server keeps its empty array
        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "address": {"unique": "a1", "city": "Rome"}}]),
            json!([{"unique": "p", "address": []}]),
        );
        assert_eq!(client[0]["address"], Value::Null);
        assert_eq!(server[0]["address"], json!([]));

        let (client, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true,
                    "address": {"unique": "a1", "city": "Oslo", "is_new": true}}]),
            json!([{"unique": "p", "address": []}]),
        );
        assert_eq!(client[0]["address"], json!({"unique": "a1", "city": "Oslo"}));
        assert_eq!(server[0]["address"], json!({"unique": "a1", "city": "Oslo"}));
    }

    #[test]
    fn test_push_inserts_missing_server_field() {
        let names = FieldNames::default();
        let (_, server) = merge(
            &names,
            json!([{"unique": "p", "updated": true, "color": "red"}]),
            json!([{"unique": "p"}]),
        );

        assert_eq!(server, json!([{"unique": "p", "color": "red"}]));
    }

    #[test]
    fn test_primary_key_is_not_diffed() {
        let names = FieldNames::default();
        let (client, server) = merge(
            &names,
            json!([{"id": 99, "unique": "p", "updated": true}]),
            json!([{"id": 1, "unique": "p"}]),
        );

        assert_eq!(server[0]["id"], 1);
        assert_eq!(client[0]["id"], 99);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let names = FieldNames::default();
        let err = Reconciler::new(&names)
            .reconcile(
                dataset(json!([{"unique": "p", "updated": true, "address": "Via Roma 1"}])),
                dataset(json!([{"unique": "p", "address": {"unique": "a1", "city": "Rome"}}])),
            )
            .unwrap_err();

        assert_eq!(
            err,
            MergeError::SchemaMismatch {
                field: "address".to_string(),
                detail: "local value is a string but the server holds a record".to_string(),
            }
        );
    }
}
