//! Local-side classification
//!
//! Decides, for every local record, whether it deletes, creates, edits or
//! refreshes its server counterpart, and applies that decision to the
//! working set.

use serde_json::Value;

use super::error::{MergeError, Result};
use super::reconciler::{Pass, Reconciler, Scope};
use super::types::{Dataset, Direction, Record, SyncFlags, UniqueKey};
use super::working_set::WorkingSet;

impl Reconciler<'_> {
    /// Classify every local record, first matching rule wins:
    ///
    /// | condition | action | to client |
    /// |---|---|---|
    /// | deleted | delete server copy | no |
    /// | is_new | create, resurrect, or conflict | yes |
    /// | server copy absent or soft-deleted | none | no |
    /// | updated | push client fields | yes |
    /// | otherwise | pull server fields | yes |
    pub(super) fn classify_local(
        &mut self,
        local: Dataset,
        pass: &mut Pass,
        scope: Scope,
    ) -> Result<()> {
        for mut record in local {
            let key = UniqueKey::of(&record, self.names)?;
            let flags = SyncFlags::read(&record, self.names)?;
            let slot = pass.working.position(&key);
            pass.claimed.insert(key.clone(), slot);

            if flags.deleted {
                if let Some(slot) = slot {
                    self.delete_on_server(&mut pass.working, slot, &key);
                    self.stats.deleted += 1;
                }
                continue;
            }

            if flags.is_new || scope == Scope::Adopted {
                match slot {
                    None => {
                        let slot = self.create_on_server(&mut record, &mut pass.working, key.clone())?;
                        pass.claimed.insert(key, Some(slot));
                    }
                    Some(slot) => self.resurrect_on_server(&record, &mut pass.working, slot, &key)?,
                }
                self.names.strip_flags(&mut record);
                pass.to_client.push(record);
                continue;
            }

            let server = slot
                .and_then(|slot| pass.working.get_mut(slot))
                .filter(|server| !self.names.is_soft_deleted(server));
            let Some(server) = server else {
                self.stats.dropped += 1;
                continue;
            };

            if flags.updated {
                self.edit_on_server(&mut record, server)?;
            } else if scope == Scope::Nested(Direction::PushToServer) {
                self.diff_attributes(&mut record, Some(server), Direction::PushToServer)?;
                self.stats.pushed += 1;
            } else {
                self.diff_attributes(&mut record, Some(server), Direction::PullToLocal)?;
                self.stats.pulled += 1;
            }

            self.names.strip_flags(&mut record);
            pass.to_client.push(record);
        }

        Ok(())
    }

    /// Soft-delete or remove the server record in `slot`
    fn delete_on_server(&self, working: &mut WorkingSet, slot: usize, key: &UniqueKey) {
        let Some(server) = working.get_mut(slot) else {
            return;
        };

        if let Some(sorting_key) = &self.names.sorting_key {
            server.insert(sorting_key.clone(), Value::Null);
        }

        if self.names.deleted_at_key.is_some() {
            self.stamp_audit(server, self.names.deleted_at_key.as_ref());
        } else {
            working.remove(slot, key);
        }
    }

    /// Stamp a brand new record, settle its nested structure and append it
    fn create_on_server(
        &mut self,
        record: &mut Record,
        working: &mut WorkingSet,
        key: UniqueKey,
    ) -> Result<usize> {
        self.stamp_audit(record, self.names.created_at_key.as_ref());
        self.stamp_audit(record, self.names.updated_at_key.as_ref());

        self.diff_attributes(record, None, Direction::PushToServer)?;
        self.names.strip_flags(record);

        self.stats.created += 1;
        Ok(working.append(key, record.clone()))
    }

    /// Revive a soft-deleted server record, or reject a create on a live key
    fn resurrect_on_server(
        &mut self,
        record: &Record,
        working: &mut WorkingSet,
        slot: usize,
        key: &UniqueKey,
    ) -> Result<()> {
        let Some(server) = working.get_mut(slot) else {
            return Ok(());
        };

        if !self.names.is_soft_deleted(server) {
            return Err(MergeError::DuplicateKeyConflict {
                key: key.to_string(),
            });
        }

        if let Some(deleted_at_key) = &self.names.deleted_at_key {
            server.insert(deleted_at_key.clone(), Value::Null);
        }
        if let Some(sorting_key) = &self.names.sorting_key {
            let position = record.get(sorting_key).cloned().unwrap_or(Value::Null);
            server.insert(sorting_key.clone(), position);
        }
        self.stamp_audit(server, self.names.updated_at_key.as_ref());

        self.stats.resurrected += 1;
        Ok(())
    }

    /// Push a client edit; the creation stamp stays server-authoritative
    fn edit_on_server(&mut self, record: &mut Record, server: &mut Record) -> Result<()> {
        self.stamp_audit(record, self.names.updated_at_key.as_ref());
        if let Some(created_at_key) = &self.names.created_at_key {
            let created = server.get(created_at_key).cloned().unwrap_or(Value::Null);
            record.insert(created_at_key.clone(), created);
        }

        self.diff_attributes(record, Some(server), Direction::PushToServer)?;
        self.stats.pushed += 1;
        Ok(())
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

    fn audited() -> FieldNames {
        FieldNames {
            created_at_key: Some("created_at".to_string()),
            updated_at_key: Some("updated_at".to_string()),
            deleted_at_key: Some("deleted_at".to_string()),
            ..FieldNames::default()
        }
    }

    #[test]
    fn test_deleted_wins_over_other_flags() {
        let names = audited();
        let server = dataset(json!([{"unique": "a", "deleted_at": null}]));
        let local = dataset(json!([{"unique": "a", "is_new": true, "updated": true, "deleted": true}]));

        let outcome = Reconciler::stamped(&names, STAMP)
            .reconcile(local, server)
            .unwrap();

        assert!(outcome.to_client.is_empty());
        assert_eq!(outcome.to_server[0]["deleted_at"], STAMP);
    }

    #[test]
    fn test_delete_of_unknown_record_is_noop() {
        let names = audited();
        let server = dataset(json!([{"unique": "a", "deleted_at": null}]));
        let local = dataset(json!([{"unique": "zzz", "deleted": true}]));

        let mut reconciler = Reconciler::stamped(&names, STAMP);
        let outcome = reconciler.reconcile(local, server.clone()).unwrap();

        assert_eq!(outcome.to_server, server);
        assert_eq!(outcome.to_client, server);
        assert_eq!(reconciler.stats().deleted, 0);
    }

    #[test]
    fn test_update_stamps_and_keeps_server_creation_time() {
        let names = audited();
        let server = dataset(json!([
            {"unique": "a", "name": "old", "created_at": "t0", "updated_at": "t0", "deleted_at": null}
        ]));
        let local = dataset(json!([
            {"unique": "a", "name": "new", "created_at": "forged", "updated_at": "t0", "deleted_at": null,
             "is_new": false, "updated": true, "deleted": false}
        ]));

        let outcome = Reconciler::stamped(&names, STAMP)
            .reconcile(local, server)
            .unwrap();

        let expected = dataset(json!([
            {"unique": "a", "name": "new", "created_at": "t0", "updated_at": STAMP, "deleted_at": null}
        ]));
        assert_eq!(outcome.to_server, expected);
        assert_eq!(outcome.to_client, expected);
    }

    #[test]
    fn test_update_of_soft_deleted_record_is_dropped() {
        let names = audited();
        let server = dataset(json!([{"unique": "a", "name": "old", "deleted_at": "t1"}]));
        let local = dataset(json!([{"unique": "a", "name": "new", "updated": true}]));

        let outcome = Reconciler::stamped(&names, STAMP)
            .reconcile(local, server.clone())
            .unwrap();

        assert!(outcome.to_client.is_empty());
        assert_eq!(outcome.to_server, server);
    }

    #[test]
    fn test_pull_overwrites_local_edits_without_flag() {
        let names = FieldNames::default();
        let server = dataset(json!([{"unique": "a", "name": "server"}]));
        let local = dataset(json!([{"unique": "a", "name": "local"}]));

        let outcome = Reconciler::new(&names).reconcile(local, server.clone()).unwrap();

        assert_eq!(outcome.to_client, server);
        assert_eq!(outcome.to_server, server);
    }

    #[test]
    fn test_second_create_with_same_key_conflicts() {
        let names = FieldNames::default();
        let local = dataset(json!([
            {"unique": "a", "is_new": true},
            {"unique": "a", "is_new": true}
        ]));

        let err = Reconciler::new(&names).reconcile(local, vec![]).unwrap_err();
        assert!(matches!(err, MergeError::DuplicateKeyConflict { ref key } if key == "a"));
    }

    #[test]
    fn test_flags_stripped_from_client_records() {
        let names = FieldNames::default();
        let server = dataset(json!([{"unique": "a", "name": "x"}]));
        let local = dataset(json!([{"unique": "a", "name": "x", "is_new": false, "updated": false, "deleted": false}]));

        let outcome = Reconciler::new(&names).reconcile(local, server).unwrap();

        for flag in ["is_new", "updated", "deleted"] {
            assert!(!outcome.to_client[0].contains_key(flag));
        }
    }
}
