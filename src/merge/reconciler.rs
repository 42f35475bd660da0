//! Merge orchestration
//!
//! One merge runs in three phases over an owned working copy of the server
//! dataset:
//!
//! 1. classify every local record and apply its disposition to the working set
//! 2. scavenge server-only records for the client
//! 3. renumber the sorting key so the client ordering is dense and zero-based

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use super::error::Result;
use super::sorting;
use super::types::{Dataset, Direction, FieldNames, MergeOutcome, MergeStats, Record, UniqueKey};
use super::working_set::WorkingSet;

/// Audit timestamp format used when none is configured
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How unflagged local records are treated at a given depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Scope {
    /// Top-level dataset: unflagged records pull from the server
    Root,
    /// Nested under a matched parent: unflagged records follow the parent
    ///
    /// Under an `updated` parent this pushes every child the client holds, so
    /// server-side edits to those children made by another client are
    /// overwritten.
    Nested(Direction),
    /// Nested under a parent being created: every record is a creation
    Adopted,
}

/// State of one reconciliation pass
pub(super) struct Pass {
    /// Server records being rewritten
    pub working: WorkingSet,
    /// Records the client should now hold
    pub to_client: Dataset,
    /// Unique keys seen so far, with the slot of their server record
    pub claimed: HashMap<UniqueKey, Option<usize>>,
}

/// Reconciles a client dataset against the authoritative server dataset
///
/// A reconciler holds a single audit timestamp, so every record stamped during
/// one merge carries the same value.
pub struct Reconciler<'a> {
    pub(super) names: &'a FieldNames,
    pub(super) stamp: String,
    pub(super) stats: MergeStats,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler stamping audit fields with the current UTC time
    pub fn new(names: &'a FieldNames) -> Self {
        Self::stamped(names, Utc::now().format(DEFAULT_TIMESTAMP_FORMAT).to_string())
    }

    /// Create a reconciler stamping audit fields with `stamp`
    pub fn stamped(names: &'a FieldNames, stamp: impl Into<String>) -> Self {
        Self {
            names,
            stamp: stamp.into(),
            stats: MergeStats::default(),
        }
    }

    /// The audit timestamp written by this reconciler
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Merge `local` against `server`
    ///
    /// Returns the dataset to hand back to the client and the dataset to
    /// persist upstream.
    pub fn reconcile(&mut self, local: Dataset, server: Dataset) -> Result<MergeOutcome> {
        self.reconcile_scoped(local, server, Scope::Root, true)
    }

    /// Run the algorithm at any depth
    ///
    /// `full` enables scavenging and renumbering; a nested single record only
    /// needs classification.
    pub(super) fn reconcile_scoped(
        &mut self,
        local: Dataset,
        server: Dataset,
        scope: Scope,
        full: bool,
    ) -> Result<MergeOutcome> {
        let mut pass = Pass {
            working: WorkingSet::new(server, self.names)?,
            to_client: Vec::with_capacity(local.len()),
            claimed: HashMap::with_capacity(local.len()),
        };

        self.classify_local(local, &mut pass, scope)?;

        if full {
            self.scavenge(&mut pass)?;
            self.stats.renumbered += sorting::normalize(
                &mut pass.to_client,
                &pass.claimed,
                &mut pass.working,
                self.names,
            )?;
        }

        Ok(MergeOutcome {
            to_client: pass.to_client,
            to_server: pass.working.into_records(),
        })
    }

    /// Deliver live server records no local record referenced
    fn scavenge(&mut self, pass: &mut Pass) -> Result<()> {
        for (slot, record) in pass.working.iter() {
            if self.names.is_soft_deleted(record) {
                continue;
            }

            let key = UniqueKey::of(record, self.names)?;
            if pass.claimed.contains_key(&key) {
                continue;
            }

            pass.claimed.insert(key, Some(slot));
            pass.to_client.push(record.clone());
            self.stats.scavenged += 1;
        }

        Ok(())
    }

    /// Write the merge timestamp into an optional audit field
    pub(super) fn stamp_audit(&self, record: &mut Record, key: Option<&String>) {
        if let Some(key) = key {
            record.insert(key.clone(), Value::String(self.stamp.clone()));
        }
    }
}

/// Merge `local` against `server` with a fresh reconciler
pub fn reconcile(local: Dataset, server: Dataset, names: &FieldNames) -> Result<MergeOutcome> {
    Reconciler::new(names).reconcile(local, server)
}
