//! Dataset reconciliation
//!
//! Merges a client-held dataset with the authoritative server dataset and
//! produces the dataset to return to the client and the one to persist.
//!
//! # Merge Protocol
//!
//! 1. Client sends its whole dataset, each record flagged `is_new`,
//!    `updated` or `deleted` when it changed since the last sync
//! 2. Server pulls the authoritative dataset from the upstream store
//! 3. Records are joined on the unique key and classified
//! 4. Server-only records are delivered to the client
//! 5. The sorting key is renumbered to a dense zero-based sequence
//! 6. Server pushes the merged dataset upstream and answers the client
//!
//! # Conflict Rules
//!
//! - Delete wins over every other flag
//! - Creating a key that is live on the server is rejected
//! - Creating a key that is soft-deleted on the server revives it
//! - Client edits win for `updated` records, server values win otherwise
//! - Nested records and record sequences are merged recursively

mod classify;
mod differ;
mod error;
mod reconciler;
mod sorting;
mod types;
mod working_set;

pub use error::{MergeError, Result};
pub use reconciler::{reconcile, Reconciler, DEFAULT_TIMESTAMP_FORMAT};
pub use types::{
    dataset_from_value, parse_dataset, records_to_value, Dataset, Direction, FieldNames,
    FieldValue, MergeOutcome, MergeStats, Record, SyncFlags, UniqueKey,
};
