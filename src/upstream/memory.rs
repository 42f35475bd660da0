//! In-process upstream store

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{Snapshot, UpstreamError, UpstreamStore};
use crate::merge::{Dataset, Record};

/// Dataset held in memory with a monotonically increasing revision
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Dataset,
    revision: u64,
    pushes: usize,
}

impl MemoryStore {
    /// Create a store seeded with `records`
    pub fn new(records: Dataset) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                records,
                revision: 0,
                pushes: 0,
            }),
        }
    }

    /// Current records
    pub async fn records(&self) -> Dataset {
        self.state.read().await.records.clone()
    }

    /// Current revision
    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    /// Number of accepted pushes
    pub async fn push_count(&self) -> usize {
        self.state.read().await.pushes
    }

    /// Replace the records out of band, as another writer would
    pub async fn replace(&self, records: Dataset) {
        let mut state = self.state.write().await;
        state.records = records;
        state.revision += 1;
    }
}

#[async_trait]
impl UpstreamStore for MemoryStore {
    async fn pull(&self, _authorization: Option<&str>) -> Result<Snapshot, UpstreamError> {
        let state = self.state.read().await;
        Ok(Snapshot {
            records: state.records.clone(),
            revision: Some(state.revision.to_string()),
        })
    }

    async fn push(
        &self,
        records: &[Record],
        revision: Option<&str>,
        _authorization: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut state = self.state.write().await;

        if let Some(expected) = revision {
            if expected != state.revision.to_string() {
                tracing::debug!(
                    "Rejecting push against revision {} (current {})",
                    expected,
                    state.revision
                );
                return Err(UpstreamError::RevisionConflict {
                    expected: expected.to_string(),
                });
            }
        }

        state.records = records.to_vec();
        state.revision += 1;
        state.pushes += 1;

        Ok(json!({ "revision": state.revision }))
    }
}
