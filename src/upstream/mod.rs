//! Upstream store
//!
//! The authoritative dataset lives outside this service. A sync pulls it,
//! merges against it, and pushes the result back.
//!
//! Implementations:
//! - `HttpStore`: REST endpoints, revision carried as `ETag` / `If-Match`
//! - `MemoryStore`: in-process store for tests and local development

mod http;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::merge::{Dataset, Record};

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Errors talking to the upstream store
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Request never produced a response
    #[error("Upstream request failed: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body is not a dataset
    #[error("Upstream payload could not be decoded: {0}")]
    Decode(String),

    /// The dataset changed between pull and push
    #[error("Upstream dataset changed since revision {expected}")]
    RevisionConflict { expected: String },
}

/// Dataset as pulled from upstream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Current server records
    pub records: Dataset,
    /// Opaque version token, echoed back on push when present
    pub revision: Option<String>,
}

/// Access to the authoritative dataset
#[async_trait]
pub trait UpstreamStore: Send + Sync {
    /// Fetch the current dataset
    async fn pull(&self, authorization: Option<&str>) -> Result<Snapshot, UpstreamError>;

    /// Persist a merged dataset computed against `revision`
    async fn push(
        &self,
        records: &[Record],
        revision: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<Value, UpstreamError>;
}
