//! Sync API endpoint
//!
//! `POST /sync` takes the client's whole dataset, merges it against the
//! upstream dataset and answers with what the client should now hold.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use crate::error::Result;
use crate::merge::{parse_dataset, Dataset};
use crate::state::AppState;

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new().route("/sync", post(sync))
}

/// Pull, merge, push
///
/// Nothing is pushed when the payload is malformed or the merge fails.
#[tracing::instrument(skip_all, fields(sync_id = %Uuid::new_v4()))]
async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Dataset>> {
    let started = Instant::now();
    let local = parse_dataset(&body)?;
    let decoded = started.elapsed();

    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let snapshot = state.store().pull(authorization).await?;

    let merge_started = Instant::now();
    let mut reconciler = state.config().merge.reconciler();
    let outcome = reconciler.reconcile(local, snapshot.records)?;
    let stats = reconciler.stats();

    tracing::debug!(
        ?stats,
        "Merged in {:?} (payload decoded in {:?})",
        merge_started.elapsed(),
        decoded
    );

    state
        .store()
        .push(&outcome.to_server, snapshot.revision.as_deref(), authorization)
        .await?;

    tracing::info!(
        "Sync complete: {} records to client, {} to server in {:?}",
        outcome.to_client.len(),
        outcome.to_server.len(),
        started.elapsed()
    );

    Ok(Json(outcome.to_client))
}
