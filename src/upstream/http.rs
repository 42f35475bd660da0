//! REST upstream store

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, ETAG, IF_MATCH};
use reqwest::StatusCode;
use serde_json::Value;

use super::{Snapshot, UpstreamError, UpstreamStore};
use crate::config::UpstreamConfig;
use crate::merge::{parse_dataset, Record};

/// Upstream store reached over HTTP
///
/// `GET pull_url` returns the dataset as a JSON array, `POST push_url`
/// replaces it. The caller's `Authorization` header is forwarded on both.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    pull_url: String,
    push_url: String,
}

impl HttpStore {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            pull_url: config.pull_url.clone(),
            push_url: config.push_url.clone(),
        })
    }

    fn headers(authorization: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(authorization) = authorization {
            match HeaderValue::from_str(authorization) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Dropping malformed Authorization header"),
            }
        }

        headers
    }
}

#[async_trait]
impl UpstreamStore for HttpStore {
    async fn pull(&self, authorization: Option<&str>) -> Result<Snapshot, UpstreamError> {
        let response = self
            .client
            .get(&self.pull_url)
            .headers(Self::headers(authorization))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let revision = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport)?;
        let records = parse_dataset(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        tracing::debug!(
            "Pulled {} records from {} (revision {:?})",
            records.len(),
            self.pull_url,
            revision
        );

        Ok(Snapshot { records, revision })
    }

    async fn push(
        &self,
        records: &[Record],
        revision: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut request = self
            .client
            .post(&self.push_url)
            .headers(Self::headers(authorization))
            .json(records);
        if let Some(revision) = revision {
            request = request.header(IF_MATCH, revision);
        }

        let response = request.send().await.map_err(transport)?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Err(UpstreamError::RevisionConflict {
                expected: revision.unwrap_or_default().to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.bytes().await.map_err(transport)?;
        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_slice(&body).unwrap_or_else(|e| {
            tracing::debug!("Push acknowledgement is not JSON: {}", e);
            Value::Null
        }))
    }
}

fn transport(error: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport(error.to_string())
}

async fn status_error(response: reqwest::Response) -> UpstreamError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    UpstreamError::Status { status, body }
}
