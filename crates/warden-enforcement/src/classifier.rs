//! HTTP binding for the image classifier.
//!
//! The classifier service takes `POST {endpoint}` with `{"url": "<locator>"}`
//! and answers `{"score": <f64>}`. Non-2xx answers are failures: 4xx means
//! the resource could not be fetched, anything else is a backend error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_core::{Classifier, ClassifyError};

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    score: f64,
}

/// Classifier reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpClassifier {
    /// Client for `endpoint` with a per-request `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifyError::Backend(format!("client setup failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, locator: &str) -> Result<f64, ClassifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest { url: locator })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout(self.timeout)
                } else {
                    ClassifyError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Backend(format!("malformed response: {e}")))?;
        debug!(score = parsed.score, "classifier answered");
        Ok(parsed.score)
    }
}

fn status_error(status: StatusCode, body: &str) -> ClassifyError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status.is_client_error() {
        ClassifyError::Unavailable(detail)
    } else {
        ClassifyError::Backend(detail)
    }
}

/// Classifier used when no endpoint is configured: every call fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredClassifier;

#[async_trait]
impl Classifier for UnconfiguredClassifier {
    async fn classify(&self, _locator: &str) -> Result<f64, ClassifyError> {
        Err(ClassifyError::Unavailable(
            "no classifier endpoint configured".into(),
        ))
    }
}
