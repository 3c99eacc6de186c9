//! HTTP client for the evidence store API.
//!
//! Endpoints:
//! - `POST {endpoint}/providers/{provider_id}/evidences`
//! - `POST {endpoint}/providers/{provider_id}/schemas`
//!
//! Auth: `x-api-key` header

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::{CreateEvidenceInput, EvidenceRecord, NewSchema};

use super::EvidenceSubmitter;

/// Backoff for calls to the evidence API.
///
/// The service core never retries; transient failures surface as retryable
/// errors and only this collector-side client acts on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included
    pub max_attempts: u32,
    pub initial_delay_ms: u64,

    /// Cap on any single delay
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-indexed):
    /// `initial * multiplier^(attempt - 1)`, capped at `max_delay_ms`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Whether a response status is worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Error body returned by the evidence API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    message: String,
}

/// Evidence API client
pub struct EvidenceApiClient {
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl EvidenceApiClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, provider_id: &str, resource: &str) -> String {
        format!("{}/providers/{}/{}", self.endpoint, provider_id, resource)
    }

    /// POST a JSON body, retrying throttling, server errors and transport
    /// failures. Returns the final response status and body text.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<(StatusCode, String)> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let outcome = self
                .client
                .post(url)
                .header("x-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            let failure = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) {
                        let text = response
                            .text()
                            .await
                            .context("Failed to read evidence API response")?;
                        return Ok((status, text));
                    }
                    let text = response.text().await.unwrap_or_default();
                    anyhow::anyhow!("Evidence API error ({}): {}", status, text)
                }
                Err(e) => anyhow::Error::new(e).context("Failed to reach evidence API"),
            };

            if !self.retry.should_retry(attempt) {
                return Err(failure.context(format!("giving up after {} attempts", attempt)));
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Evidence API call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl EvidenceSubmitter for EvidenceApiClient {
    async fn ensure_schema(&self, provider_id: &str, schema: &NewSchema) -> Result<()> {
        let mut body = json!({
            "schemaId": schema.schema_id,
            "content": schema.content,
        });
        if let Some(ttl) = schema.ttl {
            body["ttlSeconds"] = json!(ttl.as_secs());
        }

        let (status, text) = self
            .post_with_retry(&self.url(provider_id, "schemas"), &body)
            .await?;

        if status.is_success() {
            debug!(provider_id, schema_id = %schema.schema_id, "Registered schema");
            return Ok(());
        }

        let message = error_message(&text);
        if status == StatusCode::BAD_REQUEST && message.contains("already exists") {
            debug!(provider_id, schema_id = %schema.schema_id, "Schema already registered");
            return Ok(());
        }

        anyhow::bail!("Schema registration failed ({}): {}", status, message)
    }

    async fn submit(&self, input: &CreateEvidenceInput) -> Result<EvidenceRecord> {
        let body = serde_json::to_value(input).context("Failed to encode evidence")?;
        let (status, text) = self
            .post_with_retry(&self.url(&input.provider_id, "evidences"), &body)
            .await?;

        if !status.is_success() {
            anyhow::bail!(
                "Evidence submission rejected ({}): {}",
                status,
                error_message(&text)
            );
        }

        serde_json::from_str(&text).context("Failed to parse evidence API response")
    }
}
