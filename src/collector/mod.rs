//! Finding collectors.
//!
//! Each processor turns one kind of compliance finding into evidence for a
//! single provider. Processors share the [`EvidenceProducer`] capability and
//! hand the built evidence to an [`EvidenceSubmitter`]: either the remote
//! evidence API or an in-process service.

pub mod client;
pub mod config_rules;
pub mod security_hub;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::EvidenceService;
use crate::domain::{AttachmentInput, CreateEvidenceInput, EvidenceRecord, NewSchema};

pub use client::{EvidenceApiClient, RetryPolicy};
pub use config_rules::ConfigEventProcessor;
pub use security_hub::SecurityHubProcessor;

/// Object key of the raw finding attached to every collected record
pub const ORIGINAL_FINDING_KEY: &str = "original-finding.json";

/// Destination for evidence built by a collector
#[async_trait]
pub trait EvidenceSubmitter: Send + Sync {
    /// Make sure the schema exists for the provider; existing schemas are fine
    async fn ensure_schema(&self, provider_id: &str, schema: &NewSchema) -> Result<()>;

    async fn submit(&self, input: &CreateEvidenceInput) -> Result<EvidenceRecord>;
}

/// What a finding says about its targets
#[derive(Debug, Clone, PartialEq)]
pub struct FindingContext {
    pub target_id: String,
    pub additional_target_ids: Vec<String>,

    /// Evidence content, conforming to the producer's schema
    pub content: Value,
}

/// Shared capability of all finding processors
#[async_trait]
pub trait EvidenceProducer: Send + Sync {
    /// Human-readable source name for logs
    fn source(&self) -> &'static str;

    fn provider_id(&self) -> &str;

    /// Schema registered for the evidence this producer emits
    fn schema(&self) -> NewSchema;

    /// Split a raw input document into individual findings
    fn findings(&self, input: Value) -> Vec<Value> {
        match input {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    /// Extract the targets and the evidence content from one finding
    fn construct_context(&self, finding: &Value) -> Result<FindingContext>;

    /// Register the producer's schema with the submitter
    async fn setup(&self, submitter: &dyn EvidenceSubmitter) -> Result<()> {
        let schema = self.schema();
        submitter
            .ensure_schema(self.provider_id(), &schema)
            .await
            .with_context(|| format!("Failed to set up {} collector", self.source()))?;

        info!(
            source = self.source(),
            provider_id = self.provider_id(),
            schema_id = %schema.schema_id,
            "Collector ready"
        );
        Ok(())
    }

    /// Keep the raw finding alongside the evidence it produced
    fn store_original_finding(&self, finding: &Value) -> Result<AttachmentInput> {
        let data = serde_json::to_vec_pretty(finding).context("Failed to encode finding")?;
        Ok(AttachmentInput {
            object_key: ORIGINAL_FINDING_KEY.to_string(),
            data,
        })
    }

    /// Build evidence for one finding and submit it
    async fn save_evidence(
        &self,
        finding: &Value,
        submitter: &dyn EvidenceSubmitter,
    ) -> Result<EvidenceRecord> {
        let context = self.construct_context(finding)?;
        let original = self.store_original_finding(finding)?;

        let input = CreateEvidenceInput {
            provider_id: self.provider_id().to_string(),
            target_id: context.target_id,
            schema_id: self.schema().schema_id,
            additional_target_ids: context.additional_target_ids,
            content: context.content,
            attachments: vec![original],
        };

        let record = submitter.submit(&input).await?;
        debug!(
            source = self.source(),
            evidence_id = %record.evidence_id,
            target_id = %record.target_id,
            "Saved evidence"
        );
        Ok(record)
    }
}

/// Submits straight to an in-process evidence service
pub struct LocalSubmitter {
    service: Arc<EvidenceService>,
    api_key: String,
}

impl LocalSubmitter {
    pub fn new(service: Arc<EvidenceService>, api_key: impl Into<String>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EvidenceSubmitter for LocalSubmitter {
    async fn ensure_schema(&self, provider_id: &str, schema: &NewSchema) -> Result<()> {
        if self
            .service
            .get_schema(provider_id, &schema.schema_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        self.service
            .create_schema(provider_id, schema.clone())
            .await?;
        Ok(())
    }

    async fn submit(&self, input: &CreateEvidenceInput) -> Result<EvidenceRecord> {
        Ok(self
            .service
            .create_evidence(&self.api_key, input.clone())
            .await?)
    }
}

/// String at a JSON pointer, if present and non-empty
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_str_at() {
        let doc = json!({"detail": {"resourceId": "i-123", "empty": ""}});
        assert_eq!(str_at(&doc, "/detail/resourceId"), Some("i-123"));
        assert_eq!(str_at(&doc, "/detail/empty"), None);
        assert_eq!(str_at(&doc, "/detail/missing"), None);
    }
}
