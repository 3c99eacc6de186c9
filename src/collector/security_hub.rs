//! Security Hub findings (ASFF) as evidence.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::NewSchema;

use super::{str_at, EvidenceProducer, FindingContext};

pub const DEFAULT_SCHEMA_ID: &str = "security-hub-finding";

/// Maps ASFF findings to evidence
#[derive(Debug, Clone)]
pub struct SecurityHubProcessor {
    provider_id: String,
    schema_id: String,
}

impl SecurityHubProcessor {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            schema_id: DEFAULT_SCHEMA_ID.to_string(),
        }
    }

    pub fn with_schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = schema_id.into();
        self
    }
}

#[async_trait]
impl EvidenceProducer for SecurityHubProcessor {
    fn source(&self) -> &'static str {
        "security-hub"
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn schema(&self) -> NewSchema {
        NewSchema {
            schema_id: self.schema_id.clone(),
            content: json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "required": ["findingId", "complianceStatus", "severity"],
                "properties": {
                    "findingId": {"type": "string"},
                    "title": {"type": "string"},
                    "generatorId": {"type": "string"},
                    "complianceStatus": {
                        "enum": ["PASSED", "FAILED", "WARNING", "NOT_AVAILABLE"]
                    },
                    "severity": {"type": "string"},
                    "accountId": {"type": "string"}
                }
            }),
            ttl: None,
        }
    }

    /// Accepts a single finding, an array of findings, or an EventBridge
    /// event carrying `detail.findings`
    fn findings(&self, input: Value) -> Vec<Value> {
        match input {
            Value::Array(items) => items,
            Value::Object(mut event) => match event
                .get_mut("detail")
                .and_then(|d| d.get_mut("findings"))
                .map(Value::take)
            {
                Some(Value::Array(findings)) => findings,
                _ => vec![Value::Object(event)],
            },
            other => vec![other],
        }
    }

    fn construct_context(&self, finding: &Value) -> Result<FindingContext> {
        let Some(finding_id) = str_at(finding, "/Id") else {
            bail!("Security Hub finding has no Id");
        };

        let mut resources = finding
            .get("Resources")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|r| str_at(r, "/Id"))
            .map(str::to_string);

        let Some(target_id) = resources.next() else {
            bail!("Security Hub finding {} has no resources", finding_id);
        };
        let additional_target_ids: Vec<String> = resources.collect();

        let mut content = Map::new();
        content.insert("findingId".into(), json!(finding_id));
        content.insert(
            "complianceStatus".into(),
            json!(str_at(finding, "/Compliance/Status").unwrap_or("NOT_AVAILABLE")),
        );
        content.insert(
            "severity".into(),
            json!(str_at(finding, "/Severity/Label").unwrap_or("INFORMATIONAL")),
        );
        if let Some(title) = str_at(finding, "/Title") {
            content.insert("title".into(), json!(title));
        }
        if let Some(generator_id) = str_at(finding, "/GeneratorId") {
            content.insert("generatorId".into(), json!(generator_id));
        }
        if let Some(account_id) = str_at(finding, "/AwsAccountId") {
            content.insert("accountId".into(), json!(account_id));
        }

        Ok(FindingContext {
            target_id,
            additional_target_ids,
            content: Value::Object(content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> Value {
        json!({
            "SchemaVersion": "2018-10-08",
            "Id": "arn:aws:securityhub:us-east-1:111122223333:finding/abc",
            "GeneratorId": "aws-foundational-security-best-practices/v/1.0.0/S3.1",
            "AwsAccountId": "111122223333",
            "Title": "S3 buckets should block public access",
            "Severity": {"Label": "HIGH"},
            "Compliance": {"Status": "FAILED"},
            "Resources": [
                {"Type": "AwsS3Bucket", "Id": "arn:aws:s3:::data-bucket"},
                {"Type": "AwsAccount", "Id": "AWS::::Account:111122223333"}
            ]
        })
    }

    #[test]
    fn test_context_from_finding() {
        let processor = SecurityHubProcessor::new("p1");
        let context = processor.construct_context(&finding()).unwrap();

        assert_eq!(context.target_id, "arn:aws:s3:::data-bucket");
        assert_eq!(
            context.additional_target_ids,
            vec!["AWS::::Account:111122223333"]
        );
        assert_eq!(context.content["complianceStatus"], "FAILED");
        assert_eq!(context.content["severity"], "HIGH");
        assert_eq!(context.content["accountId"], "111122223333");
    }

    #[test]
    fn test_content_conforms_to_schema() {
        let processor = SecurityHubProcessor::new("p1");
        let schema = processor.schema();
        let context = processor.construct_context(&finding()).unwrap();

        let validator = crate::core::SchemaValidator::compile(&schema.content).unwrap();
        assert!(validator.validate(&context.content).is_ok());
    }

    #[test]
    fn test_missing_compliance_defaults() {
        let mut raw = finding();
        raw.as_object_mut().unwrap().remove("Compliance");
        raw.as_object_mut().unwrap().remove("Severity");

        let context = SecurityHubProcessor::new("p1")
            .construct_context(&raw)
            .unwrap();
        assert_eq!(context.content["complianceStatus"], "NOT_AVAILABLE");
        assert_eq!(context.content["severity"], "INFORMATIONAL");
    }

    #[test]
    fn test_finding_without_resources_rejected() {
        let mut raw = finding();
        raw["Resources"] = json!([]);
        assert!(SecurityHubProcessor::new("p1").construct_context(&raw).is_err());
    }

    #[test]
    fn test_findings_unwrapped_from_event() {
        let processor = SecurityHubProcessor::new("p1");
        let event = json!({
            "detail-type": "Security Hub Findings - Imported",
            "detail": {"findings": [finding(), finding()]}
        });

        assert_eq!(processor.findings(event).len(), 2);
        assert_eq!(processor.findings(finding()).len(), 1);
        assert_eq!(processor.findings(json!([finding()])).len(), 1);
    }
}
