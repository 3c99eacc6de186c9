//! Config rule compliance change events as evidence.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::NewSchema;

use super::{str_at, EvidenceProducer, FindingContext};

pub const DEFAULT_SCHEMA_ID: &str = "config-rule-compliance";

/// Maps `Config Rules Compliance Change` events to evidence
#[derive(Debug, Clone)]
pub struct ConfigEventProcessor {
    provider_id: String,
    schema_id: String,
}

impl ConfigEventProcessor {
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
impl EvidenceProducer for ConfigEventProcessor {
    fn source(&self) -> &'static str {
        "config"
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
                "required": ["configRuleName", "complianceType"],
                "properties": {
                    "configRuleName": {"type": "string"},
                    "complianceType": {
                        "enum": ["COMPLIANT", "NON_COMPLIANT", "NOT_APPLICABLE", "INSUFFICIENT_DATA"]
                    },
                    "previousComplianceType": {"type": "string"},
                    "resourceType": {"type": "string"},
                    "accountId": {"type": "string"},
                    "region": {"type": "string"}
                }
            }),
            ttl: None,
        }
    }

    fn construct_context(&self, event: &Value) -> Result<FindingContext> {
        let Some(resource_id) = str_at(event, "/detail/resourceId") else {
            bail!("Config event has no detail.resourceId");
        };
        let Some(rule) = str_at(event, "/detail/configRuleName") else {
            bail!("Config event for {} has no configRuleName", resource_id);
        };
        let Some(compliance) = str_at(event, "/detail/newEvaluationResult/complianceType") else {
            bail!("Config event for {} has no compliance result", resource_id);
        };

        let mut content = Map::new();
        content.insert("configRuleName".into(), json!(rule));
        content.insert("complianceType".into(), json!(compliance));

        let optional = [
            ("previousComplianceType", "/detail/oldEvaluationResult/complianceType"),
            ("resourceType", "/detail/resourceType"),
            ("accountId", "/detail/awsAccountId"),
            ("region", "/detail/awsRegion"),
        ];
        for (field, pointer) in optional {
            if let Some(value) = str_at(event, pointer) {
                content.insert(field.into(), json!(value));
            }
        }

        // The rule is part of the fact's identity: one record per (resource, rule)
        let additional_target_ids = str_at(event, "/detail/configRuleARN")
            .unwrap_or(rule)
            .to_string();

        Ok(FindingContext {
            target_id: resource_id.to_string(),
            additional_target_ids: vec![additional_target_ids],
            content: Value::Object(content),
        })
    }
}
