//! JSON Schemas registered by providers to validate evidence content.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A registered evidence schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceSchema {
    pub provider_id: String,
    pub schema_id: String,

    /// JSON Schema document
    pub content: Value,
    pub created_timestamp: DateTime<Utc>,

    /// Set for ephemeral schemas registered with a TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EvidenceSchema {
    /// Ephemeral schemas are never tracked on the provider
    pub fn is_ephemeral(&self) -> bool {
        self.expires_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Registration request for a schema
#[derive(Debug, Clone)]
pub struct NewSchema {
    pub schema_id: String,
    pub content: Value,

    /// Makes the schema ephemeral (e.g. for test submissions)
    pub ttl: Option<Duration>,
}
