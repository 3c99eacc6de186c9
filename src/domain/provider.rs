//! Evidence providers: the authenticated submitters of evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered evidence provider.
///
/// Providers are never hard-deleted; `enabled` is toggled administratively
/// and `schema_ids` grows as (non-ephemeral) schemas are registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceProvider {
    pub provider_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,

    /// SHA-256 hex of the provider's API key
    pub api_key_hash: String,

    #[serde(default)]
    pub schema_ids: Vec<String>,
    pub created_timestamp: DateTime<Utc>,
}

/// Onboarding request for a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    /// Generated when absent
    #[serde(default)]
    pub provider_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}
