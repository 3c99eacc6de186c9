//! Evidence records and the inputs used to create them.
//!
//! An evidence record is immutable once written to the ledger; an update of
//! the same logical fact produces a new ledger revision of the same record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored evidence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Unique identifier, generated on create
    pub evidence_id: String,

    /// Submitting provider
    pub provider_id: String,

    /// Governed resource
    pub target_id: String,

    /// Schema the content was validated against
    pub schema_id: String,

    /// Extra correlation identifiers (e.g. related ARNs)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_target_ids: Vec<String>,

    /// Evidence payload
    pub content: Value,

    /// Digest of the normalized content and correlation fields
    pub content_hash: String,

    /// Identity of the logical fact this record describes
    pub composite_key: String,

    /// Blob store location holding the raw content and attachments
    pub content_location: String,

    /// Set once at creation, never mutated
    pub created_timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Ledger-assigned metadata, populated on write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_details: Option<RevisionDetails>,
}

impl EvidenceRecord {
    /// Ledger revision number, if the record has been committed
    pub fn version(&self) -> Option<u64> {
        self.revision_details.as_ref().map(|r| r.version)
    }

    /// Copy of this record without ledger metadata.
    ///
    /// This is the exact document shape sealed into a ledger revision.
    pub fn without_revision(&self) -> Self {
        Self {
            revision_details: None,
            ..self.clone()
        }
    }
}

/// Reference to a blob-stored attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub object_key: String,

    /// SHA-256 of the attachment bytes ("sha256:<hex>")
    pub hash: String,

    pub bucket_name: String,
}

/// Location of a block in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAddress {
    pub strand_id: String,
    pub sequence_no: u64,
}

/// Ledger metadata for one revision of an evidence record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDetails {
    /// Ledger document holding all revisions of the record
    pub document_id: String,

    /// Revision number within the document (0-based)
    pub version: u64,

    /// Hash of the revision document
    pub revision_hash: String,

    /// Block hash sealing this revision
    pub digest: String,

    pub transaction_id: String,
    pub transaction_time: DateTime<Utc>,
    pub block_address: BlockAddress,
}

/// Attachment bytes submitted alongside evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    pub object_key: String,

    /// Raw attachment bytes (base64 on the wire)
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Request to record a piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvidenceInput {
    pub provider_id: String,
    pub target_id: String,
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_target_ids: Vec<String>,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentInput>,
}

/// Search criteria for listing evidence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,

    /// Inclusive lower bound on created_timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,

    /// Exclusive upper bound on created_timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

impl EvidenceFilter {
    /// Check whether a record satisfies every criterion that is set
    pub fn matches(&self, record: &EvidenceRecord) -> bool {
        if let Some(ref provider_id) = self.provider_id {
            if &record.provider_id != provider_id {
                return false;
            }
        }
        if let Some(ref target_id) = self.target_id {
            if &record.target_id != target_id {
                return false;
            }
        }
        if let Some(ref schema_id) = self.schema_id {
            if &record.schema_id != schema_id {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_timestamp >= before {
                return false;
            }
        }
        true
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
