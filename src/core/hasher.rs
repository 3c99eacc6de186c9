//! Content hashing for evidence deduplication and integrity checks.
//!
//! The digest covers the evidence content and every correlation field that
//! binds it to an identity. Content is normalized before hashing so that
//! semantically identical JSON (e.g. differing key order) hashes identically.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::domain::Attachment;

use super::composite_key::normalize_target_ids;

/// Fields bound into the content hash alongside the payload
#[derive(Debug, Clone, Copy)]
pub struct CorrelationFields<'a> {
    pub provider_id: &'a str,
    pub target_id: &'a str,
    pub schema_id: &'a str,
    pub additional_target_ids: &'a [String],
    pub attachments: &'a [Attachment],
}

/// Compute SHA256 of raw bytes, returning hex string with prefix
///
/// # Returns
/// * String in format "sha256:abc123..."
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Hash evidence content together with its correlation fields.
///
/// Additional target ids are treated as a set and attachments are bound by
/// `(object_key, hash)` in key order, so neither submission order affects the
/// digest.
pub fn content_hash(content: &Value, fields: &CorrelationFields<'_>) -> String {
    let mut attachments: Vec<(&str, &str)> = fields
        .attachments
        .iter()
        .map(|a| (a.object_key.as_str(), a.hash.as_str()))
        .collect();
    attachments.sort();

    let envelope = json!({
        "providerId": fields.provider_id,
        "targetId": fields.target_id,
        "schemaId": fields.schema_id,
        "additionalTargetIds": normalize_target_ids(fields.additional_target_ids),
        "attachments": attachments
            .iter()
            .map(|(key, hash)| json!({"objectKey": key, "hash": hash}))
            .collect::<Vec<_>>(),
        "content": content,
    });

    compute_hash(canonical_json(&envelope).as_bytes())
}

/// Serialize JSON with object keys sorted at every level and no whitespace
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
