//! Composite keys identifying a "logical fact" independent of its content.
//!
//! Two submissions with the same `(provider, target, schema, additional
//! targets)` describe the same fact: the second one is either a no-op or a
//! new revision of the first, never a new record.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

/// Sort and deduplicate additional target ids (set semantics)
pub fn normalize_target_ids(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Build the composite key for an evidence submission
///
/// Each component is length-prefixed before hashing so that no two distinct
/// tuples can produce the same byte stream.
pub fn composite_key(
    provider_id: &str,
    target_id: &str,
    schema_id: &str,
    additional_target_ids: &[String],
) -> String {
    let mut hasher = Sha256::new();

    for part in [provider_id, target_id, schema_id] {
        update_prefixed(&mut hasher, part);
    }

    let additional = normalize_target_ids(additional_target_ids);
    hasher.update((additional.len() as u64).to_be_bytes());
    for id in &additional {
        update_prefixed(&mut hasher, id);
    }

    hex::encode(hasher.finalize())
}

fn update_prefixed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_be_bytes());
    hasher.update(part.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_is_deterministic() {
        let k1 = composite_key("p", "t", "s", &ids(&["a"]));
        let k2 = composite_key("p", "t", "s", &ids(&["a"]));

        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
        assert!(k1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_additional_ids_order_and_duplicates_ignored() {
        let k1 = composite_key("p", "t", "s", &ids(&["arn:1", "arn:2"]));
        let k2 = composite_key("p", "t", "s", &ids(&["arn:2", "arn:1", "arn:2"]));

        assert_eq!(k1, k2);
    }

    #[test]
    fn test_components_are_not_ambiguous() {
        // Same concatenation, different split
        let k1 = composite_key("ab", "c", "s", &[]);
        let k2 = composite_key("a", "bc", "s", &[]);
        assert_ne!(k1, k2);

        let k3 = composite_key("p", "t", "s", &ids(&["x"]));
        let k4 = composite_key("p", "t", "s", &[]);
        assert_ne!(k3, k4);
    }

    #[test]
    fn test_each_component_participates() {
        let base = composite_key("p", "t", "s", &[]);

        assert_ne!(base, composite_key("p2", "t", "s", &[]));
        assert_ne!(base, composite_key("p", "t2", "s", &[]));
        assert_ne!(base, composite_key("p", "t", "s2", &[]));
    }
}
