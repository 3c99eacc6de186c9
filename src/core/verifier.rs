//! Evidence integrity verification against the ledger and blob store.
//!
//! A record is `Verified` only when three checks pass in order:
//! 1. the ledger accepts the revision proof
//! 2. the ledger accepts the block proof
//! 3. the ledger source content matches the blob content and stored hashes
//!
//! Every check fails closed: an error or `false` short-circuits to
//! `Unverified`. A failed verification is a normal result, not an error.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Attachment, EvidenceRecord, RevisionDetails};
use crate::store::{
    BlockProof, EvidenceContentRepository, EvidenceRepository, LedgerHelper, RevisionProof,
};

use super::error::{AppError, Result};
use super::hasher::{canonical_json, compute_hash, content_hash, CorrelationFields};

/// Verification verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Verified,
    Unverified,
}

/// The check that caused an `Unverified` verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationCheck {
    /// Record has no ledger metadata to prove
    MissingRevisionDetails,
    RevisionProof,
    BlockProof,
    ContentMatch,
}

/// Outcome of verifying one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub evidence_id: String,
    pub status: VerificationStatus,

    /// The verified payload, only populated on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_check: Option<VerificationCheck>,
}

impl VerificationResult {
    fn verified(record: EvidenceRecord) -> Self {
        Self {
            evidence_id: record.evidence_id.clone(),
            status: VerificationStatus::Verified,
            evidence: Some(record),
            failed_check: None,
        }
    }

    fn unverified(evidence_id: &str, check: VerificationCheck) -> Self {
        Self {
            evidence_id: evidence_id.to_string(),
            status: VerificationStatus::Unverified,
            evidence: None,
            failed_check: Some(check),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Runs the three-step proof pipeline
pub struct EvidenceVerifier {
    evidence: Arc<dyn EvidenceRepository>,
    content: Arc<dyn EvidenceContentRepository>,
    ledger: Arc<dyn LedgerHelper>,
}

impl EvidenceVerifier {
    pub fn new(
        evidence: Arc<dyn EvidenceRepository>,
        content: Arc<dyn EvidenceContentRepository>,
        ledger: Arc<dyn LedgerHelper>,
    ) -> Self {
        Self {
            evidence,
            content,
            ledger,
        }
    }

    /// Verify the live record, or a historical revision when `revision` is set.
    ///
    /// Fails with [`AppError::EvidenceNotFound`] before any check runs if the
    /// record (or revision) does not exist.
    #[instrument(skip(self))]
    pub async fn verify_evidence(
        &self,
        evidence_id: &str,
        revision: Option<u64>,
    ) -> Result<VerificationResult> {
        let record = match revision {
            None => self.evidence.get_evidence_by_id(evidence_id).await?,
            Some(version) => {
                self.evidence
                    .get_evidence_revision(evidence_id, version)
                    .await?
            }
        };

        let record = record.ok_or_else(|| match revision {
            None => AppError::EvidenceNotFound(evidence_id.to_string()),
            Some(version) => {
                AppError::EvidenceNotFound(format!("{} (revision {})", evidence_id, version))
            }
        })?;

        let result = self.verify_record(record, revision.is_some()).await;
        info!(
            evidence_id,
            status = ?result.status,
            failed_check = ?result.failed_check,
            "Verification finished"
        );
        Ok(result)
    }

    async fn verify_record(&self, record: EvidenceRecord, historical: bool) -> VerificationResult {
        let Some(details) = record.revision_details.clone() else {
            return VerificationResult::unverified(
                &record.evidence_id,
                VerificationCheck::MissingRevisionDetails,
            );
        };

        let revision_ok = self
            .ledger
            .verify_revision(&RevisionProof::from(&details))
            .await;
        if !passed(&record.evidence_id, VerificationCheck::RevisionProof, revision_ok) {
            return VerificationResult::unverified(
                &record.evidence_id,
                VerificationCheck::RevisionProof,
            );
        }

        let block_ok = self.ledger.verify_block(&BlockProof::from(&details)).await;
        if !passed(&record.evidence_id, VerificationCheck::BlockProof, block_ok) {
            return VerificationResult::unverified(&record.evidence_id, VerificationCheck::BlockProof);
        }

        let content_ok = self.content_matches(&record, &details, historical).await;
        if !passed(&record.evidence_id, VerificationCheck::ContentMatch, content_ok) {
            return VerificationResult::unverified(
                &record.evidence_id,
                VerificationCheck::ContentMatch,
            );
        }

        VerificationResult::verified(record)
    }

    /// Compare the ledger's copy of the record with the blob store
    async fn content_matches(
        &self,
        record: &EvidenceRecord,
        details: &RevisionDetails,
        historical: bool,
    ) -> Result<bool> {
        let source = async {
            if historical {
                self.evidence
                    .get_evidence_by_document_id(&details.document_id, details.version)
                    .await
            } else {
                self.evidence
                    .get_evidence_by_id_from_source(&record.evidence_id)
                    .await
            }
        };
        let blobs = self.load_blobs(&record.content_location, &record.attachments);

        let (source, blobs) = tokio::join!(source, blobs);

        let Some(source) = source? else {
            debug!(evidence_id = %record.evidence_id, "No ledger source for record");
            return Ok(false);
        };
        let Some((blob_content, attachment_blobs)) = blobs? else {
            debug!(evidence_id = %record.evidence_id, "Blob content missing");
            return Ok(false);
        };

        if source.content_hash != record.content_hash {
            return Ok(false);
        }

        if canonical_json(&blob_content) != canonical_json(&source.content) {
            return Ok(false);
        }

        // Attachment bytes must still hash to what the ledger recorded
        let mut recomputed = Vec::with_capacity(source.attachments.len());
        for attachment in &source.attachments {
            let Some(bytes) = attachment_blobs.get(&attachment.object_key) else {
                return Ok(false);
            };
            let hash = compute_hash(bytes);
            if hash != attachment.hash {
                return Ok(false);
            }
            recomputed.push(Attachment {
                hash,
                ..attachment.clone()
            });
        }

        let fields = CorrelationFields {
            provider_id: &source.provider_id,
            target_id: &source.target_id,
            schema_id: &source.schema_id,
            additional_target_ids: &source.additional_target_ids,
            attachments: &recomputed,
        };

        Ok(content_hash(&blob_content, &fields) == source.content_hash)
    }

    /// Fetch the content blob and every attachment blob.
    ///
    /// Returns `None` if any blob is missing.
    async fn load_blobs(
        &self,
        location: &str,
        attachments: &[Attachment],
    ) -> Result<Option<(Value, HashMap<String, Vec<u8>>)>> {
        let Some(raw) = self.content.get_evidence_content(location, None).await? else {
            return Ok(None);
        };
        let content: Value = match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(location, error = %e, "Stored content is not valid JSON");
                return Ok(None);
            }
        };

        let mut blobs = HashMap::new();
        for attachment in attachments {
            match self
                .content
                .get_evidence_content(location, Some(&attachment.object_key))
                .await?
            {
                Some(bytes) => {
                    blobs.insert(attachment.object_key.clone(), bytes);
                }
                None => return Ok(None),
            }
        }

        Ok(Some((content, blobs)))
    }
}

/// Fail-closed evaluation of one check
fn passed(evidence_id: &str, check: VerificationCheck, outcome: Result<bool>) -> bool {
    match outcome {
        Ok(true) => true,
        Ok(false) => {
            warn!(evidence_id, ?check, "Verification check failed");
            false
        }
        Err(e) => {
            warn!(evidence_id, ?check, error = %e, "Verification check errored");
            false
        }
    }
}
