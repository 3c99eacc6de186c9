//! Evidence service: create, read, list and verify evidence.
//!
//! Composes the content hasher, composite key builder, pagination codec and
//! verifier with the storage collaborators. Writes are idempotent on the
//! composite key: an identical resubmission is a no-op, a changed one becomes
//! a new ledger revision of the existing record.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Attachment, AttachmentInput, CreateEvidenceInput, EvidenceFilter, EvidenceProvider,
    EvidenceRecord, EvidenceSchema, NewProvider, NewSchema, Page,
};
use crate::store::{
    ContentUpload, EvidenceContentRepository, EvidenceRepository, LedgerHelper,
    ProviderRepository, SchemaRepository,
};

use super::composite_key::{composite_key, normalize_target_ids};
use super::error::{AppError, Result};
use super::hasher::{compute_hash, content_hash, CorrelationFields};
use super::pagination::{self, PaginationSettings};
use super::validator::SchemaValidator;
use super::verifier::{EvidenceVerifier, VerificationResult};

/// Collaborators the service is built from
pub struct ServiceDeps {
    pub providers: Arc<dyn ProviderRepository>,
    pub schemas: Arc<dyn SchemaRepository>,
    pub evidence: Arc<dyn EvidenceRepository>,
    pub content: Arc<dyn EvidenceContentRepository>,
    pub ledger: Arc<dyn LedgerHelper>,
}

/// Top-level evidence service
pub struct EvidenceService {
    providers: Arc<dyn ProviderRepository>,
    schemas: Arc<dyn SchemaRepository>,
    evidence: Arc<dyn EvidenceRepository>,
    content: Arc<dyn EvidenceContentRepository>,
    verifier: EvidenceVerifier,
    pagination: PaginationSettings,
}

impl EvidenceService {
    pub fn new(deps: ServiceDeps, pagination: PaginationSettings) -> Self {
        let verifier = EvidenceVerifier::new(
            Arc::clone(&deps.evidence),
            Arc::clone(&deps.content),
            deps.ledger,
        );

        Self {
            providers: deps.providers,
            schemas: deps.schemas,
            evidence: deps.evidence,
            content: deps.content,
            verifier,
            pagination,
        }
    }

    // ------------------------------------------------------------------
    // Evidence
    // ------------------------------------------------------------------

    /// Record evidence on behalf of a provider.
    ///
    /// Returns the existing record unchanged when the same fact with the same
    /// content was already recorded.
    #[instrument(
        skip(self, api_key, input),
        fields(provider_id = %input.provider_id, schema_id = %input.schema_id, target_id = %input.target_id)
    )]
    pub async fn create_evidence(
        &self,
        api_key: &str,
        input: CreateEvidenceInput,
    ) -> Result<EvidenceRecord> {
        let provider = self
            .providers
            .get_evidence_provider(&input.provider_id)
            .await?
            .ok_or_else(|| AppError::ProviderNotFound(input.provider_id.clone()))?;

        if !provider.enabled {
            return Err(AppError::ProviderDisabled(provider.provider_id));
        }
        if hash_api_key(api_key) != provider.api_key_hash {
            return Err(AppError::Forbidden(format!(
                "API key does not match provider {}",
                provider.provider_id
            )));
        }

        let schema = self
            .schemas
            .get_schema(&input.provider_id, &input.schema_id)
            .await?
            .ok_or_else(|| AppError::SchemaNotFound {
                provider_id: input.provider_id.clone(),
                schema_id: input.schema_id.clone(),
            })?;

        SchemaValidator::compile(&schema.content)?.validate(&input.content)?;

        let attachments = self.describe_attachments(&input.attachments)?;
        let additional_target_ids = normalize_target_ids(&input.additional_target_ids);
        let key = composite_key(
            &input.provider_id,
            &input.target_id,
            &input.schema_id,
            &additional_target_ids,
        );
        let hash = content_hash(
            &input.content,
            &CorrelationFields {
                provider_id: &input.provider_id,
                target_id: &input.target_id,
                schema_id: &input.schema_id,
                additional_target_ids: &additional_target_ids,
                attachments: &attachments,
            },
        );

        let existing = self.evidence.get_evidence_by_composite_key(&key).await?;

        let (evidence_id, created_timestamp, is_update) = match existing {
            Some(record) if record.content_hash == hash => {
                info!(evidence_id = %record.evidence_id, "Identical evidence already recorded");
                return Ok(record);
            }
            Some(record) => {
                debug!(evidence_id = %record.evidence_id, "Content changed, recording new revision");
                (record.evidence_id, record.created_timestamp, true)
            }
            None => (Uuid::new_v4().to_string(), Utc::now(), false),
        };

        let write_id = Uuid::new_v4().simple().to_string();
        let location = self
            .content
            .put_content(&ContentUpload {
                evidence_id: &evidence_id,
                content_hash: &hash,
                write_id: &write_id,
                content: &input.content,
                attachments: &input.attachments,
            })
            .await?;

        let record = EvidenceRecord {
            evidence_id,
            provider_id: input.provider_id,
            target_id: input.target_id,
            schema_id: input.schema_id,
            additional_target_ids,
            content: input.content,
            content_hash: hash,
            composite_key: key,
            content_location: location.clone(),
            created_timestamp,
            attachments,
            revision_details: None,
        };

        let written = if is_update {
            self.evidence.update_evidence(record).await
        } else {
            self.evidence.create_evidence(record).await
        };

        match written {
            Ok(record) => {
                info!(
                    evidence_id = %record.evidence_id,
                    version = ?record.version(),
                    updated = is_update,
                    "Evidence recorded"
                );
                Ok(record)
            }
            Err(e) => {
                self.discard_content(&location).await;
                Err(e)
            }
        }
    }

    /// Hash and name attachments, rejecting empty or ill-named ones
    fn describe_attachments(&self, inputs: &[AttachmentInput]) -> Result<Vec<Attachment>> {
        let mut seen = HashSet::new();
        let mut attachments = Vec::with_capacity(inputs.len());

        for input in inputs {
            validate_object_key(&input.object_key)?;
            if !seen.insert(input.object_key.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate attachment object key: {}",
                    input.object_key
                )));
            }
            if input.data.is_empty() {
                return Err(AppError::Validation(format!(
                    "attachment {} is empty",
                    input.object_key
                )));
            }

            attachments.push(Attachment {
                object_key: input.object_key.clone(),
                hash: compute_hash(&input.data),
                bucket_name: self.content.bucket_name().to_string(),
            });
        }

        Ok(attachments)
    }

    /// Best-effort removal of blobs written for a failed write
    async fn discard_content(&self, location: &str) {
        match self.content.delete_content(location).await {
            Ok(()) => warn!(location, "Evidence write failed, removed stored content"),
            Err(e) => error!(location, error = %e, "Failed to remove orphaned content"),
        }
    }

    /// Plain lookup of the live record or of one revision
    pub async fn get_evidence_by_id(
        &self,
        evidence_id: &str,
        revision: Option<u64>,
    ) -> Result<Option<EvidenceRecord>> {
        match revision {
            None => self.evidence.get_evidence_by_id(evidence_id).await,
            Some(version) => {
                self.evidence
                    .get_evidence_revision(evidence_id, version)
                    .await
            }
        }
    }

    pub async fn get_evidence_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<EvidenceRecord>> {
        self.evidence.get_evidence_by_hash_value(content_hash).await
    }

    /// Search evidence, one page at a time
    #[instrument(skip(self, filter))]
    pub async fn get_evidences(&self, filter: &EvidenceFilter) -> Result<Page<EvidenceRecord>> {
        let (start_index, page_size) = self
            .pagination
            .resolve(filter.page_size, filter.next_token.as_deref())?;

        let result = self
            .evidence
            .get_evidences(filter, page_size, start_index)
            .await?;

        Ok(Page {
            items: result.items,
            next_token: pagination::next_token(start_index, page_size, result.total),
        })
    }

    /// Revision history of a record, oldest first
    #[instrument(skip(self, next_token))]
    pub async fn get_evidence_revisions(
        &self,
        evidence_id: &str,
        page_size: Option<usize>,
        next_token: Option<&str>,
    ) -> Result<Page<EvidenceRecord>> {
        let (start_index, page_size) = self.pagination.resolve(page_size, next_token)?;

        if self.evidence.get_evidence_by_id(evidence_id).await?.is_none() {
            return Err(AppError::EvidenceNotFound(evidence_id.to_string()));
        }

        let result = self
            .evidence
            .get_evidence_revisions(evidence_id, page_size, start_index)
            .await?;

        Ok(Page {
            items: result.items,
            next_token: pagination::next_token(start_index, page_size, result.total),
        })
    }

    pub async fn verify_evidence(
        &self,
        evidence_id: &str,
        revision: Option<u64>,
    ) -> Result<VerificationResult> {
        self.verifier.verify_evidence(evidence_id, revision).await
    }

    // ------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------

    /// Onboard a provider, returning it together with its API key.
    ///
    /// The key is only returned here; the provider stores its hash.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_evidence_provider(
        &self,
        request: NewProvider,
    ) -> Result<(EvidenceProvider, String)> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("provider name cannot be empty".to_string()));
        }

        let provider_id = request
            .provider_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !self.providers.is_valid_provider(&provider_id, name).await? {
            return Err(AppError::Validation(format!(
                "provider id {} or name {} is already registered",
                provider_id, name
            )));
        }

        let api_key = generate_api_key();
        let provider = EvidenceProvider {
            provider_id,
            name: name.to_string(),
            description: request.description,
            enabled: true,
            api_key_hash: hash_api_key(&api_key),
            schema_ids: Vec::new(),
            created_timestamp: Utc::now(),
        };

        self.providers.create_evidence_provider(&provider).await?;
        info!(provider_id = %provider.provider_id, "Evidence provider created");

        Ok((provider, api_key))
    }

    pub async fn get_evidence_provider(&self, provider_id: &str) -> Result<Option<EvidenceProvider>> {
        self.providers.get_evidence_provider(provider_id).await
    }

    #[instrument(skip(self))]
    pub async fn toggle_provider_status(
        &self,
        provider_id: &str,
        enabled: bool,
    ) -> Result<EvidenceProvider> {
        let provider = self
            .providers
            .toggle_provider_status(provider_id, enabled)
            .await?
            .ok_or_else(|| AppError::ProviderNotFound(provider_id.to_string()))?;

        info!(provider_id, enabled, "Provider status changed");
        Ok(provider)
    }

    pub async fn list_evidence_providers(
        &self,
        page_size: Option<usize>,
        next_token: Option<&str>,
    ) -> Result<Page<EvidenceProvider>> {
        let (start_index, page_size) = self.pagination.resolve(page_size, next_token)?;

        let result = self
            .providers
            .list_evidence_providers(page_size, start_index)
            .await?;

        Ok(Page {
            items: result.items,
            next_token: pagination::next_token(start_index, page_size, result.total),
        })
    }

    // ------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------

    /// Register a JSON Schema for a provider.
    ///
    /// Schemas registered with a TTL are ephemeral and are not added to the
    /// provider's schema list.
    #[instrument(skip(self, request), fields(schema_id = %request.schema_id))]
    pub async fn create_schema(
        &self,
        provider_id: &str,
        request: NewSchema,
    ) -> Result<EvidenceSchema> {
        if self.providers.get_evidence_provider(provider_id).await?.is_none() {
            return Err(AppError::ProviderNotFound(provider_id.to_string()));
        }
        if request.schema_id.trim().is_empty() {
            return Err(AppError::Validation("schema id cannot be empty".to_string()));
        }

        SchemaValidator::compile(&request.content)?;

        if self
            .schemas
            .get_schema(provider_id, &request.schema_id)
            .await?
            .is_some()
        {
            return Err(AppError::Validation(format!(
                "schema {} already exists for provider {}",
                request.schema_id, provider_id
            )));
        }

        let now = Utc::now();
        let expires_at = match request.ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| AppError::Validation(format!("invalid TTL: {}", e)))?;
                Some(now + ttl)
            }
            None => None,
        };

        let schema = EvidenceSchema {
            provider_id: provider_id.to_string(),
            schema_id: request.schema_id,
            content: request.content,
            created_timestamp: now,
            expires_at,
        };

        self.schemas.create_schema(&schema).await?;

        if !schema.is_ephemeral() {
            self.providers
                .add_schema_id(provider_id, &schema.schema_id)
                .await?;
        }

        info!(provider_id, ephemeral = schema.is_ephemeral(), "Schema registered");
        Ok(schema)
    }

    pub async fn get_schema(
        &self,
        provider_id: &str,
        schema_id: &str,
    ) -> Result<Option<EvidenceSchema>> {
        self.schemas.get_schema(provider_id, schema_id).await
    }
}

/// SHA-256 hex of an API key, as stored on the provider
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_api_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Object keys become file names in the blob store
fn validate_object_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
    {
        return Err(AppError::Validation(format!(
            "invalid attachment object key: {:?}",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_hash_is_stable_hex() {
        let h1 = hash_api_key("secret");
        let h2 = hash_api_key("secret");

        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_api_key("other"));
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let k1 = generate_api_key();
        let k2 = generate_api_key();

        assert_eq!(k1.len(), 64);
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_object_key_validation() {
        assert!(validate_object_key("report.pdf").is_ok());
        assert!(validate_object_key("finding..json").is_ok());

        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("..").is_err());
        assert!(validate_object_key("../etc/passwd").is_err());
        assert!(validate_object_key("a/b").is_err());
        assert!(validate_object_key("a\\b").is_err());
    }
}
