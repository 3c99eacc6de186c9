//! Storage collaborators of the evidence service.
//!
//! The service core only sees these traits. Local backends are provided for
//! each of them:
//! - `SqliteRegistry`: providers and schemas
//! - `LocalLedger`: evidence revisions and ledger proofs
//! - `FsContentStore`: raw content and attachment blobs

pub mod content;
pub mod ledger;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::Result;
use crate::domain::{
    AttachmentInput, BlockAddress, EvidenceFilter, EvidenceProvider, EvidenceRecord,
    EvidenceSchema, PagedResult, RevisionDetails,
};

pub use content::FsContentStore;
pub use ledger::LocalLedger;
pub use registry::SqliteRegistry;

/// Provider persistence
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get_evidence_provider(&self, provider_id: &str) -> Result<Option<EvidenceProvider>>;

    /// True when neither the id nor the name is already registered
    async fn is_valid_provider(&self, provider_id: &str, name: &str) -> Result<bool>;

    async fn create_evidence_provider(&self, provider: &EvidenceProvider) -> Result<()>;

    /// Returns the updated provider, or `None` if it does not exist
    async fn toggle_provider_status(
        &self,
        provider_id: &str,
        enabled: bool,
    ) -> Result<Option<EvidenceProvider>>;

    async fn add_schema_id(&self, provider_id: &str, schema_id: &str) -> Result<()>;

    async fn list_evidence_providers(
        &self,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceProvider>>;
}

/// Schema persistence
#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Expired ephemeral schemas read as absent
    async fn get_schema(&self, provider_id: &str, schema_id: &str)
        -> Result<Option<EvidenceSchema>>;

    async fn create_schema(&self, schema: &EvidenceSchema) -> Result<()>;
}

/// Evidence persistence backed by an append-only ledger
#[async_trait]
pub trait EvidenceRepository: Send + Sync {
    /// Insert a new record; fails if its composite key is already taken.
    ///
    /// Returns the record with ledger revision details populated.
    async fn create_evidence(&self, record: EvidenceRecord) -> Result<EvidenceRecord>;

    /// Append a new revision of an existing record
    async fn update_evidence(&self, record: EvidenceRecord) -> Result<EvidenceRecord>;

    async fn get_evidence_by_id(&self, evidence_id: &str) -> Result<Option<EvidenceRecord>>;

    async fn get_evidence_by_hash_value(&self, content_hash: &str)
        -> Result<Option<EvidenceRecord>>;

    async fn get_evidence_by_composite_key(
        &self,
        composite_key: &str,
    ) -> Result<Option<EvidenceRecord>>;

    async fn get_evidence_revision(
        &self,
        evidence_id: &str,
        version: u64,
    ) -> Result<Option<EvidenceRecord>>;

    /// Revisions of one record, oldest first
    async fn get_evidence_revisions(
        &self,
        evidence_id: &str,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceRecord>>;

    async fn get_evidences(
        &self,
        filter: &EvidenceFilter,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceRecord>>;

    /// Read the latest revision straight from the ledger, bypassing any index
    async fn get_evidence_by_id_from_source(
        &self,
        evidence_id: &str,
    ) -> Result<Option<EvidenceRecord>>;

    async fn get_evidence_by_document_id(
        &self,
        document_id: &str,
        version: u64,
    ) -> Result<Option<EvidenceRecord>>;
}

/// What gets written to the blob store for one revision
#[derive(Debug, Clone, Copy)]
pub struct ContentUpload<'a> {
    pub evidence_id: &'a str,
    pub content_hash: &'a str,

    /// Unique per write, so no two writes share a location
    pub write_id: &'a str,
    pub content: &'a Value,
    pub attachments: &'a [AttachmentInput],
}

/// Blob storage for raw content and attachments
#[async_trait]
pub trait EvidenceContentRepository: Send + Sync {
    /// Bucket (store) name recorded on attachments
    fn bucket_name(&self) -> &str;

    /// Write content and attachments, returning their location
    async fn put_content(&self, upload: &ContentUpload<'_>) -> Result<String>;

    /// Raw bytes of the content (`attachment_key = None`) or of one attachment
    async fn get_evidence_content(
        &self,
        location: &str,
        attachment_key: Option<&str>,
    ) -> Result<Option<Vec<u8>>>;

    async fn delete_content(&self, location: &str) -> Result<()>;
}

/// Proof that a revision hash is sealed in a ledger block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionProof {
    pub document_id: String,
    pub version: u64,
    pub revision_hash: String,
    pub block_address: BlockAddress,
}

impl From<&RevisionDetails> for RevisionProof {
    fn from(details: &RevisionDetails) -> Self {
        Self {
            document_id: details.document_id.clone(),
            version: details.version,
            revision_hash: details.revision_hash.clone(),
            block_address: details.block_address.clone(),
        }
    }
}

/// Proof that a block with the given digest is part of the ledger chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProof {
    pub block_address: BlockAddress,
    pub digest: String,
}

impl From<&RevisionDetails> for BlockProof {
    fn from(details: &RevisionDetails) -> Self {
        Self {
            block_address: details.block_address.clone(),
            digest: details.digest.clone(),
        }
    }
}

/// Ledger proof checks
#[async_trait]
pub trait LedgerHelper: Send + Sync {
    async fn verify_revision(&self, proof: &RevisionProof) -> Result<bool>;

    async fn verify_block(&self, proof: &BlockProof) -> Result<bool>;
}
