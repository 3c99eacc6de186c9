//! Shared fakes for service-level tests.
//!
//! Every fake records how often it was called so tests can assert on the
//! persistence calls the service makes, not just on its results.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use ags_evidence_store::core::{AppError, EvidenceService, PaginationSettings, Result, ServiceDeps};
use ags_evidence_store::domain::{
    CreateEvidenceInput, EvidenceFilter, EvidenceProvider, EvidenceRecord, EvidenceSchema,
    NewProvider, NewSchema, PagedResult,
};
use ags_evidence_store::store::{
    BlockProof, ContentUpload, EvidenceContentRepository, EvidenceRepository, LedgerHelper,
    LocalLedger, ProviderRepository, RevisionProof, SchemaRepository,
};

pub const PROVIDER_ID: &str = "scanner";
pub const SCHEMA_ID: &str = "succeed";

/// Schema requiring a boolean `succeed`
pub fn succeed_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {"succeed": {"type": "boolean"}},
        "required": ["succeed"]
    })
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRegistry {
    providers: Mutex<HashMap<String, EvidenceProvider>>,
    schemas: Mutex<HashMap<(String, String), EvidenceSchema>>,
    pub add_schema_id_calls: AtomicUsize,
}

#[async_trait]
impl ProviderRepository for FakeRegistry {
    async fn get_evidence_provider(&self, provider_id: &str) -> Result<Option<EvidenceProvider>> {
        Ok(self.providers.lock().unwrap().get(provider_id).cloned())
    }

    async fn is_valid_provider(&self, provider_id: &str, name: &str) -> Result<bool> {
        let providers = self.providers.lock().unwrap();
        Ok(!providers
            .values()
            .any(|p| p.provider_id == provider_id || p.name == name))
    }

    async fn create_evidence_provider(&self, provider: &EvidenceProvider) -> Result<()> {
        self.providers
            .lock()
            .unwrap()
            .insert(provider.provider_id.clone(), provider.clone());
        Ok(())
    }

    async fn toggle_provider_status(
        &self,
        provider_id: &str,
        enabled: bool,
    ) -> Result<Option<EvidenceProvider>> {
        let mut providers = self.providers.lock().unwrap();
        Ok(providers.get_mut(provider_id).map(|p| {
            p.enabled = enabled;
            p.clone()
        }))
    }

    async fn add_schema_id(&self, provider_id: &str, schema_id: &str) -> Result<()> {
        self.add_schema_id_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(p) = self.providers.lock().unwrap().get_mut(provider_id) {
            if !p.schema_ids.iter().any(|s| s == schema_id) {
                p.schema_ids.push(schema_id.to_string());
            }
        }
        Ok(())
    }

    async fn list_evidence_providers(
        &self,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceProvider>> {
        let mut all: Vec<_> = self.providers.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        Ok(PagedResult::from_window(all, start_index, page_size))
    }
}

#[async_trait]
impl SchemaRepository for FakeRegistry {
    async fn get_schema(
        &self,
        provider_id: &str,
        schema_id: &str,
    ) -> Result<Option<EvidenceSchema>> {
        Ok(self
            .schemas
            .lock()
            .unwrap()
            .get(&(provider_id.to_string(), schema_id.to_string()))
            .cloned())
    }

    async fn create_schema(&self, schema: &EvidenceSchema) -> Result<()> {
        self.schemas.lock().unwrap().insert(
            (schema.provider_id.clone(), schema.schema_id.clone()),
            schema.clone(),
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Evidence repository
// ----------------------------------------------------------------------------

/// Real in-memory ledger with call counters and write-failure injection
pub struct RecordingEvidence {
    pub inner: LocalLedger,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl Default for RecordingEvidence {
    fn default() -> Self {
        Self {
            inner: LocalLedger::in_memory(),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl RecordingEvidence {
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Transient("ledger throttled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EvidenceRepository for RecordingEvidence {
    async fn create_evidence(&self, record: EvidenceRecord) -> Result<EvidenceRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.create_evidence(record).await
    }

    async fn update_evidence(&self, record: EvidenceRecord) -> Result<EvidenceRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.update_evidence(record).await
    }

    async fn get_evidence_by_id(&self, evidence_id: &str) -> Result<Option<EvidenceRecord>> {
        self.inner.get_evidence_by_id(evidence_id).await
    }

    async fn get_evidence_by_hash_value(
        &self,
        content_hash: &str,
    ) -> Result<Option<EvidenceRecord>> {
        self.inner.get_evidence_by_hash_value(content_hash).await
    }

    async fn get_evidence_by_composite_key(
        &self,
        composite_key: &str,
    ) -> Result<Option<EvidenceRecord>> {
        self.inner.get_evidence_by_composite_key(composite_key).await
    }

    async fn get_evidence_revision(
        &self,
        evidence_id: &str,
        version: u64,
    ) -> Result<Option<EvidenceRecord>> {
        self.inner.get_evidence_revision(evidence_id, version).await
    }

    async fn get_evidence_revisions(
        &self,
        evidence_id: &str,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceRecord>> {
        self.inner
            .get_evidence_revisions(evidence_id, page_size, start_index)
            .await
    }

    async fn get_evidences(
        &self,
        filter: &EvidenceFilter,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceRecord>> {
        self.inner.get_evidences(filter, page_size, start_index).await
    }

    async fn get_evidence_by_id_from_source(
        &self,
        evidence_id: &str,
    ) -> Result<Option<EvidenceRecord>> {
        self.inner.get_evidence_by_id_from_source(evidence_id).await
    }

    async fn get_evidence_by_document_id(
        &self,
        document_id: &str,
        version: u64,
    ) -> Result<Option<EvidenceRecord>> {
        self.inner
            .get_evidence_by_document_id(document_id, version)
            .await
    }
}

// ----------------------------------------------------------------------------
// Content store
// ----------------------------------------------------------------------------

/// Blob store keyed by (location, attachment key)
#[derive(Default)]
pub struct RecordingContent {
    blobs: Mutex<HashMap<(String, Option<String>), Vec<u8>>>,
    pub put_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl RecordingContent {
    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    /// Overwrite one stored blob
    pub fn tamper(&self, location: &str, attachment_key: Option<&str>, bytes: &[u8]) {
        self.blobs.lock().unwrap().insert(
            (location.to_string(), attachment_key.map(str::to_string)),
            bytes.to_vec(),
        );
    }

    pub fn remove(&self, location: &str, attachment_key: Option<&str>) {
        self.blobs
            .lock()
            .unwrap()
            .remove(&(location.to_string(), attachment_key.map(str::to_string)));
    }
}

#[async_trait]
impl EvidenceContentRepository for RecordingContent {
    fn bucket_name(&self) -> &str {
        "test-bucket"
    }

    async fn put_content(&self, upload: &ContentUpload<'_>) -> Result<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let location = format!(
            "{}/{}/{}",
            upload.evidence_id, upload.content_hash, upload.write_id
        );

        let mut blobs = self.blobs.lock().unwrap();
        blobs.insert(
            (location.clone(), None),
            serde_json::to_vec(upload.content)?,
        );
        for attachment in upload.attachments {
            blobs.insert(
                (location.clone(), Some(attachment.object_key.clone())),
                attachment.data.clone(),
            );
        }
        Ok(location)
    }

    async fn get_evidence_content(
        &self,
        location: &str,
        attachment_key: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .get(&(location.to_string(), attachment_key.map(str::to_string)))
            .cloned())
    }

    async fn delete_content(&self, location: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .retain(|(loc, _), _| loc != location);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Ledger proofs
// ----------------------------------------------------------------------------

/// Ledger helper answering with fixed verdicts
pub struct FixedLedger {
    pub revision_ok: bool,
    pub block_ok: bool,
}

#[async_trait]
impl LedgerHelper for FixedLedger {
    async fn verify_revision(&self, _proof: &RevisionProof) -> Result<bool> {
        Ok(self.revision_ok)
    }

    async fn verify_block(&self, _proof: &BlockProof) -> Result<bool> {
        Ok(self.block_ok)
    }
}

/// Ledger helper whose proof checks always error
pub struct FailingLedger;

#[async_trait]
impl LedgerHelper for FailingLedger {
    async fn verify_revision(&self, _proof: &RevisionProof) -> Result<bool> {
        Err(AppError::Transient("ledger unavailable".to_string()))
    }

    async fn verify_block(&self, _proof: &BlockProof) -> Result<bool> {
        Err(AppError::Transient("ledger unavailable".to_string()))
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

/// A service over fakes, with one provider and one schema registered
pub struct Harness {
    pub service: EvidenceService,
    pub registry: Arc<FakeRegistry>,
    pub evidence: Arc<RecordingEvidence>,
    pub content: Arc<RecordingContent>,
    pub api_key: String,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_ledger(Arc::new(FixedLedger {
            revision_ok: true,
            block_ok: true,
        }))
        .await
    }

    pub async fn with_ledger(ledger: Arc<dyn LedgerHelper>) -> Self {
        let registry = Arc::new(FakeRegistry::default());
        let evidence = Arc::new(RecordingEvidence::default());
        let content = Arc::new(RecordingContent::default());

        let service = EvidenceService::new(
            ServiceDeps {
                providers: registry.clone(),
                schemas: registry.clone(),
                evidence: evidence.clone(),
                content: content.clone(),
                ledger,
            },
            PaginationSettings::default(),
        );

        let (_, api_key) = service
            .create_evidence_provider(NewProvider {
                provider_id: Some(PROVIDER_ID.to_string()),
                name: "Scanner".to_string(),
                description: None,
            })
            .await
            .unwrap();

        service
            .create_schema(
                PROVIDER_ID,
                NewSchema {
                    schema_id: SCHEMA_ID.to_string(),
                    content: succeed_schema(),
                    ttl: None,
                },
            )
            .await
            .unwrap();

        Self {
            service,
            registry,
            evidence,
            content,
            api_key,
        }
    }

    pub fn input(&self, target_id: &str, content: Value) -> CreateEvidenceInput {
        CreateEvidenceInput {
            provider_id: PROVIDER_ID.to_string(),
            target_id: target_id.to_string(),
            schema_id: SCHEMA_ID.to_string(),
            additional_target_ids: Vec::new(),
            content,
            attachments: Vec::new(),
        }
    }

    pub async fn create(&self, input: CreateEvidenceInput) -> Result<EvidenceRecord> {
        self.service.create_evidence(&self.api_key, input).await
    }
}
