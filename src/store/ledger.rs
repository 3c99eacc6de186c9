//! Append-only, hash-chained ledger of evidence revisions.
//!
//! Every write seals exactly one revision into a new block:
//!
//! ```text
//! revision_hash = sha256(canonical {documentId, version, transactionId, transactionTime, data})
//! block_hash    = sha256(previous_hash ":" sequence_no ":" revision_hash)
//! ```
//!
//! Blocks are optionally journaled as JSONL (one block per line) and replayed
//! on open. Current state is derived by replaying blocks: an index of the
//! latest revision per record serves ordinary reads, while the "from source"
//! accessors read the revision log itself.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::core::hasher::{canonical_json, compute_hash};
use crate::domain::{BlockAddress, EvidenceFilter, EvidenceRecord, PagedResult, RevisionDetails};

use super::{BlockProof, EvidenceRepository, LedgerHelper, RevisionProof};

/// The ledger has a single strand
pub const STRAND_ID: &str = "main";

/// Previous hash of the first block
pub const GENESIS_HASH: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// One sealed revision of a ledger document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub document_id: String,
    pub version: u64,
    pub transaction_id: String,
    pub transaction_time: DateTime<Utc>,

    /// Record as written, without ledger metadata
    pub data: EvidenceRecord,
    pub revision_hash: String,
}

impl Revision {
    /// Recompute the hash of this revision from its contents
    pub fn compute_hash(&self) -> Result<String> {
        let envelope = json!({
            "documentId": self.document_id,
            "version": self.version,
            "transactionId": self.transaction_id,
            "transactionTime": self.transaction_time.to_rfc3339(),
            "data": serde_json::to_value(&self.data)?,
        });
        Ok(compute_hash(canonical_json(&envelope).as_bytes()))
    }
}

/// A block sealing one revision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub sequence_no: u64,
    pub previous_hash: String,
    pub revision: Revision,
    pub block_hash: String,
}

impl Block {
    pub fn compute_hash(previous_hash: &str, sequence_no: u64, revision_hash: &str) -> String {
        compute_hash(format!("{}:{}:{}", previous_hash, sequence_no, revision_hash).as_bytes())
    }

    fn address(&self) -> BlockAddress {
        BlockAddress {
            strand_id: STRAND_ID.to_string(),
            sequence_no: self.sequence_no,
        }
    }

    /// The record this block holds, with its revision details attached
    fn to_record(&self) -> EvidenceRecord {
        let revision = &self.revision;
        EvidenceRecord {
            revision_details: Some(RevisionDetails {
                document_id: revision.document_id.clone(),
                version: revision.version,
                revision_hash: revision.revision_hash.clone(),
                digest: self.block_hash.clone(),
                transaction_id: revision.transaction_id.clone(),
                transaction_time: revision.transaction_time,
                block_address: self.address(),
            }),
            ..revision.data.clone()
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    blocks: Vec<Block>,

    /// document_id -> block positions, in version order
    documents: HashMap<String, Vec<usize>>,

    /// evidence_id -> document_id
    by_evidence: HashMap<String, String>,

    /// composite_key -> evidence_id
    by_composite_key: HashMap<String, String>,

    /// evidence_id -> latest committed record
    index: HashMap<String, EvidenceRecord>,
}

impl LedgerState {
    fn apply(&mut self, block: Block) {
        let position = self.blocks.len();
        let record = block.to_record();
        let revision = &block.revision;

        self.documents
            .entry(revision.document_id.clone())
            .or_default()
            .push(position);
        self.by_evidence
            .insert(record.evidence_id.clone(), revision.document_id.clone());
        self.by_composite_key
            .insert(record.composite_key.clone(), record.evidence_id.clone());
        self.index.insert(record.evidence_id.clone(), record);

        self.blocks.push(block);
    }

    fn tip_hash(&self) -> &str {
        self.blocks
            .last()
            .map(|b| b.block_hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    fn document_blocks(&self, document_id: &str) -> impl Iterator<Item = &Block> {
        self.documents
            .get(document_id)
            .into_iter()
            .flatten()
            .filter_map(|&position| self.blocks.get(position))
    }

    fn revision_block(&self, document_id: &str, version: u64) -> Option<&Block> {
        let position = *self
            .documents
            .get(document_id)?
            .get(usize::try_from(version).ok()?)?;
        self.blocks.get(position)
    }

    fn latest_block(&self, evidence_id: &str) -> Option<&Block> {
        let document_id = self.by_evidence.get(evidence_id)?;
        let position = *self.documents.get(document_id)?.last()?;
        self.blocks.get(position)
    }

    fn block_at(&self, address: &BlockAddress) -> Option<&Block> {
        if address.strand_id != STRAND_ID {
            return None;
        }
        self.blocks.get(usize::try_from(address.sequence_no).ok()?)
    }
}

/// Local ledger implementing evidence persistence and proof checks
pub struct LocalLedger {
    state: Mutex<LedgerState>,

    /// JSONL journal, if persistent
    journal: Option<PathBuf>,
}

impl LocalLedger {
    /// Ledger that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            journal: None,
        }
    }

    /// Open a journaled ledger, replaying any existing blocks
    pub async fn open(journal: impl Into<PathBuf>) -> Result<Self> {
        let journal = journal.into();
        if let Some(parent) = journal.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut state = LedgerState::default();
        for block in replay(&journal).await? {
            state.apply(block);
        }

        info!(
            journal = %journal.display(),
            blocks = state.blocks.len(),
            "Opened ledger"
        );

        Ok(Self {
            state: Mutex::new(state),
            journal: Some(journal),
        })
    }

    /// Current tip digest and block count
    pub async fn digest(&self) -> (String, usize) {
        let state = self.state.lock().await;
        (state.tip_hash().to_string(), state.blocks.len())
    }

    /// Seal a record into a new block. The caller holds the state lock.
    async fn commit(
        &self,
        state: &mut LedgerState,
        document_id: String,
        record: EvidenceRecord,
    ) -> Result<EvidenceRecord> {
        let version = state
            .documents
            .get(&document_id)
            .map(|positions| positions.len() as u64)
            .unwrap_or(0);

        let mut revision = Revision {
            document_id,
            version,
            transaction_id: Uuid::new_v4().simple().to_string(),
            transaction_time: Utc::now(),
            data: record.without_revision(),
            revision_hash: String::new(),
        };
        revision.revision_hash = revision.compute_hash()?;

        let sequence_no = state.blocks.len() as u64;
        let previous_hash = state.tip_hash().to_string();
        let block_hash = Block::compute_hash(&previous_hash, sequence_no, &revision.revision_hash);
        let block = Block {
            sequence_no,
            previous_hash,
            revision,
            block_hash,
        };

        // Journal first so memory never runs ahead of disk
        if let Some(ref journal) = self.journal {
            append_block(journal, &block).await?;
        }

        let record = block.to_record();
        debug!(
            evidence_id = %record.evidence_id,
            version,
            sequence_no,
            "Committed revision"
        );
        state.apply(block);

        Ok(record)
    }
}

/// Read all blocks from a journal, in order
async fn replay(journal: &Path) -> Result<Vec<Block>> {
    let content = match tokio::fs::read_to_string(journal).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut blocks = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let block: Block = serde_json::from_str(line).map_err(|e| {
            AppError::Storage(format!(
                "failed to parse ledger block at line {}: {}",
                line_no + 1,
                e
            ))
        })?;
        blocks.push(block);
    }

    Ok(blocks)
}

/// Append one block under an exclusive file lock
async fn append_block(journal: &Path, block: &Block) -> Result<()> {
    let line = serde_json::to_string(block)?;
    let path = journal.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        let written = writeln!(file, "{}", line).and_then(|_| file.flush());
        file.unlock()?;
        written
    })
    .await
    .map_err(|e| AppError::Storage(format!("journal writer panicked: {}", e)))?
    .map_err(AppError::from)
}

#[async_trait]
impl EvidenceRepository for LocalLedger {
    async fn create_evidence(&self, record: EvidenceRecord) -> Result<EvidenceRecord> {
        let mut state = self.state.lock().await;

        // Conditional write: the composite key must be unused
        if state.by_composite_key.contains_key(&record.composite_key) {
            return Err(AppError::Validation(format!(
                "evidence already exists for composite key {}",
                record.composite_key
            )));
        }
        if state.by_evidence.contains_key(&record.evidence_id) {
            return Err(AppError::Validation(format!(
                "evidence {} already exists",
                record.evidence_id
            )));
        }

        let document_id = Uuid::new_v4().simple().to_string();
        self.commit(&mut state, document_id, record).await
    }

    async fn update_evidence(&self, record: EvidenceRecord) -> Result<EvidenceRecord> {
        let mut state = self.state.lock().await;

        let document_id = state
            .by_evidence
            .get(&record.evidence_id)
            .cloned()
            .ok_or_else(|| AppError::EvidenceNotFound(record.evidence_id.clone()))?;

        if let Some(owner) = state.by_composite_key.get(&record.composite_key) {
            if owner != &record.evidence_id {
                return Err(AppError::Validation(format!(
                    "composite key {} belongs to evidence {}",
                    record.composite_key, owner
                )));
            }
        }

        self.commit(&mut state, document_id, record).await
    }

    async fn get_evidence_by_id(&self, evidence_id: &str) -> Result<Option<EvidenceRecord>> {
        let state = self.state.lock().await;
        Ok(state.index.get(evidence_id).cloned())
    }

    async fn get_evidence_by_hash_value(
        &self,
        content_hash: &str,
    ) -> Result<Option<EvidenceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .index
            .values()
            .filter(|r| r.content_hash == content_hash)
            .min_by(|a, b| {
                (a.created_timestamp, &a.evidence_id).cmp(&(b.created_timestamp, &b.evidence_id))
            })
            .cloned())
    }

    async fn get_evidence_by_composite_key(
        &self,
        composite_key: &str,
    ) -> Result<Option<EvidenceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .by_composite_key
            .get(composite_key)
            .and_then(|evidence_id| state.index.get(evidence_id))
            .cloned())
    }

    async fn get_evidence_revision(
        &self,
        evidence_id: &str,
        version: u64,
    ) -> Result<Option<EvidenceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .by_evidence
            .get(evidence_id)
            .and_then(|document_id| state.revision_block(document_id, version))
            .map(Block::to_record))
    }

    async fn get_evidence_revisions(
        &self,
        evidence_id: &str,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceRecord>> {
        let state = self.state.lock().await;
        let revisions: Vec<EvidenceRecord> = match state.by_evidence.get(evidence_id) {
            Some(document_id) => state
                .document_blocks(document_id)
                .map(Block::to_record)
                .collect(),
            None => Vec::new(),
        };

        Ok(PagedResult::from_window(revisions, start_index, page_size))
    }

    async fn get_evidences(
        &self,
        filter: &EvidenceFilter,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceRecord>> {
        let state = self.state.lock().await;
        let mut matches: Vec<&EvidenceRecord> =
            state.index.values().filter(|r| filter.matches(r)).collect();
        matches.sort_by(|a, b| {
            (a.created_timestamp, &a.evidence_id).cmp(&(b.created_timestamp, &b.evidence_id))
        });

        Ok(PagedResult::from_window(
            matches.into_iter().cloned().collect(),
            start_index,
            page_size,
        ))
    }

    async fn get_evidence_by_id_from_source(
        &self,
        evidence_id: &str,
    ) -> Result<Option<EvidenceRecord>> {
        let state = self.state.lock().await;
        Ok(state.latest_block(evidence_id).map(Block::to_record))
    }

    async fn get_evidence_by_document_id(
        &self,
        document_id: &str,
        version: u64,
    ) -> Result<Option<EvidenceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .revision_block(document_id, version)
            .map(Block::to_record))
    }
}

#[async_trait]
impl LedgerHelper for LocalLedger {
    async fn verify_revision(&self, proof: &RevisionProof) -> Result<bool> {
        let state = self.state.lock().await;

        let Some(block) = state.block_at(&proof.block_address) else {
            return Ok(false);
        };
        let revision = &block.revision;

        if revision.document_id != proof.document_id || revision.version != proof.version {
            return Ok(false);
        }

        let recomputed = revision.compute_hash()?;
        Ok(recomputed == revision.revision_hash && recomputed == proof.revision_hash)
    }

    async fn verify_block(&self, proof: &BlockProof) -> Result<bool> {
        let state = self.state.lock().await;

        if state.block_at(&proof.block_address).is_none() {
            return Ok(false);
        }

        // The whole chain must recompute, not just the block in question
        let mut previous_hash = GENESIS_HASH.to_string();
        for (position, block) in state.blocks.iter().enumerate() {
            if block.sequence_no != position as u64 || block.previous_hash != previous_hash {
                return Ok(false);
            }
            let expected =
                Block::compute_hash(&previous_hash, block.sequence_no, &block.revision.revision_hash);
            if expected != block.block_hash {
                return Ok(false);
            }
            previous_hash = expected;
        }

        Ok(state
            .block_at(&proof.block_address)
            .map(|block| block.block_hash == proof.digest)
            .unwrap_or(false))
    }
}
