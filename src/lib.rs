//! ags-evidence-store - Ledger-backed evidence store
//!
//! Records governance and compliance evidence submitted by registered
//! providers, deduplicates it by content hash, and verifies its integrity
//! against an append-only ledger.
//!
//! # Architecture
//!
//! Evidence is never rewritten in place:
//! - Each write seals a new revision into a hash-chained ledger
//! - Identical resubmissions are no-ops; changed ones become new revisions
//! - Verification replays the revision and block proofs, then compares the
//!   ledger copy with the raw content in the blob store
//!
//! # Modules
//!
//! - `domain`: Data structures (EvidenceRecord, EvidenceProvider, EvidenceSchema)
//! - `core`: Hashing, composite keys, pagination, verification, EvidenceService
//! - `store`: Storage traits and local backends (SQLite, ledger, filesystem)
//! - `collector`: Security Hub and Config finding collectors, evidence API client
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Onboard a provider and register a schema
//! ags-evidence provider create --name scanner --id scanner
//! ags-evidence schema create --provider scanner --id finding --file schema.json
//!
//! # Record and verify evidence
//! ags-evidence evidence create --provider scanner --target arn:aws:s3:::b \
//!     --schema finding --content finding.json --api-key $KEY
//! ags-evidence evidence verify <evidence-id>
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{AppError, EvidenceService, ServiceDeps, VerificationResult, VerificationStatus};
pub use domain::{CreateEvidenceInput, EvidenceFilter, EvidenceProvider, EvidenceRecord, EvidenceSchema};
pub use store::{FsContentStore, LocalLedger, SqliteRegistry};
