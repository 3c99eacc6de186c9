//! Domain types for the evidence store.
//!
//! This module contains the plain data records:
//! - Evidence: Submitted attestations, attachments and ledger revision metadata
//! - Provider: Registered evidence submitters
//! - Schema: JSON Schemas registered by providers
//! - Page: Paged listing requests and responses

pub mod evidence;
pub mod page;
pub mod provider;
pub mod schema;

// Re-export commonly used types
pub use evidence::{
    Attachment, AttachmentInput, BlockAddress, CreateEvidenceInput, EvidenceFilter,
    EvidenceRecord, RevisionDetails,
};
pub use page::{Page, PagedResult};
pub use provider::{EvidenceProvider, NewProvider};
pub use schema::{EvidenceSchema, NewSchema};
