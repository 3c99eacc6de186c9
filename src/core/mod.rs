//! Core evidence logic.
//!
//! This module contains:
//! - Hasher: Content digests over normalized JSON
//! - CompositeKey: Identity of a logical fact
//! - Pagination: Opaque cursor tokens
//! - Validator: JSON Schema validation of content
//! - Verifier: Ledger and content integrity checks
//! - Service: Create/read/list/verify orchestration

pub mod composite_key;
pub mod error;
pub mod hasher;
pub mod pagination;
pub mod service;
pub mod validator;
pub mod verifier;

// Re-export commonly used types
pub use composite_key::composite_key;
pub use error::{AppError, ErrorBody, Result};
pub use hasher::{canonical_json, compute_hash, content_hash, CorrelationFields};
pub use pagination::PaginationSettings;
pub use service::{hash_api_key, EvidenceService, ServiceDeps};
pub use validator::SchemaValidator;
pub use verifier::{EvidenceVerifier, VerificationCheck, VerificationResult, VerificationStatus};
