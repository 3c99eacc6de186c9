//! Application error shared by the service core and its collaborators.
//!
//! Every variant maps to an HTTP-style status code and a retryable flag so
//! adapters can surface a uniform `{message, statusCode, retryable}` shape.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using the service error
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the evidence service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Evidence provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Schema {schema_id} not found for provider {provider_id}")]
    SchemaNotFound {
        provider_id: String,
        schema_id: String,
    },

    #[error("Evidence not found: {0}")]
    EvidenceNotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Evidence provider {0} is disabled")]
    ProviderDisabled(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed pagination token: {0}")]
    MalformedToken(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::ProviderNotFound(_) => 400,
            AppError::SchemaNotFound { .. } => 400,
            AppError::EvidenceNotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::ProviderDisabled(_) => 422,
            AppError::Validation(_) => 400,
            AppError::MalformedToken(_) => 400,
            AppError::Transient(_) => 503,
            AppError::Storage(_) => 500,
        }
    }

    /// Whether a caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    /// Uniform body for adapters
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
            status_code: self.status_code(),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable error shape
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    pub retryable: bool,
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(format!("serialization: {}", e))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                AppError::Transient(e.to_string())
            }
            Some(ErrorCode::ConstraintViolation) => AppError::Validation(e.to_string()),
            _ => AppError::Storage(format!("sqlite: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::ProviderNotFound("p".into()).status_code(), 400);
        assert_eq!(AppError::EvidenceNotFound("e".into()).status_code(), 404);
        assert_eq!(AppError::Forbidden("k".into()).status_code(), 403);
        assert_eq!(AppError::ProviderDisabled("p".into()).status_code(), 422);
        assert_eq!(AppError::Transient("busy".into()).status_code(), 503);
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(AppError::Transient("throttled".into()).is_retryable());
        assert!(!AppError::Storage("disk".into()).is_retryable());
        assert!(!AppError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_body() {
        let body = AppError::ProviderDisabled("p1".into()).to_body();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["statusCode"], 422);
        assert_eq!(json["retryable"], false);
        assert_eq!(json["message"], "Evidence provider p1 is disabled");
    }
}
