//! Opaque cursor tokens for paged listing queries.
//!
//! A token is the URL-safe base64 of the JSON tuple `[startIndex, pageSize]`.
//! Callers must treat it as opaque; only the round-trip property is stable.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Cursor(usize, usize);

/// Encode a cursor into an opaque token
pub fn encode(start_index: usize, page_size: usize) -> String {
    // Serializing a pair of integers cannot fail
    let json = serde_json::to_vec(&Cursor(start_index, page_size)).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a token produced by [`encode`] back into `(start_index, page_size)`
pub fn decode(token: &str) -> Result<(usize, usize)> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| AppError::MalformedToken(e.to_string()))?;

    let Cursor(start_index, page_size) =
        serde_json::from_slice(&bytes).map_err(|e| AppError::MalformedToken(e.to_string()))?;

    Ok((start_index, page_size))
}

/// Token for the page after `[start_index, start_index + page_size)`.
///
/// Returns `None` once the window reaches the end of the result set.
pub fn next_token(start_index: usize, page_size: usize, total: usize) -> Option<String> {
    let next_start = start_index.saturating_add(page_size);
    if page_size > 0 && next_start < total {
        Some(encode(next_start, page_size))
    } else {
        None
    }
}

/// Page size limits applied to listing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl PaginationSettings {
    /// Resolve the window for a request.
    ///
    /// The token supplies the start index (and page size, unless the caller
    /// sets one explicitly). The page size is clamped to `[1, max_page_size]`.
    pub fn resolve(&self, page_size: Option<usize>, token: Option<&str>) -> Result<(usize, usize)> {
        let (start_index, token_page_size) = match token {
            Some(t) if !t.trim().is_empty() => {
                let (start, size) = decode(t)?;
                (start, Some(size))
            }
            _ => (0, None),
        };

        let requested = page_size
            .or(token_page_size)
            .unwrap_or(self.default_page_size);
        let max = self.max_page_size.max(1);

        Ok((start_index, requested.clamp(1, max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for (s, p) in [(0, 0), (0, 20), (40, 20), (7, 1), (usize::MAX, usize::MAX)] {
            assert_eq!(decode(&encode(s, p)).unwrap(), (s, p));
        }
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = encode(123_456, 100);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(matches!(decode("not base64!"), Err(AppError::MalformedToken(_))));

        // Valid base64, wrong payload
        let wrong = URL_SAFE_NO_PAD.encode(br#"{"start": 1}"#);
        assert!(matches!(decode(&wrong), Err(AppError::MalformedToken(_))));

        let negative = URL_SAFE_NO_PAD.encode(b"[-1, 5]");
        assert!(matches!(decode(&negative), Err(AppError::MalformedToken(_))));
    }

    #[test]
    fn test_no_token_at_end() {
        assert!(next_token(0, 10, 10).is_none());
        assert!(next_token(5, 10, 12).is_none());
        assert!(next_token(0, 10, 0).is_none());

        let token = next_token(0, 10, 11).unwrap();
        assert_eq!(decode(&token).unwrap(), (10, 10));
    }

    #[test]
    fn test_resolve_defaults_and_clamping() {
        let settings = PaginationSettings::default();

        assert_eq!(settings.resolve(None, None).unwrap(), (0, 20));
        assert_eq!(settings.resolve(Some(0), None).unwrap(), (0, 1));
        assert_eq!(settings.resolve(Some(500), None).unwrap(), (0, 100));

        let token = encode(40, 15);
        assert_eq!(settings.resolve(None, Some(&token)).unwrap(), (40, 15));
        assert_eq!(settings.resolve(Some(5), Some(&token)).unwrap(), (40, 5));
        assert_eq!(settings.resolve(None, Some("")).unwrap(), (0, 20));
    }
}
