//! Content encoding shared by the contents-API backends.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::errors::{ProviderError, Result};

/// Base64-encode content for a contents-API request body.
#[must_use]
pub fn encode_content(content: &[u8]) -> String {
    STANDARD.encode(content)
}

/// Decode base64 content from a contents-API response.
///
/// GitHub wraps the encoded payload every 60 characters, so whitespace is
/// stripped before decoding.
pub fn decode_content(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ProviderError::parse(format!("invalid base64 content: {e}")))
}

/// Hex-encoded SHA-256 of `content`.
#[must_use]
pub fn content_digest(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_line_breaks() {
        let encoded = encode_content(b"@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .\n");
        let wrapped: String = encoded
            .as_bytes()
            .chunks(20)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        let decoded = decode_content(&wrapped).unwrap();
        assert!(decoded.starts_with(b"@prefix rdfs:"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_content("not base64 !!").unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[test]
    fn test_content_digest() {
        assert_eq!(
            content_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_digest(b"a"), content_digest(b"b"));
    }
}
