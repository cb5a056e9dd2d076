//! Content Hasher (C1): deterministic, workspace-scoped hashing of text and
//! files, used by the ingestion pipeline for dedup lookups.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// NFC-normalize, trim, then collapse internal whitespace runs to a single
/// space. Case is preserved (§4.1 Normalization).
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let mut out = String::with_capacity(composed.len());
    let mut prev_was_space = false;
    for ch in composed.trim().chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                out.push(' ');
            }
            prev_was_space = true;
        } else {
            out.push(ch);
            prev_was_space = false;
        }
    }
    out
}

/// SHA-256 over `"{workspace_id}:{normalized_text}"`, 64 lowercase hex chars.
pub fn hash_text(workspace_id: Uuid, text: &str) -> String {
    let normalized = normalize_text(text);
    let mut hasher = Sha256::new();
    hasher.update(workspace_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 over `workspace_id || ':' || raw_file_bytes`. Files are hashed
/// exactly, with no normalization.
pub fn hash_file(workspace_id: Uuid, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workspace_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_different_workspaces_hash_differently() {
        let w1 = Uuid::new_v4();
        let w2 = Uuid::new_v4();
        assert_ne!(hash_text(w1, "hello world"), hash_text(w2, "hello world"));
    }

    #[test]
    fn normalization_collapses_whitespace_and_preserves_case() {
        let w = Uuid::new_v4();
        assert_eq!(
            hash_text(w, "  hello   World  \n\n"),
            hash_text(w, "hello World")
        );
        assert_ne!(hash_text(w, "hello world"), hash_text(w, "Hello World"));
    }

    #[test]
    fn hash_is_deterministic() {
        let w = Uuid::new_v4();
        assert_eq!(hash_text(w, "abc"), hash_text(w, "abc"));
        assert_eq!(hash_file(w, b"abc"), hash_file(w, b"abc"));
    }

    #[test]
    fn file_hash_is_exact_not_normalized() {
        let w = Uuid::new_v4();
        assert_ne!(hash_file(w, b"  abc  "), hash_file(w, b"abc"));
    }

    #[test]
    fn hash_is_64_lowercase_hex_chars() {
        let w = Uuid::new_v4();
        let h = hash_text(w, "anything");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
