//! Window identity and content hashing for cache and aggregation keys.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ContextHash, TaskContentHash};

/// Window titles longer than this are truncated before hashing.
pub const MAX_WINDOW_TITLE_CHARS: usize = 200;

/// A unique observed window: process name plus normalized title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowContext {
    pub context_hash: ContextHash,
    pub process_name: String,
    /// Normalized (length-capped) title.
    pub window_title: String,
}

impl WindowContext {
    /// Builds the context for a raw foreground-window sample.
    pub fn new(process_name: &str, window_title: &str) -> Self {
        let window_title = normalize_window_title(window_title).to_string();
        Self {
            context_hash: window_context_hash(process_name, &window_title),
            process_name: process_name.to_string(),
            window_title,
        }
    }
}

/// Truncates a window title to [`MAX_WINDOW_TITLE_CHARS`] characters.
pub fn normalize_window_title(title: &str) -> &str {
    match title.char_indices().nth(MAX_WINDOW_TITLE_CHARS) {
        Some((cut, _)) => &title[..cut],
        None => title,
    }
}

/// Digest of a window identity. The title is normalized first.
pub fn window_context_hash(process_name: &str, window_title: &str) -> ContextHash {
    let normalized = normalize_window_title(window_title);
    ContextHash::from_digest(sha256_hex(&format!("{process_name}|{normalized}")))
}

/// Digest of a task description and its optional context hint.
pub fn task_content_hash(description: &str, context_hint: Option<&str>) -> TaskContentHash {
    let hint = context_hint.unwrap_or_default();
    TaskContentHash::from_digest(sha256_hex(&format!("{description}|{hint}")))
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_short_titles() {
        assert_eq!(normalize_window_title(""), "");
        assert_eq!(normalize_window_title("main.rs - editor"), "main.rs - editor");
    }

    #[test]
    fn normalize_truncates_on_char_boundary() {
        let long: String = "é".repeat(250);
        let normalized = normalize_window_title(&long);
        assert_eq!(normalized.chars().count(), MAX_WINDOW_TITLE_CHARS);
    }

    #[test]
    fn context_hash_is_stable_hex() {
        let hash = window_context_hash("code", "lib.rs");
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(hash, window_context_hash("code", "lib.rs"));
    }

    #[test]
    fn context_hash_ignores_title_beyond_cap() {
        let base = "a".repeat(MAX_WINDOW_TITLE_CHARS);
        let a = window_context_hash("firefox", &format!("{base} - tab one"));
        let b = window_context_hash("firefox", &format!("{base} - tab two"));
        assert_eq!(a, b);
    }

    #[test]
    fn context_hash_separates_process_names() {
        assert_ne!(
            window_context_hash("firefox", "Docs"),
            window_context_hash("chrome", "Docs")
        );
    }

    #[test]
    fn task_content_hash_treats_missing_hint_as_empty() {
        assert_eq!(
            task_content_hash("write report", None),
            task_content_hash("write report", Some(""))
        );
        assert_ne!(
            task_content_hash("write report", None),
            task_content_hash("write report", Some("google docs"))
        );
    }

    #[test]
    fn sha256_hex_matches_reference_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }
}
