//! Shared utility helpers.

use sha2::{Digest, Sha256};

/// Case-insensitive find starting at byte offset `from`.
pub fn find_ci_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let needle_bytes = needle.as_bytes();
    let haystack_bytes = haystack.as_bytes();
    if needle_bytes.is_empty() || from > haystack_bytes.len() {
        return None;
    }
    if needle_bytes.len() > haystack_bytes.len() - from {
        return None;
    }
    haystack_bytes[from..]
        .windows(needle_bytes.len())
        .position(|window| window.eq_ignore_ascii_case(needle_bytes))
        .map(|pos| pos + from)
}

/// Case-insensitive ends_with check without allocating.
#[inline]
pub fn ends_with_ci(haystack: &str, needle: &str) -> bool {
    haystack.len() >= needle.len()
        && haystack.as_bytes()[haystack.len() - needle.len()..]
            .eq_ignore_ascii_case(needle.as_bytes())
}

/// Hex-encoded SHA-256 digest of `content`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
