//! Deduplication keys for match results.
//!
//! A prompt stays on screen until it is answered, so every settle would
//! otherwise match it again. The matcher remembers one key per classification
//! tag and stays quiet while the key is unchanged.

use crate::pattern::PatternKind;

/// Identity of a match: its classification tag plus a hash of the matched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub kind: Option<PatternKind>,
    pub text_hash: u64,
    pub text_len: usize,
}

impl DedupKey {
    pub fn new(kind: Option<PatternKind>, matched_text: &str) -> Self {
        Self {
            kind,
            text_hash: compute_content_hash(matched_text),
            text_len: matched_text.len(),
        }
    }
}

/// Compute a content hash from screen text.
///
/// Uses FNV-1a, a fast non-cryptographic hash suitable for change detection.
#[must_use]
pub fn compute_content_hash(text: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001B3;

    text.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
