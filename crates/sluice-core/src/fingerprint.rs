//! Content fingerprinting for change detection
//!
//! Generated artifacts are compared by fingerprint rather than by identity, so
//! a regeneration that produces byte-identical output is recognized as a no-op.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content fingerprint of one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFingerprint {
    /// Hash over every content part, in insertion order
    pub content_hash: String,
    /// Number of parts that went into the hash
    pub parts: usize,
}

/// Builder for creating content fingerprints
pub struct FingerprintBuilder {
    hasher: Sha256,
    parts: usize,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            parts: 0,
        }
    }

    /// Add content that affects the generated output
    ///
    /// Parts are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn add_content(&mut self, content: &[u8]) -> &mut Self {
        self.hasher.update((content.len() as u64).to_le_bytes());
        self.hasher.update(content);
        self.parts += 1;
        self
    }

    pub fn add_content_str(&mut self, content: &str) -> &mut Self {
        self.add_content(content.as_bytes())
    }

    pub fn build(&self) -> ContentFingerprint {
        ContentFingerprint {
            content_hash: format!("{:x}", self.hasher.clone().finalize()),
            parts: self.parts,
        }
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentFingerprint {
    /// Fingerprint a sequence of content parts in one go
    pub fn of<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut builder = FingerprintBuilder::new();
        for part in parts {
            builder.add_content_str(part);
        }
        builder.build()
    }

    pub fn content_matches(&self, other: &ContentFingerprint) -> bool {
        self.content_hash == other.content_hash && self.parts == other.parts
    }

    /// Get a short hash for display purposes
    pub fn short_hash(&self) -> String {
        self.content_hash.chars().take(12).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_matches() {
        let fp1 = ContentFingerprint::of(["declare namespace monaco {}", "export enum A {}"]);
        let fp2 = ContentFingerprint::of(["declare namespace monaco {}", "export enum A {}"]);
        assert!(fp1.content_matches(&fp2));
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.short_hash().len(), 12);
    }

    #[test]
    fn test_part_boundaries_matter() {
        let fp1 = ContentFingerprint::of(["ab", "c"]);
        let fp2 = ContentFingerprint::of(["a", "bc"]);
        assert!(!fp1.content_matches(&fp2));
    }
}
