//! Deterministic hashing primitives used for stable element/context identifiers.
//!
//! `DefaultHasher` is explicitly not used anywhere in this crate: its output is not
//! guaranteed stable across Rust versions, and stable ids are the whole point of
//! `element_key` / `content_hash` / `context_key`.

/// FNV-1a, 64-bit. Stable across Rust versions and platforms.
pub struct FnvHasher(u64);

impl FnvHasher {
    const BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    pub fn new() -> Self {
        Self(Self::BASIS)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a sequence of string parts into a stable hex digest, truncated to `len` chars.
/// Used for `element_key`, `content_hash`, and `context_key` — all of which are
/// "digest of an ordered tuple of fields" per the data model.
pub fn stable_digest(parts: &[&str], len: usize) -> String {
    let mut hasher = FnvHasher::new();
    for (i, part) in parts.iter().enumerate() {
        hasher.write_u64(i as u64);
        hasher.write_str(part);
    }
    let hex = format!("{:016x}", hasher.finish());
    hex.chars().take(len.max(1)).collect()
}

/// Full-width (16 hex char) stable digest.
pub fn stable_digest_full(parts: &[&str]) -> String {
    stable_digest(parts, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = stable_digest_full(&["tag", "button", "id:apple"]);
        let b = stable_digest_full(&["tag", "button", "id:apple"]);
        assert_eq!(a, b);
    }

    #[test]
    fn digest_changes_with_input() {
        let a = stable_digest_full(&["a"]);
        let b = stable_digest_full(&["b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn digest_respects_order() {
        let a = stable_digest_full(&["a", "b"]);
        let b = stable_digest_full(&["b", "a"]);
        assert_ne!(a, b);
    }

    #[test]
    fn truncated_digest_is_prefix_of_full() {
        let full = stable_digest_full(&["x", "y"]);
        let short = stable_digest(&["x", "y"], 8);
        assert_eq!(&full[..8], short);
    }
}
