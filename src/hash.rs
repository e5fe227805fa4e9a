//! Content hashing using blake3.
//!
//! Every digest in the crate goes through here: template `[contenthash]`
//! tokens, the written-tracking table, and transform cache fingerprints.

use std::fmt;

/// Default number of hex characters used by `[hash]` / `[contenthash]`.
pub const DEFAULT_HASH_LENGTH: usize = 20;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a byte buffer.
    #[inline]
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Get the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// First `len` hex characters (clamped to the full 64).
    pub fn short(self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(64));
        hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display first 16 chars of hex for brevity
        write!(f, "{}", self.short(16))
    }
}

/// Incremental hasher for composite keys.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")`
/// never collide.
#[derive(Default)]
pub struct KeyHasher {
    inner: blake3::Hasher,
}

impl KeyHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        let data = data.as_ref();
        self.inner.update(&(data.len() as u64).to_le_bytes());
        self.inner.update(data);
        self
    }

    pub fn finish(&self) -> ContentHash {
        ContentHash::new(*self.inner.finalize().as_bytes())
    }
}
