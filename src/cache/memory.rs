//! In-process transform cache.

use std::io;

use dashmap::DashMap;

use super::TransformCache;
use crate::hash::ContentHash;

/// Lives as long as the value; useful for watch mode and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<ContentHash, Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransformCache for MemoryCache {
    fn get(&self, key: &ContentHash) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: &ContentHash, data: &[u8]) -> io::Result<()> {
        self.entries.insert(*key, data.to_vec());
        Ok(())
    }
}
