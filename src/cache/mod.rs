//! Transform result cache.
//!
//! Content-addressed: entries are keyed by a fingerprint over the plugin
//! identity, the transform id, the source content hash and any extra keys.
//! Backends only store bytes; they never interpret them.

mod disk;
mod memory;

use std::collections::BTreeMap;
use std::io;

use serde_json::{Map, Value};

use crate::hash::{ContentHash, KeyHasher};

pub use disk::DiskCache;
pub use memory::MemoryCache;

/// Cache directory name (inside the build context)
pub(crate) const CACHE_DIR: &str = ".assetcopy/cache";

/// Storage behind transform caching.
///
/// Implementations are shared by every task of a pass; `put` for the same
/// key may race and must leave one complete entry behind.
pub trait TransformCache: Send + Sync {
    fn get(&self, key: &ContentHash) -> Option<Vec<u8>>;

    fn put(&self, key: &ContentHash, data: &[u8]) -> io::Result<()>;
}

/// Default keys of a cached transform.
///
/// User key functions receive this map and may extend or replace it.
pub fn default_keys(transform_id: &str, content_hash: ContentHash) -> Map<String, Value> {
    let mut keys = Map::new();
    keys.insert("name".into(), env!("CARGO_PKG_NAME").into());
    keys.insert("version".into(), env!("CARGO_PKG_VERSION").into());
    keys.insert("transform".into(), transform_id.into());
    keys.insert("contentHash".into(), content_hash.to_hex().into());
    keys
}

/// Fingerprint a key map.
///
/// Keys are hashed in sorted order, so insertion order never matters.
pub fn fingerprint(keys: &Map<String, Value>) -> ContentHash {
    let sorted: BTreeMap<&String, &Value> = keys.iter().collect();
    let mut hasher = KeyHasher::new();
    for (key, value) in sorted {
        hasher.part(key).part(value.to_string());
    }
    hasher.finish()
}
