//! On-disk transform cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CACHE_DIR, TransformCache};
use crate::hash::ContentHash;

/// Entries live at `<dir>/<first two hex chars>/<hex>`.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    /// Suffix for temporary files, unique per write.
    seq: AtomicU64,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Cache under the default location inside `root`.
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(CACHE_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove every entry.
    pub fn clear(&self) -> io::Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn entry_path(&self, key: &ContentHash) -> PathBuf {
        let hex = key.to_hex();
        self.dir.join(&hex[..2]).join(hex)
    }
}

impl TransformCache for DiskCache {
    fn get(&self, key: &ContentHash) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key)).ok()
    }

    fn put(&self, key: &ContentHash, data: &[u8]) -> io::Result<()> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so readers never observe a partial entry
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), seq));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}
