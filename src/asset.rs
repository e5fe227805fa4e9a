//! Asset store collaborator.
//!
//! The copy pass emits into an [`AssetStore`]: the host's view of the
//! output. [`MemoryAssetStore`] keeps assets in memory, [`DiskAssetStore`]
//! additionally writes them under an output directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

/// Metadata attached to an emitted asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetInfo {
    /// Provenance flag: the asset was produced by a copy pattern.
    pub copied: bool,
    /// Source path relative to the build context, `/`-separated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_filename: Option<String>,
    /// The file name embeds a content hash.
    pub immutable: bool,
    /// User-supplied `info` entries.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An emitted file.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub source: Vec<u8>,
    pub info: AssetInfo,
}

impl Asset {
    pub fn new(source: impl Into<Vec<u8>>, info: AssetInfo) -> Self {
        Self {
            source: source.into(),
            info,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.source.len()
    }
}

/// The host's asset graph, keyed by `/`-separated output file name.
///
/// Writes come from a single task per pass; the store never sees two
/// concurrent writes for the same name.
pub trait AssetStore: Send {
    fn has(&self, filename: &str) -> bool;

    fn get(&self, filename: &str) -> Option<&Asset>;

    /// Add a new asset.
    fn set(&mut self, filename: &str, asset: Asset) -> io::Result<()>;

    /// Replace an existing asset.
    fn update(&mut self, filename: &str, asset: Asset) -> io::Result<()>;
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryAssetStore {
    assets: BTreeMap<String, Asset>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asset names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.assets.keys().map(String::as_str).collect()
    }

    /// Content of an asset as UTF-8, for assertions and debugging.
    pub fn text(&self, filename: &str) -> Option<String> {
        self.assets
            .get(filename)
            .map(|asset| String::from_utf8_lossy(&asset.source).into_owned())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetStore for MemoryAssetStore {
    fn has(&self, filename: &str) -> bool {
        self.assets.contains_key(filename)
    }

    fn get(&self, filename: &str) -> Option<&Asset> {
        self.assets.get(filename)
    }

    fn set(&mut self, filename: &str, asset: Asset) -> io::Result<()> {
        self.assets.insert(filename.to_string(), asset);
        Ok(())
    }

    fn update(&mut self, filename: &str, asset: Asset) -> io::Result<()> {
        self.assets.insert(filename.to_string(), asset);
        Ok(())
    }
}

// ============================================================================
// Disk
// ============================================================================

/// Writes every emitted asset under an output directory.
///
/// `has`/`get` reflect what this store has written, not what happens to
/// exist on disk, so stale files from older runs never block a copy.
#[derive(Debug)]
pub struct DiskAssetStore {
    output: PathBuf,
    assets: MemoryAssetStore,
}

impl DiskAssetStore {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            assets: MemoryAssetStore::new(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn write(&self, filename: &str, asset: &Asset) -> io::Result<()> {
        let path = self.output.join(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &asset.source)
    }
}

impl AssetStore for DiskAssetStore {
    fn has(&self, filename: &str) -> bool {
        self.assets.has(filename)
    }

    fn get(&self, filename: &str) -> Option<&Asset> {
        self.assets.get(filename)
    }

    fn set(&mut self, filename: &str, asset: Asset) -> io::Result<()> {
        self.write(filename, &asset)?;
        self.assets.set(filename, asset)
    }

    fn update(&mut self, filename: &str, asset: Asset) -> io::Result<()> {
        self.write(filename, &asset)?;
        self.assets.update(filename, asset)
    }
}
