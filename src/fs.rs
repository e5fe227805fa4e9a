//! Filesystem collaborator.
//!
//! The copy pass never touches `std::fs` directly; it goes through a
//! [`FileSystem`] so the same pipeline runs against the real disk
//! ([`DiskFs`]) or an in-memory tree ([`MemoryFs`]).

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use parking_lot::RwLock;

use crate::utils::path::lexical_normalize;

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    /// Sockets, devices, dangling links and the like.
    Other,
}

/// Result of [`FileSystem::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub len: u64,
}

impl FileStat {
    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }
}

/// Filesystem operations needed by a copy pass.
///
/// Implementations must be shareable across worker tasks. Errors follow
/// `std::io` conventions: a missing path is `ErrorKind::NotFound`.
pub trait FileSystem: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// All regular files below `root`, as absolute paths.
    ///
    /// Links to files are always listed; links to directories are only
    /// descended into when `follow_symlinks` is set. Order is unspecified.
    fn walk(&self, root: &Path, follow_symlinks: bool) -> io::Result<Vec<PathBuf>>;
}

// ============================================================================
// Disk
// ============================================================================

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl FileSystem for DiskFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        let kind = if meta.is_file() {
            FileKind::File
        } else if meta.is_dir() {
            FileKind::Dir
        } else {
            FileKind::Other
        };
        Ok(FileStat {
            kind,
            len: meta.len(),
        })
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn walk(&self, root: &Path, follow_symlinks: bool) -> io::Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let files = WalkDir::new(root)
            .skip_hidden(false)
            .follow_links(follow_symlinks)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_type().is_file() || (e.file_type().is_symlink() && e.path().is_file())
            })
            .map(|e| e.path())
            .collect();
        Ok(files)
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory filesystem keyed by absolute path.
///
/// Directories exist implicitly as prefixes of stored files, plus any
/// created explicitly with [`MemoryFs::create_dir`].
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: RwLock<BTreeMap<PathBuf, ()>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. Parent directories appear implicitly.
    pub fn write(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = lexical_normalize(path.as_ref());
        self.files.write().insert(path, data.into());
    }

    pub fn create_dir(&self, path: impl AsRef<Path>) {
        let path = lexical_normalize(path.as_ref());
        self.dirs.write().insert(path, ());
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let path = lexical_normalize(path.as_ref());
        self.files.write().remove(&path).is_some()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.read().contains_key(path)
            || self
                .files
                .read()
                .keys()
                .any(|file| file != path && file.starts_with(path))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl FileSystem for MemoryFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let path = lexical_normalize(path);
        if let Some(data) = self.files.read().get(&path) {
            return Ok(FileStat {
                kind: FileKind::File,
                len: data.len() as u64,
            });
        }
        if self.is_dir(&path) {
            return Ok(FileStat {
                kind: FileKind::Dir,
                len: 0,
            });
        }
        Err(not_found(&path))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = lexical_normalize(path);
        self.files
            .read()
            .get(&path)
            .cloned()
            .ok_or_else(|| not_found(&path))
    }

    fn walk(&self, root: &Path, _follow_symlinks: bool) -> io::Result<Vec<PathBuf>> {
        let root = lexical_normalize(root);
        Ok(self
            .files
            .read()
            .keys()
            .filter(|file| **file != root && file.starts_with(&root))
            .cloned()
            .collect())
    }
}
