//! The host side of a copy pass.
//!
//! A [`Compilation`] bundles everything a pass borrows from the build that
//! runs it: the build context, the optional output root, the filesystem,
//! the asset store, and the lists the pass reports into.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::asset::AssetStore;
use crate::error::CopyError;
use crate::fs::FileSystem;

/// Paths the host should watch before the next incremental pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Individual source files.
    pub files: BTreeSet<PathBuf>,
    /// Directories watched recursively.
    pub contexts: BTreeSet<PathBuf>,
}

impl Dependencies {
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files.insert(path.into());
    }

    pub fn add_context(&mut self, path: impl Into<PathBuf>) {
        self.contexts.insert(path.into());
    }

    pub fn extend(&mut self, other: Dependencies) {
        self.files.extend(other.files);
        self.contexts.extend(other.contexts);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.contexts.is_empty()
    }

    /// Whether a changed path is covered by these dependencies.
    pub fn covers(&self, path: &Path) -> bool {
        self.files.contains(path) || self.contexts.iter().any(|dir| path.starts_with(dir))
    }
}

/// One build pass as seen by the copy plugin.
pub struct Compilation<'a> {
    /// Absolute build context; relative pattern contexts resolve against it.
    pub context: PathBuf,
    /// Output root used to relativize absolute destinations.
    pub output_path: Option<PathBuf>,
    pub fs: Arc<dyn FileSystem>,
    pub assets: &'a mut dyn AssetStore,
    pub dependencies: Dependencies,
    pub errors: Vec<CopyError>,
}

impl<'a> Compilation<'a> {
    pub fn new(
        context: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        assets: &'a mut dyn AssetStore,
    ) -> Self {
        Self {
            context: context.into(),
            output_path: None,
            fs,
            assets,
            dependencies: Dependencies::default(),
            errors: Vec::new(),
        }
    }

    pub fn with_output_path(mut self, output: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output.into());
        self
    }

    /// Whether the pass finished without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_extend_and_cover() {
        let mut deps = Dependencies::default();
        deps.add_file("/p/file.txt");

        let mut other = Dependencies::default();
        other.add_context("/p/dir");
        other.add_file("/p/file.txt");
        deps.extend(other);

        assert_eq!(deps.files.len(), 1);
        assert!(deps.covers(Path::new("/p/file.txt")));
        assert!(deps.covers(Path::new("/p/dir/nested/a.txt")));
        assert!(!deps.covers(Path::new("/p/other.txt")));
        assert!(!deps.is_empty());
    }
}
