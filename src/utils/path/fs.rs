//! Path normalization utilities.
//!
//! Provides consistent path handling across the codebase:
//! - `absolutize` - lexical resolution of a possibly-relative path against a base
//! - `relative_to` - lexical relative path between two absolute paths

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root of an absolute path is dropped; leading `..` of a
/// relative path is kept.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Resolve `path` against `base` (if relative) and normalize lexically.
#[inline]
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        lexical_normalize(path)
    } else {
        lexical_normalize(&base.join(path))
    }
}

/// Lexical relative path from `base` to `path`.
///
/// Both are expected to be absolute; the result may start with `..`.
/// Returns an empty path when both are equal.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = lexical_normalize(path);
    let base = lexical_normalize(base);

    if let Ok(rel) = path.strip_prefix(&base) {
        return rel.to_path_buf();
    }

    let path_comps: Vec<_> = path.components().collect();
    let base_comps: Vec<_> = base.components().collect();
    let common = path_comps
        .iter()
        .zip(&base_comps)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_comps.len() {
        rel.push("..");
    }
    for comp in &path_comps[common..] {
        rel.push(comp.as_os_str());
    }
    rel
}
