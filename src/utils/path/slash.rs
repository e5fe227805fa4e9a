//! Forward-slash path strings.
//!
//! Destination names and relative source paths are plain strings with `/`
//! separators on every platform, so emitted asset names are stable.

use std::path::Path;

/// Render a path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Normalize a destination string.
///
/// - `\` becomes `/`
/// - empty and `.` segments are dropped
/// - `..` pops the previous segment when there is one
///
/// The result has no leading `./` and no trailing slash.
pub fn normalize_slashes(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Join two slash paths, ignoring an empty prefix.
pub fn join_slash(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        normalize_slashes(rest)
    } else {
        normalize_slashes(&format!("{prefix}/{rest}"))
    }
}

/// Last segment of a slash path.
#[inline]
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Whether a destination string ends with a separator.
#[inline]
pub fn has_trailing_separator(path: &str) -> bool {
    path.ends_with('/') || path.ends_with('\\')
}

/// Extension of the last segment (without dot), empty if none.
///
/// Dotfiles like `.gitignore` have no extension.
pub fn extension(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx + 1..],
    }
}
