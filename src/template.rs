//! Destination template interpolation.
//!
//! | Token              | Value                                            |
//! |--------------------|--------------------------------------------------|
//! | `[name]`           | file name without extension                      |
//! | `[ext]`            | extension without the dot                        |
//! | `[base]`           | file name with extension                         |
//! | `[path]`           | directory of the relative source, with trailing `/` |
//! | `[folder]`         | name of the source's parent directory            |
//! | `[contenthash:N]`  | first N hex chars of the content hash (default 20) |
//! | `[hash:N]`         | same as `[contenthash:N]`                        |
//! | `[N]`              | capture group N of the pattern's `test` regex    |
//!
//! A token written as `[\name\]` is emitted literally as `[name]`. When the
//! source has no extension, `.[ext]` is dropped as a whole.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::hash::{ContentHash, DEFAULT_HASH_LENGTH};
use crate::utils::path::{basename, extension};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\\*)([\w:]+)(\\*)\]").expect("token regex is valid")
});

/// Per-file values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateData<'a> {
    /// Relative source path, `/`-separated.
    pub relative_from: &'a str,
    pub content_hash: ContentHash,
    /// Capture groups of `test`, group 0 first.
    pub captures: &'a [String],
}

/// An interpolated destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolated {
    pub filename: String,
    /// A content hash token was used, so the name changes with content.
    pub immutable: bool,
}

/// Interpolate every token.
pub fn interpolate(template: &str, data: &TemplateData<'_>) -> Interpolated {
    let name = basename(data.relative_from);
    let ext = extension(data.relative_from);
    let stem = if ext.is_empty() {
        name
    } else {
        &name[..name.len() - ext.len() - 1]
    };
    let dir = match data.relative_from.rfind('/') {
        Some(idx) => &data.relative_from[..=idx],
        None => "",
    };
    let folder = basename(dir.trim_end_matches('/'));

    let template = if ext.is_empty() {
        template.replace(".[ext]", "")
    } else {
        template.to_string()
    };

    let mut immutable = false;
    let filename = TOKEN
        .replace_all(&template, |caps: &Captures<'_>| {
            if is_escaped(caps) {
                return format!("[{}]", &caps[2]);
            }
            let (token, len) = split_length(&caps[2]);
            match token {
                "name" => stem.to_string(),
                "ext" => ext.to_string(),
                "base" => name.to_string(),
                "path" => dir.to_string(),
                "folder" => folder.to_string(),
                "hash" | "contenthash" => {
                    immutable = true;
                    data.content_hash.short(len)
                }
                index if index.bytes().all(|b| b.is_ascii_digit()) => index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| data.captures.get(i))
                    .cloned()
                    .unwrap_or_default(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned();

    Interpolated {
        filename,
        immutable,
    }
}

/// Interpolate only hash tokens, for combined `transform_all` output.
pub fn interpolate_hash(template: &str, content_hash: ContentHash) -> Interpolated {
    let mut immutable = false;
    let filename = TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            if is_escaped(caps) {
                return format!("[{}]", &caps[2]);
            }
            match split_length(&caps[2]) {
                ("hash" | "contenthash", len) => {
                    immutable = true;
                    content_hash.short(len)
                }
                _ => caps[0].to_string(),
            }
        })
        .into_owned();

    Interpolated {
        filename,
        immutable,
    }
}

/// Capture groups of `regex` against `subject`; unmatched groups are empty.
pub fn captures(regex: &Regex, subject: &str) -> Vec<String> {
    regex
        .captures(subject)
        .map(|caps| {
            caps.iter()
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

#[inline]
fn is_escaped(caps: &Captures<'_>) -> bool {
    !caps[1].is_empty() || !caps[3].is_empty()
}

/// `contenthash:8` → (`contenthash`, 8).
fn split_length(token: &str) -> (&str, usize) {
    match token.split_once(':') {
        Some((name, len)) => (name, len.parse().unwrap_or(DEFAULT_HASH_LENGTH)),
        None => (token, DEFAULT_HASH_LENGTH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data<'a>(relative_from: &'a str, captures: &'a [String]) -> TemplateData<'a> {
        TemplateData {
            relative_from,
            content_hash: ContentHash::of(b"abc"),
            captures,
        }
    }

    #[test]
    fn test_basic_tokens() {
        let out = interpolate("[path][name].[ext]", &data("nested/deep/file.txt", &[]));
        assert_eq!(out.filename, "nested/deep/file.txt");
        assert!(!out.immutable);

        let out = interpolate("[folder]-[base]", &data("nested/deep/file.txt", &[]));
        assert_eq!(out.filename, "deep-file.txt");
    }

    #[test]
    fn test_contenthash_is_deterministic() {
        let hash = ContentHash::of(b"abc").short(6);
        let out = interpolate("[name]-[contenthash:6].[ext]", &data("file.txt", &[]));
        assert_eq!(out.filename, format!("file-{hash}.txt"));
        assert!(out.immutable);

        let out = interpolate("[hash]", &data("file.txt", &[]));
        assert_eq!(out.filename.len(), DEFAULT_HASH_LENGTH);
    }

    #[test]
    fn test_missing_extension_drops_dot_ext() {
        let out = interpolate("[name].[ext]", &data("LICENSE", &[]));
        assert_eq!(out.filename, "LICENSE");

        let out = interpolate("[name].[ext]", &data(".gitignore", &[]));
        assert_eq!(out.filename, ".gitignore");
    }

    #[test]
    fn test_capture_tokens() {
        let regex = Regex::new(r"([^/]+)/([^/]+)\.txt$").unwrap();
        let caps = captures(&regex, "/p/dir/file.txt");
        let out = interpolate("[1]-[2].[ext]", &data("dir/file.txt", &caps));
        assert_eq!(out.filename, "dir-file.txt");

        let out = interpolate("[9]x", &data("dir/file.txt", &caps));
        assert_eq!(out.filename, "x");
    }

    #[test]
    fn test_escaped_tokens_are_literal() {
        let out = interpolate(r"[\name\]-[name].[ext]", &data("a.txt", &[]));
        assert_eq!(out.filename, "[name]-a.txt");
    }

    #[test]
    fn test_unknown_tokens_are_kept() {
        let out = interpolate("[chunk]-[name]", &data("a.txt", &[]));
        assert_eq!(out.filename, "[chunk]-a");
    }

    #[test]
    fn test_interpolate_hash_only() {
        let hash = ContentHash::of(b"abc");
        let out = interpolate_hash("bundle-[contenthash:8]-[name].js", hash);
        assert_eq!(out.filename, format!("bundle-{}-[name].js", hash.short(8)));
        assert!(out.immutable);
    }
}
