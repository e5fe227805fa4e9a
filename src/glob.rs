//! Glob engine.
//!
//! A glob is an absolute, `/`-separated pattern. It is split into a literal
//! base directory (every leading segment without unescaped metacharacters)
//! and the remaining pattern. The base is walked through the
//! [`FileSystem`]; the remainder is compiled with `globset` and matched
//! against paths relative to the base.
//!
//! Context directories are escaped with [`escape`] before being joined in
//! front of a user pattern, so a context like `/work/[v2]` stays literal.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

use crate::error::{CopyError, CopyResult};
use crate::fs::FileSystem;
use crate::utils::path::to_slash;

/// Characters with glob meaning that must be escaped in literal paths.
const META_CHARS: [char; 9] = ['*', '?', '!', '(', ')', '[', ']', '{', '}'];

/// Options understood by the engine.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Match path segments starting with `.`.
    pub dot: bool,
    pub follow_symlinks: bool,
    pub case_sensitive: bool,
    /// Exclude globs, matched against the path relative to `cwd`.
    pub ignore: Vec<String>,
    /// Directory that `ignore` entries are relative to.
    pub cwd: PathBuf,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            dot: false,
            follow_symlinks: true,
            case_sensitive: true,
            ignore: Vec::new(),
            cwd: PathBuf::new(),
        }
    }
}

/// Bracket-escape every glob metacharacter in a literal path.
///
/// `/work/[v2]` becomes `/work/[[]v2[]]`.
pub fn escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if META_CHARS.contains(&c) {
            out.push('[');
            out.push(c);
            out.push(']');
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether a user-supplied `from` contains glob syntax.
pub fn has_magic(pattern: &str) -> bool {
    pattern.chars().any(|c| META_CHARS.contains(&c))
}

/// Decode a segment if it is literal, resolving `[c]` and `\c` escapes.
///
/// Returns `None` as soon as an unescaped metacharacter shows up.
fn literal_segment(segment: &str) -> Option<String> {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '[' if i + 2 < chars.len() && chars[i + 2] == ']' => {
                out.push(chars[i + 1]);
                i += 3;
            }
            '\\' if i + 1 < chars.len() => {
                out.push(chars[i + 1]);
                i += 2;
            }
            '*' | '?' | '[' | '{' | '}' => return None,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Some(out)
}

/// Split a glob into its literal base directory and the pattern below it.
///
/// `None` for the pattern means the whole glob is a literal path.
pub fn split_base(glob: &str) -> (PathBuf, Option<String>) {
    let segments: Vec<&str> = glob.split('/').collect();
    let mut base = String::new();

    for (idx, segment) in segments.iter().enumerate() {
        match literal_segment(segment) {
            Some(literal) => {
                if idx > 0 {
                    base.push('/');
                }
                base.push_str(&literal);
            }
            None => {
                let rest = segments[idx..].join("/");
                return (PathBuf::from(non_empty_base(base)), Some(rest));
            }
        }
    }

    (PathBuf::from(non_empty_base(base)), None)
}

fn non_empty_base(base: String) -> String {
    if base.is_empty() { ".".to_string() } else { base }
}

/// Compile one pattern with the crate's matching rules.
pub fn compile(pattern: &str, case_sensitive: bool) -> CopyResult<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .case_insensitive(!case_sensitive)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| CopyError::Glob {
            glob: pattern.to_string(),
            source,
        })
}

/// Compile an exclude list into a single set.
pub fn compile_set(patterns: &[String], case_sensitive: bool) -> CopyResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| CopyError::Glob {
                glob: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| CopyError::Glob {
        glob: patterns.join(", "),
        source,
    })
}

/// Dotfile rule: a `.`-prefixed segment only matches when the pattern
/// names dot segments explicitly.
pub(crate) fn dot_allowed(rel: &str, pattern: &str) -> bool {
    let explicit = pattern
        .split('/')
        .any(|seg| seg.starts_with('.') || seg.starts_with("[.]"));
    explicit || !rel.split('/').any(|seg| seg.starts_with('.'))
}

/// Resolve a glob to the absolute paths of matching regular files.
///
/// The result is sorted for deterministic downstream processing.
pub fn glob(fs: &dyn FileSystem, pattern: &str, options: &MatchOptions) -> CopyResult<Vec<PathBuf>> {
    let (base, rest) = split_base(pattern);
    let ignore = compile_set(&options.ignore, options.case_sensitive)?;
    let ignored = |path: &Path| {
        if options.ignore.is_empty() {
            return false;
        }
        let rel = path.strip_prefix(&options.cwd).unwrap_or(path);
        ignore.is_match(to_slash(rel))
    };

    let Some(rest) = rest else {
        // Literal glob: the file itself, if it is one
        let found = fs.stat(&base).map(|s| s.is_file()).unwrap_or(false);
        return Ok(if found && !ignored(&base) {
            vec![base]
        } else {
            Vec::new()
        });
    };

    let matcher = compile(&rest, options.case_sensitive)?;
    let files = match fs.walk(&base, options.follow_symlinks) {
        Ok(files) => files,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            return Err(CopyError::Read {
                path: base,
                source: err,
            });
        }
    };

    let mut matched: Vec<PathBuf> = files
        .into_iter()
        .filter(|path| {
            let Ok(rel) = path.strip_prefix(&base) else {
                return false;
            };
            let rel = to_slash(rel);
            matcher.is_match(&rel)
                && (options.dot || dot_allowed(&rel, &rest))
                && !ignored(path)
        })
        .collect();
    matched.sort();
    matched.dedup();
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    fn tree() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.write("/p/dir/a.txt", "a");
        fs.write("/p/dir/b.log", "b");
        fs.write("/p/dir/nested/c.txt", "c");
        fs.write("/p/dir/.hidden", "h");
        fs.write("/p/[v2]/x.txt", "x");
        fs
    }

    fn opts() -> MatchOptions {
        MatchOptions {
            cwd: PathBuf::from("/p"),
            ..MatchOptions::default()
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("/work/[v2]"), "/work/[[]v2[]]");
        assert_eq!(escape("/a/b(c)!"), "/a/b[(]c[)][!]");
        assert_eq!(escape("/plain/path"), "/plain/path");
    }

    #[test]
    fn test_has_magic() {
        assert!(has_magic("dir/**/*"));
        assert!(has_magic("file.{js,css}"));
        assert!(!has_magic("dir/file.txt"));
    }

    #[test]
    fn test_split_base() {
        assert_eq!(
            split_base("/p/dir/**/*.txt"),
            (PathBuf::from("/p/dir"), Some("**/*.txt".to_string()))
        );
        assert_eq!(split_base("/p/file.txt"), (PathBuf::from("/p/file.txt"), None));
        assert_eq!(
            split_base("/p/[[]v2[]]/*.txt"),
            (PathBuf::from("/p/[v2]"), Some("*.txt".to_string()))
        );
        assert_eq!(split_base("*.txt"), (PathBuf::from("."), Some("*.txt".to_string())));
    }

    #[test]
    fn test_glob_recursive() {
        let fs = tree();
        let found = glob(&fs, "/p/dir/**/*.txt", &opts()).unwrap();
        assert_eq!(
            found,
            vec![PathBuf::from("/p/dir/a.txt"), PathBuf::from("/p/dir/nested/c.txt")]
        );
    }

    #[test]
    fn test_glob_star_does_not_cross_separator() {
        let fs = tree();
        let found = glob(&fs, "/p/dir/*.txt", &opts()).unwrap();
        assert_eq!(found, vec![PathBuf::from("/p/dir/a.txt")]);
    }

    #[test]
    fn test_glob_dot_option() {
        let fs = tree();
        let without = glob(&fs, "/p/dir/**/*", &opts()).unwrap();
        assert!(!without.iter().any(|p| p.ends_with(".hidden")));

        let with = glob(
            &fs,
            "/p/dir/**/*",
            &MatchOptions {
                dot: true,
                ..opts()
            },
        )
        .unwrap();
        assert!(with.iter().any(|p| p.ends_with(".hidden")));

        let explicit = glob(&fs, "/p/dir/.hidden", &opts()).unwrap();
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn test_glob_escaped_context_stays_literal() {
        let fs = tree();
        let pattern = format!("{}/*.txt", escape("/p/[v2]"));
        let found = glob(&fs, &pattern, &opts()).unwrap();
        assert_eq!(found, vec![PathBuf::from("/p/[v2]/x.txt")]);
    }

    #[test]
    fn test_glob_ignore_relative_to_cwd() {
        let fs = tree();
        let found = glob(
            &fs,
            "/p/dir/**/*",
            &MatchOptions {
                ignore: vec!["dir/nested/**".into()],
                ..opts()
            },
        )
        .unwrap();
        assert_eq!(
            found,
            vec![PathBuf::from("/p/dir/a.txt"), PathBuf::from("/p/dir/b.log")]
        );
    }

    #[test]
    fn test_glob_missing_base_is_empty() {
        let fs = tree();
        assert!(glob(&fs, "/nowhere/**/*", &opts()).unwrap().is_empty());
    }

    #[test]
    fn test_glob_invalid_pattern() {
        let fs = tree();
        let err = glob(&fs, "/p/dir/{a", &opts()).unwrap_err();
        assert!(matches!(err, CopyError::Glob { .. }));
    }

    #[test]
    fn test_glob_case_insensitive() {
        let fs = tree();
        let found = glob(
            &fs,
            "/p/dir/*.TXT",
            &MatchOptions {
                case_sensitive: false,
                ..opts()
            },
        )
        .unwrap();
        assert_eq!(found, vec![PathBuf::from("/p/dir/a.txt")]);
    }
}
