//! Source resolution.
//!
//! Expands a [`NormalizedPattern`] into candidate source files, applies the
//! pattern's `ignore` list and `filter` callbacks, and records the
//! dependencies the host should watch.

use std::path::PathBuf;

use globset::GlobMatcher;

use crate::compilation::Dependencies;
use crate::error::{CallbackKind, CopyError, CopyResult};
use crate::fs::FileSystem;
use crate::glob;
use crate::pattern::{FilterInput, FromKind, IgnoreEntry, NormalizedPattern};
use crate::utils::path::{basename, relative_to, to_slash};
use crate::debug;

/// A matched source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub absolute_from: PathBuf,
    /// Relative to the pattern context, `/`-separated.
    pub relative_from: String,
}

/// Output of [`collect`].
#[derive(Debug, Default)]
pub struct Collected {
    pub candidates: Vec<Candidate>,
    pub dependencies: Dependencies,
    /// Set when nothing matched and the pattern does not allow that.
    pub error: Option<CopyError>,
}

// ============================================================================
// Ignore
// ============================================================================

/// A compiled `ignore` entry.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    glob: String,
    matcher: GlobMatcher,
    /// Match against the base name instead of the relative path.
    match_base: bool,
    dot: bool,
}

impl IgnoreMatcher {
    pub fn new(entry: &IgnoreEntry) -> CopyResult<Self> {
        let glob = entry.glob().replace('\\', "/");
        let (match_base, dot, case_sensitive) = match entry {
            IgnoreEntry::Glob(_) => (None, None, None),
            IgnoreEntry::Detailed {
                match_base,
                dot,
                case_sensitive,
                ..
            } => (*match_base, *dot, *case_sensitive),
        };

        let matcher = glob::compile(&glob, case_sensitive.unwrap_or(true))?;
        Ok(Self {
            match_base: match_base.unwrap_or(!glob.contains('/')),
            dot: dot.unwrap_or(true),
            matcher,
            glob,
        })
    }

    pub fn is_match(&self, relative_from: &str) -> bool {
        let subject = if self.match_base {
            basename(relative_from)
        } else {
            relative_from
        };
        self.matcher.is_match(subject) && (self.dot || glob::dot_allowed(subject, &self.glob))
    }
}

pub fn compile_ignore(entries: &[IgnoreEntry]) -> CopyResult<Vec<IgnoreMatcher>> {
    entries.iter().map(IgnoreMatcher::new).collect()
}

// ============================================================================
// Resolution
// ============================================================================

/// Expand a pattern into candidates that survive its `ignore` list.
///
/// Blocking: walks the filesystem.
pub fn collect(fs: &dyn FileSystem, pattern: &NormalizedPattern) -> CopyResult<Collected> {
    let mut out = Collected::default();

    let paths = match pattern.kind {
        FromKind::File => vec![pattern.absolute_from.clone()],
        FromKind::Dir | FromKind::Glob => match &pattern.glob {
            Some(glob) => glob::glob(fs, glob, &pattern.match_options)?,
            None => Vec::new(),
        },
        FromKind::Missing | FromKind::Unsupported => return Ok(out),
    };

    let ignore = compile_ignore(&pattern.pattern.ignore)?;

    for absolute_from in paths {
        let relative_from = to_slash(&relative_to(&absolute_from, &pattern.context));
        if ignore.iter().any(|m| m.is_match(&relative_from)) {
            debug!("copy"; "ignored '{}'", relative_from);
            continue;
        }
        if pattern.kind == FromKind::Glob {
            out.dependencies.add_file(absolute_from.clone());
        }
        out.candidates.push(Candidate {
            absolute_from,
            relative_from,
        });
    }

    if out.candidates.is_empty() && pattern.kind != FromKind::File {
        let glob = pattern.glob.clone().unwrap_or_default();
        if pattern.pattern.no_error_on_missing {
            debug!("copy"; "'{}' matched nothing, skipped (no_error_on_missing)", glob);
        } else {
            out.error = Some(CopyError::GlobNoMatch { glob });
        }
    }

    Ok(out)
}

/// Run the pattern's `filter` callbacks over `candidates`.
///
/// Rejected and failed candidates are dropped; callback failures are
/// returned alongside the survivors.
pub async fn filter(
    pattern: &NormalizedPattern,
    candidates: Vec<Candidate>,
) -> (Vec<Candidate>, Vec<CopyError>) {
    let filters = &pattern.pattern.filters;
    if filters.is_empty() || candidates.is_empty() {
        return (candidates, Vec::new());
    }

    let matched = candidates.len();
    let mut kept = Vec::with_capacity(matched);
    let mut errors = Vec::new();

    'candidates: for candidate in candidates {
        for func in filters {
            let input = FilterInput {
                absolute_filename: candidate.absolute_from.clone(),
                relative_filename: candidate.relative_from.clone(),
            };
            match func(input).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("copy"; "filtered out '{}'", candidate.relative_from);
                    continue 'candidates;
                }
                Err(err) => {
                    errors.push(CopyError::callback(
                        CallbackKind::Filter,
                        &candidate.absolute_from,
                        err,
                    ));
                    continue 'candidates;
                }
            }
        }
        kept.push(candidate);
    }

    if kept.is_empty() && errors.is_empty() && matched > 0 && !pattern.pattern.no_error_on_missing {
        let glob = pattern
            .glob
            .clone()
            .unwrap_or_else(|| to_slash(&pattern.absolute_from));
        errors.push(CopyError::FilteredOut { glob });
    }

    (kept, errors)
}
