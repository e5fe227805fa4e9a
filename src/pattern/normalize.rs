//! Pattern normalization.
//!
//! Turns a user [`Pattern`] into a [`NormalizedPattern`] once per pass:
//!
//! ```text
//! Source::Glob{..}          → FromKind::Glob     (no probing)
//! Source::Path → stat → dir → FromKind::Dir      context = the directory
//!                     → file → FromKind::File     context = parent directory
//!                     → missing + glob syntax → FromKind::Glob
//!                     → missing               → FromKind::Missing (+ error)
//!                     → anything else         → FromKind::Unsupported
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{GlobOptions, Pattern, Source, To, ToType};
use crate::compilation::Dependencies;
use crate::error::{CopyError, CopyResult};
use crate::fs::{FileKind, FileSystem};
use crate::glob::{self, MatchOptions};
use crate::utils::path::{absolutize, extension, has_trailing_separator, to_slash};
use crate::debug;

/// `[name]`, `[contenthash:8]`, `[1]`, ... anywhere in a destination.
static TEMPLATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\\*([\w:]+)\\*\]").expect("template token regex is valid")
});

/// Resolved kind of a pattern's `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromKind {
    File,
    Dir,
    Glob,
    /// Literal path that does not exist.
    Missing,
    /// Exists but is neither file nor directory, or could not be probed.
    Unsupported,
}

/// A pattern resolved against the build context for one pass.
#[derive(Debug, Clone)]
pub struct NormalizedPattern {
    /// Declaration order in the plugin's pattern list.
    pub index: usize,
    pub pattern: Arc<Pattern>,
    /// Absolute base for relative source paths.
    pub context: PathBuf,
    pub absolute_from: PathBuf,
    pub kind: FromKind,
    /// Engine-ready glob (context escaped) for `Dir`/`Glob` kinds.
    pub glob: Option<String>,
    pub match_options: MatchOptions,
    /// `None` when `to` is a function; decided per file then.
    pub to_type: Option<ToType>,
    pub test: Option<Regex>,
}

/// Output of [`normalize`].
#[derive(Debug)]
pub struct Normalized {
    pub pattern: NormalizedPattern,
    pub dependencies: Dependencies,
    /// Missing-source error, already filtered by `no_error_on_missing`.
    pub error: Option<CopyError>,
}

/// Infer how a destination string should be read.
pub fn classify_to(to: &str) -> ToType {
    if TEMPLATE_TOKEN.is_match(to) {
        ToType::Template
    } else if extension(to).is_empty() || has_trailing_separator(to) {
        ToType::Dir
    } else {
        ToType::File
    }
}

/// Whether `to` contains template tokens.
#[inline]
pub fn is_template(to: &str) -> bool {
    TEMPLATE_TOKEN.is_match(to)
}

/// Normalize one pattern against the build context.
pub fn normalize(
    index: usize,
    pattern: Arc<Pattern>,
    build_context: &Path,
    fs: &dyn FileSystem,
) -> CopyResult<Normalized> {
    let mut context = match &pattern.context {
        Some(ctx) => absolutize(ctx, build_context),
        None => build_context.to_path_buf(),
    };

    let to_type = pattern.to_type.or_else(|| match &pattern.to {
        None => Some(ToType::Dir),
        Some(To::Path(to)) => Some(classify_to(to)),
        Some(To::Func(_)) => None,
    });

    let test = pattern
        .test
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|err| CopyError::validation(format!("invalid 'test' regex: {err}")))?;

    let mut dependencies = Dependencies::default();
    let mut error = None;

    let (kind, absolute_from, glob, options) = match &pattern.from {
        Source::Glob { glob: user_glob, options } => {
            let absolute_from = absolutize(Path::new(user_glob), &context);
            let glob = glob_for(user_glob, &context);
            dependencies.add_context(glob::split_base(&glob).0);
            let options = pattern.glob_options.merged(options);
            (FromKind::Glob, absolute_from, Some(glob), options)
        }
        Source::Path(from) => {
            let absolute_from = absolutize(Path::new(from), &context);
            let options = pattern.glob_options.clone();

            match fs.stat(&absolute_from) {
                Ok(stat) if stat.kind == FileKind::Dir => {
                    debug!("copy"; "'{}' is a directory", absolute_from.display());
                    dependencies.add_context(absolute_from.clone());
                    context = absolute_from.clone();
                    let glob = format!("{}/**/*", glob::escape(&to_slash(&absolute_from)));
                    (FromKind::Dir, absolute_from, Some(glob), dot_default(options))
                }
                Ok(stat) if stat.kind == FileKind::File => {
                    debug!("copy"; "'{}' is a file", absolute_from.display());
                    dependencies.add_file(absolute_from.clone());
                    if let Some(parent) = absolute_from.parent() {
                        context = parent.to_path_buf();
                    }
                    (FromKind::File, absolute_from, None, dot_default(options))
                }
                Ok(_) => {
                    debug!("copy"; "'{}' is neither a file nor a directory", absolute_from.display());
                    (FromKind::Unsupported, absolute_from, None, options)
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    if glob::has_magic(from) {
                        let glob = glob_for(from, &context);
                        dependencies.add_context(glob::split_base(&glob).0);
                        (FromKind::Glob, absolute_from, Some(glob), options)
                    } else {
                        if pattern.no_error_on_missing {
                            debug!("copy"; "'{}' not found, skipped (no_error_on_missing)", from);
                        } else {
                            error = Some(CopyError::MissingSource {
                                from: from.clone(),
                                path: absolute_from.clone(),
                            });
                        }
                        (FromKind::Missing, absolute_from, None, options)
                    }
                }
                Err(err) => {
                    debug!("copy"; "failed to stat '{}': {}", absolute_from.display(), err);
                    (FromKind::Unsupported, absolute_from, None, options)
                }
            }
        }
    };

    let match_options = MatchOptions {
        dot: options.dot.unwrap_or(false),
        follow_symlinks: options.follow_symlinks.unwrap_or(true),
        case_sensitive: options.case_sensitive.unwrap_or(true),
        ignore: options.ignore,
        cwd: context.clone(),
    };

    Ok(Normalized {
        pattern: NormalizedPattern {
            index,
            pattern,
            context,
            absolute_from,
            kind,
            glob,
            match_options,
            to_type,
            test,
        },
        dependencies,
        error,
    })
}

/// Files and directories include dotfiles unless told otherwise.
fn dot_default(mut options: GlobOptions) -> GlobOptions {
    options.dot.get_or_insert(true);
    options
}

/// Build the engine glob: absolute user globs are used as-is, relative
/// ones are prefixed with the escaped context.
fn glob_for(user_glob: &str, context: &Path) -> String {
    let user_glob = user_glob.replace('\\', "/");
    if Path::new(&user_glob).is_absolute() {
        user_glob
    } else {
        let user_glob = user_glob.trim_start_matches("./");
        format!("{}/{}", glob::escape(&to_slash(context)), user_glob)
    }
}
