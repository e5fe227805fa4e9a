//! Copy patterns.
//!
//! A [`Pattern`] is one user-declared "copy these sources to there" rule.
//! Patterns are immutable once handed to [`CopyPlugin`](crate::CopyPlugin);
//! each build pass normalizes them into [`NormalizedPattern`]s.
//!
//! # Example
//!
//! ```ignore
//! let patterns = vec![
//!     Pattern::from("robots.txt"),
//!     Pattern::new("static").to("assets/").priority(1),
//!     Pattern::glob("docs/**/*.md")
//!         .to("[path][name].[contenthash:8].[ext]")
//!         .ignore("drafts/**"),
//! ];
//! ```

mod callback;
mod normalize;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use callback::{
    BoxFuture, CacheKeysFn, FilterFn, FilterInput, InfoFn, InfoInput, ToFn, ToInput,
    TransformAllFn, TransformAllInput, TransformFn, TransformPathFn,
};
pub(crate) use callback::{boxed, ready};
pub use normalize::{FromKind, Normalized, NormalizedPattern, classify_to, is_template, normalize};

// ============================================================================
// Source
// ============================================================================

/// Where a pattern copies from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A file, directory or glob; the kind is decided by probing.
    Path(String),
    /// An explicit glob with its own options; never probed.
    Glob { glob: String, options: GlobOptions },
}

impl Source {
    /// The user-facing text of the source.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(path) => path,
            Self::Glob { glob, .. } => glob,
        }
    }
}

/// Options forwarded to the glob engine.
///
/// Unset fields fall back to the engine defaults for the source kind:
/// dotfiles are included for files and directories but not for globs,
/// symlinks are followed, matching is case sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobOptions {
    pub dot: Option<bool>,
    pub follow_symlinks: Option<bool>,
    pub case_sensitive: Option<bool>,
    /// Exclude globs matched against the full path relative to the context.
    pub ignore: Vec<String>,
}

impl GlobOptions {
    /// Overlay `other` on top of `self`.
    pub(crate) fn merged(&self, other: &GlobOptions) -> GlobOptions {
        GlobOptions {
            dot: other.dot.or(self.dot),
            follow_symlinks: other.follow_symlinks.or(self.follow_symlinks),
            case_sensitive: other.case_sensitive.or(self.case_sensitive),
            ignore: self.ignore.iter().chain(&other.ignore).cloned().collect(),
        }
    }
}

// ============================================================================
// Destination
// ============================================================================

/// Where a pattern copies to.
#[derive(Clone)]
pub enum To {
    Path(String),
    /// Computed per file (or once for `transform_all`).
    Func(ToFn),
}

impl fmt::Debug for To {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// How `to` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToType {
    /// `to` is the exact destination file name.
    File,
    /// `to` is a directory; the relative source path is appended.
    Dir,
    /// `to` contains `[token]`s interpolated per file.
    Template,
}

// ============================================================================
// Ignore
// ============================================================================

/// One entry of a pattern's `ignore` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreEntry {
    /// Matched by base name when it has no `/`.
    Glob(String),
    Detailed {
        glob: String,
        #[serde(default)]
        match_base: Option<bool>,
        #[serde(default)]
        dot: Option<bool>,
        #[serde(default)]
        case_sensitive: Option<bool>,
    },
}

impl IgnoreEntry {
    pub fn glob(&self) -> &str {
        match self {
            Self::Glob(glob) | Self::Detailed { glob, .. } => glob,
        }
    }
}

impl From<&str> for IgnoreEntry {
    fn from(glob: &str) -> Self {
        Self::Glob(glob.to_string())
    }
}

impl From<String> for IgnoreEntry {
    fn from(glob: String) -> Self {
        Self::Glob(glob)
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// Whether and how a transform result is cached.
#[derive(Clone, Default)]
pub enum CacheSetting {
    #[default]
    Off,
    On,
    /// Cache with extra keys mixed into the fingerprint.
    Keys(Map<String, Value>),
    /// Cache with keys computed per file.
    KeysFn(CacheKeysFn),
}

impl CacheSetting {
    /// Cache with keys computed per file from the default keys.
    pub fn keys_fn<F>(func: F) -> Self
    where
        F: Fn(Map<String, Value>, &Path) -> Result<Map<String, Value>> + Send + Sync + 'static,
    {
        Self::KeysFn(Arc::new(move |keys: Map<String, Value>, path: PathBuf| {
            ready(func(keys, &path))
        }))
    }

    pub fn keys_fn_async<F, Fut>(func: F) -> Self
    where
        F: Fn(Map<String, Value>, PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Map<String, Value>>> + Send + 'static,
    {
        Self::KeysFn(Arc::new(move |keys: Map<String, Value>, path: PathBuf| {
            boxed(func(keys, path))
        }))
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl fmt::Debug for CacheSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::On => f.write_str("On"),
            Self::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            Self::KeysFn(_) => f.write_str("KeysFn(..)"),
        }
    }
}

impl From<bool> for CacheSetting {
    fn from(enabled: bool) -> Self {
        if enabled { Self::On } else { Self::Off }
    }
}

/// A per-file content transform.
///
/// The `id` identifies the transform in cache fingerprints; change it
/// whenever the transform's behavior changes.
#[derive(Clone)]
pub struct Transform {
    pub id: String,
    pub func: TransformFn,
    pub cache: CacheSetting,
}

impl Transform {
    pub fn new<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<u8>, &Path) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(move |data: Vec<u8>, path: PathBuf| ready(func(data, &path))),
            cache: CacheSetting::Off,
        }
    }

    pub fn new_async<F, Fut>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<u8>, PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(move |data: Vec<u8>, path: PathBuf| boxed(func(data, path))),
            cache: CacheSetting::Off,
        }
    }

    pub fn cache(mut self, cache: impl Into<CacheSetting>) -> Self {
        self.cache = cache.into();
        self
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("id", &self.id)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// A transform run once over every file matched by a pattern.
#[derive(Clone)]
pub struct TransformAll {
    pub id: String,
    pub func: TransformAllFn,
    pub cache: CacheSetting,
}

impl TransformAll {
    pub fn new<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<TransformAllInput>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(move |inputs: Vec<TransformAllInput>| ready(func(inputs))),
            cache: CacheSetting::Off,
        }
    }

    pub fn new_async<F, Fut>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<TransformAllInput>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(move |inputs: Vec<TransformAllInput>| boxed(func(inputs))),
            cache: CacheSetting::Off,
        }
    }

    pub fn cache(mut self, cache: impl Into<CacheSetting>) -> Self {
        self.cache = cache.into();
        self
    }
}

impl fmt::Debug for TransformAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformAll")
            .field("id", &self.id)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Extra asset metadata attached to emitted files.
#[derive(Clone)]
pub enum Info {
    Static(Map<String, Value>),
    Func(InfoFn),
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

// ============================================================================
// Pattern
// ============================================================================

/// A source-to-destination copy rule.
#[derive(Clone)]
pub struct Pattern {
    pub from: Source,
    pub to: Option<To>,
    pub to_type: Option<ToType>,
    /// Base directory for a relative `from`; relative values are joined
    /// with the build context.
    pub context: Option<PathBuf>,
    pub filters: Vec<FilterFn>,
    pub transform: Option<Transform>,
    pub transform_all: Option<TransformAll>,
    pub transform_path: Option<TransformPathFn>,
    pub force: bool,
    pub priority: i32,
    pub no_error_on_missing: bool,
    pub glob_options: GlobOptions,
    pub ignore: Vec<IgnoreEntry>,
    pub flatten: bool,
    /// Regex whose capture groups feed `[N]` template tokens.
    pub test: Option<String>,
    pub info: Option<Info>,
}

impl Pattern {
    /// A pattern whose kind (file, directory, glob) is probed at build time.
    pub fn new(from: impl Into<String>) -> Self {
        Self::with_source(Source::Path(from.into()))
    }

    /// A pattern with an explicit glob, bypassing filesystem probing.
    pub fn glob(glob: impl Into<String>) -> Self {
        Self::with_source(Source::Glob {
            glob: glob.into(),
            options: GlobOptions::default(),
        })
    }

    fn with_source(from: Source) -> Self {
        Self {
            from,
            to: None,
            to_type: None,
            context: None,
            filters: Vec::new(),
            transform: None,
            transform_all: None,
            transform_path: None,
            force: false,
            priority: 0,
            no_error_on_missing: false,
            glob_options: GlobOptions::default(),
            ignore: Vec::new(),
            flatten: false,
            test: None,
            info: None,
        }
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(To::Path(to.into()));
        self
    }

    pub fn to_fn<F>(mut self, func: F) -> Self
    where
        F: Fn(ToInput) -> Result<String> + Send + Sync + 'static,
    {
        self.to = Some(To::Func(Arc::new(move |input: ToInput| ready(func(input)))));
        self
    }

    pub fn to_fn_async<F, Fut>(mut self, func: F) -> Self
    where
        F: Fn(ToInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.to = Some(To::Func(Arc::new(move |input: ToInput| boxed(func(input)))));
        self
    }

    pub fn to_type(mut self, to_type: ToType) -> Self {
        self.to_type = Some(to_type);
        self
    }

    pub fn context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a filter; a file is copied only if every filter accepts it.
    pub fn filter<F>(mut self, func: F) -> Self
    where
        F: Fn(&FilterInput) -> Result<bool> + Send + Sync + 'static,
    {
        self.filters
            .push(Arc::new(move |input: FilterInput| ready(func(&input))));
        self
    }

    pub fn filter_async<F, Fut>(mut self, func: F) -> Self
    where
        F: Fn(FilterInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        self.filters
            .push(Arc::new(move |input: FilterInput| boxed(func(input))));
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn transform_all(mut self, transform: TransformAll) -> Self {
        self.transform_all = Some(transform);
        self
    }

    /// Rename the destination once content is known.
    pub fn transform_path<F>(mut self, func: F) -> Self
    where
        F: Fn(&str, &Path) -> Result<String> + Send + Sync + 'static,
    {
        self.transform_path = Some(Arc::new(move |target: String, path: PathBuf| {
            ready(func(&target, &path))
        }));
        self
    }

    pub fn transform_path_async<F, Fut>(mut self, func: F) -> Self
    where
        F: Fn(String, PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.transform_path = Some(Arc::new(move |target: String, path: PathBuf| {
            boxed(func(target, path))
        }));
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn no_error_on_missing(mut self, value: bool) -> Self {
        self.no_error_on_missing = value;
        self
    }

    pub fn glob_options(mut self, options: GlobOptions) -> Self {
        self.glob_options = options;
        self
    }

    pub fn ignore(mut self, entry: impl Into<IgnoreEntry>) -> Self {
        self.ignore.push(entry.into());
        self
    }

    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn test(mut self, regex: impl Into<String>) -> Self {
        self.test = Some(regex.into());
        self
    }

    pub fn info(mut self, info: Map<String, Value>) -> Self {
        self.info = Some(Info::Static(info));
        self
    }

    pub fn info_fn<F>(mut self, func: F) -> Self
    where
        F: Fn(InfoInput) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.info = Some(Info::Func(Arc::new(func)));
        self
    }
}

impl From<&str> for Pattern {
    fn from(from: &str) -> Self {
        Self::new(from)
    }
}

impl From<String> for Pattern {
    fn from(from: String) -> Self {
        Self::new(from)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("to_type", &self.to_type)
            .field("context", &self.context)
            .field("filters", &self.filters.len())
            .field("transform", &self.transform)
            .field("transform_all", &self.transform_all)
            .field("transform_path", &self.transform_path.is_some())
            .field("force", &self.force)
            .field("priority", &self.priority)
            .field("no_error_on_missing", &self.no_error_on_missing)
            .field("glob_options", &self.glob_options)
            .field("ignore", &self.ignore)
            .field("flatten", &self.flatten)
            .field("test", &self.test)
            .field("info", &self.info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_string_is_probed_path() {
        let pattern = Pattern::from("file.txt");
        assert_eq!(pattern.from, Source::Path("file.txt".into()));
        assert!(pattern.to.is_none());
        assert_eq!(pattern.priority, 0);
    }

    #[test]
    fn test_glob_source() {
        let pattern = Pattern::glob("**/*.css");
        assert!(matches!(pattern.from, Source::Glob { .. }));
        assert_eq!(pattern.from.as_str(), "**/*.css");
    }

    #[test]
    fn test_glob_options_merge() {
        let base = GlobOptions {
            dot: Some(true),
            ignore: vec!["a".into()],
            ..GlobOptions::default()
        };
        let overlay = GlobOptions {
            dot: Some(false),
            case_sensitive: Some(false),
            ignore: vec!["b".into()],
            ..GlobOptions::default()
        };
        let merged = base.merged(&overlay);
        assert_eq!(merged.dot, Some(false));
        assert_eq!(merged.case_sensitive, Some(false));
        assert_eq!(merged.follow_symlinks, None);
        assert_eq!(merged.ignore, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_ignore_entry_deserialize() {
        let entries: Vec<IgnoreEntry> =
            serde_json::from_str(r#"["*.log", {"glob": "tmp/**", "match_base": false}]"#).unwrap();
        assert_eq!(entries[0], IgnoreEntry::Glob("*.log".into()));
        assert_eq!(entries[1].glob(), "tmp/**");
    }

    #[test]
    fn test_cache_setting_from_bool() {
        assert!(CacheSetting::from(true).is_enabled());
        assert!(!CacheSetting::from(false).is_enabled());
        assert!(CacheSetting::Keys(Map::new()).is_enabled());
    }

    #[tokio::test]
    async fn test_async_callbacks() {
        let pattern = Pattern::new("src")
            .to_fn_async(|input: ToInput| async move {
                Ok(format!("{}/out/", input.context.display()))
            })
            .transform_path_async(|target: String, _| async move { Ok(target.to_uppercase()) });

        let Some(To::Func(to)) = &pattern.to else {
            panic!("expected a `to` function");
        };
        let to = to(ToInput {
            context: PathBuf::from("/p"),
            absolute_filename: None,
        })
        .await
        .unwrap();
        assert_eq!(to, "/p/out/");

        let rename = pattern.transform_path.as_ref().unwrap();
        let renamed = rename("a.txt".into(), PathBuf::from("/p/src/a.txt")).await.unwrap();
        assert_eq!(renamed, "A.TXT");
    }

    #[tokio::test]
    async fn test_sync_filter_is_wrapped() {
        let pattern = Pattern::new("dir").filter(|input| Ok(input.relative_filename.ends_with(".txt")));
        let filter = &pattern.filters[0];

        let keep = filter(FilterInput {
            absolute_filename: PathBuf::from("/p/dir/a.txt"),
            relative_filename: "a.txt".into(),
        })
        .await
        .unwrap();
        assert!(keep);
    }
}
