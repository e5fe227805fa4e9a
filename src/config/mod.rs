//! Project configuration for `assetcopy.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── error.rs    # ConfigError
//! ├── pattern.rs  # [[patterns]] entries
//! ├── util.rs     # config file discovery
//! └── mod.rs      # CopyConfig (this file)
//! ```
//!
//! # Keys
//!
//! | Key           | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | `context`     | Build context, relative sources resolve here     |
//! | `output`      | Output directory assets are written to           |
//! | `concurrency` | Maximum in-flight file operations                |
//! | `[cache]`     | Persistent transform cache (`enable`, `dir`)     |
//! | `patterns`    | Copy patterns, strings or tables                 |

mod error;
mod pattern;
mod util;

pub use error::ConfigError;
pub use pattern::{CacheField, PatternConfig, PatternTable};
pub use util::find_config_file;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cache::{CACHE_DIR, DiskCache};
use crate::log;
use crate::pattern::Pattern;
use crate::plugin::{CopyOptions, DEFAULT_CONCURRENCY};
use crate::utils::path::absolutize;

/// Default config file name.
pub const CONFIG_FILE: &str = "assetcopy.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing `assetcopy.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory holding the config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Build context; defaults to the config file's directory.
    pub context: Option<PathBuf>,

    pub output: PathBuf,

    pub concurrency: usize,

    pub cache: CacheConfig,

    pub patterns: Vec<PatternConfig>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            context: None,
            output: PathBuf::from("dist"),
            concurrency: DEFAULT_CONCURRENCY,
            cache: CacheConfig::default(),
            patterns: Vec::new(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enable: bool,
    /// Defaults to `.assetcopy/cache` inside the context.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            dir: None,
        }
    }
}

/// Command line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub context: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

impl CopyConfig {
    /// Load, resolve and validate a config file.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self> {
        let mut config = Self::from_path(path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        config.config_path = path.to_path_buf();
        config.finalize(&root, overrides);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    pub fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Apply overrides and make every path absolute.
    ///
    /// Relative paths in the file resolve against `root`; relative command
    /// line paths were already resolved against the working directory.
    fn finalize(&mut self, root: &Path, overrides: &Overrides) {
        let root = absolutize(root, &std::env::current_dir().unwrap_or_default());
        Self::update_option(&mut self.context, overrides.context.clone());
        Self::update_option(&mut self.output, overrides.output.clone());
        Self::update_option(&mut self.concurrency, overrides.concurrency);

        let context = absolutize(self.context.as_deref().unwrap_or(root.as_path()), &root);
        self.output = absolutize(&self.output, &root);
        self.cache.dir = Some(match self.cache.dir.take() {
            Some(dir) => absolutize(&dir, &root),
            None => context.join(CACHE_DIR),
        });
        self.context = Some(context);
        self.root = root;
    }

    /// Update config option if a command line value is provided.
    fn update_option<T>(config_option: &mut T, cli_option: Option<impl Into<T>>) {
        if let Some(option) = cli_option {
            *config_option = option.into();
        }
    }

    /// Check values the plugin would reject, with config-file wording.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patterns.is_empty() {
            return Err(ConfigError::validation("'patterns' must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::validation("'concurrency' must be at least 1"));
        }
        Ok(())
    }

    /// Absolute build context.
    pub fn context(&self) -> PathBuf {
        self.context.clone().unwrap_or_else(|| self.root.clone())
    }

    /// Convert `[[patterns]]` into runtime patterns.
    pub fn build_patterns(&self) -> Result<Vec<Pattern>, ConfigError> {
        self.patterns
            .iter()
            .enumerate()
            .map(|(index, pattern)| {
                pattern.clone().into_pattern().map_err(|err| match err {
                    ConfigError::Validation(message) => ConfigError::validation(format!(
                        "patterns[{index}] ('{}'): {message}",
                        pattern.source()
                    )),
                    other => other,
                })
            })
            .collect()
    }

    /// Plugin options, with a disk cache when `[cache]` is enabled.
    pub fn copy_options(&self) -> CopyOptions {
        let options = CopyOptions::default().concurrency(self.concurrency);
        match (self.cache.enable, &self.cache.dir) {
            (true, Some(dir)) => options.cache(Arc::new(DiskCache::new(dir))),
            (true, None) => options.cache(Arc::new(DiskCache::in_root(&self.context()))),
            (false, _) => options,
        }
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_defaults() {
        let (config, ignored) = CopyConfig::parse_with_ignored(r#"patterns = ["a.txt"]"#).unwrap();
        assert!(ignored.is_empty());
        assert_eq!(config.output, PathBuf::from("dist"));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.cache.enable);
        assert_eq!(config.patterns.len(), 1);
    }

    #[test]
    fn test_unknown_fields_are_collected() {
        let content = r#"
            output = "public"
            unknown_key = 1

            [cache]
            enable = false
            ttl = 10
        "#;
        let (config, ignored) = CopyConfig::parse_with_ignored(content).unwrap();
        assert_eq!(config.output, PathBuf::from("public"));
        assert!(!config.cache.enable);
        assert!(ignored.iter().any(|f| f == "unknown_key"));
        assert!(ignored.iter().any(|f| f == "cache.ttl"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = CopyConfig::parse_with_ignored("patterns = [").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_resolves_paths_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
            context = "site"
            output = "public"
            patterns = ["static"]
            "#,
        )
        .unwrap();

        let config = CopyConfig::load(&path, &Overrides::default()).unwrap();
        assert_eq!(config.context(), dir.path().join("site"));
        assert_eq!(config.output, dir.path().join("public"));
        assert_eq!(config.cache.dir, Some(dir.path().join("site").join(CACHE_DIR)));
    }

    #[test]
    fn test_overrides_win() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "concurrency = 8\npatterns = [\"a\"]").unwrap();

        let overrides = Overrides {
            output: Some(dir.path().join("elsewhere")),
            concurrency: Some(2),
            ..Overrides::default()
        };
        let config = CopyConfig::load(&path, &overrides).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.output, dir.path().join("elsewhere"));
        assert_eq!(config.context(), dir.path());
    }

    #[test]
    fn test_validate() {
        let (config, _) = CopyConfig::parse_with_ignored("").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let (config, _) = CopyConfig::parse_with_ignored("concurrency = 0\npatterns = [\"a\"]").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_build_patterns_reports_index() {
        let (config, _) =
            CopyConfig::parse_with_ignored(r#"patterns = ["a", { from = "b", transform = "nope" }]"#)
                .unwrap();
        let err = config.build_patterns().unwrap_err();
        assert!(err.to_string().contains("patterns[1]"));
        assert!(err.to_string().contains("'b'"));
    }
}
