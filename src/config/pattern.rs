//! `[[patterns]]` entries.
//!
//! ```toml
//! patterns = [
//!     "robots.txt",
//!     { from = "static", to = "assets/", priority = 1 },
//!     { glob = "js/**/*.js", to = "[path][name].[contenthash:8].[ext]", transform = "minify", cache = true },
//! ]
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::ConfigError;
use crate::pattern::{CacheSetting, GlobOptions, IgnoreEntry, Pattern, ToType};
use crate::transform::{BUILTIN_NAMES, builtin};

/// One pattern as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PatternConfig {
    /// Bare string: probed file, directory or glob.
    Simple(String),
    Detailed(Box<PatternTable>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PatternTable {
    pub from: Option<String>,
    /// Explicit glob; mutually exclusive with `from`.
    pub glob: Option<String>,
    pub to: Option<String>,
    pub to_type: Option<ToType>,
    /// Relative values resolve against the build context.
    pub context: Option<PathBuf>,
    pub force: bool,
    pub priority: i32,
    pub flatten: bool,
    pub no_error_on_missing: bool,
    pub glob_options: GlobOptions,
    pub ignore: Vec<IgnoreEntry>,
    pub info: Option<Map<String, Value>>,
    pub test: Option<String>,
    /// Name of a built-in transform.
    pub transform: Option<String>,
    pub cache: Option<CacheField>,
}

/// `cache = true` or `cache = { key = "value", .. }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CacheField {
    Enabled(bool),
    Keys(Map<String, Value>),
}

impl From<CacheField> for CacheSetting {
    fn from(field: CacheField) -> Self {
        match field {
            CacheField::Enabled(enabled) => enabled.into(),
            CacheField::Keys(keys) => Self::Keys(keys),
        }
    }
}

impl PatternConfig {
    /// The `from` or `glob` text, for messages.
    pub fn source(&self) -> &str {
        match self {
            Self::Simple(from) => from,
            Self::Detailed(table) => table
                .from
                .as_deref()
                .or(table.glob.as_deref())
                .unwrap_or_default(),
        }
    }

    /// Build the runtime pattern.
    pub fn into_pattern(self) -> Result<Pattern, ConfigError> {
        match self {
            Self::Simple(from) => Ok(Pattern::new(from)),
            Self::Detailed(table) => table.into_pattern(),
        }
    }
}

impl PatternTable {
    fn into_pattern(self) -> Result<Pattern, ConfigError> {
        let mut pattern = match (self.from, self.glob) {
            (Some(from), None) => Pattern::new(from),
            (None, Some(glob)) => Pattern::glob(glob),
            (Some(_), Some(_)) => {
                return Err(ConfigError::validation(
                    "a pattern takes either 'from' or 'glob', not both",
                ));
            }
            (None, None) => {
                return Err(ConfigError::validation("a pattern needs 'from' or 'glob'"));
            }
        };

        if let Some(to) = self.to {
            pattern = pattern.to(to);
        }
        if let Some(to_type) = self.to_type {
            pattern = pattern.to_type(to_type);
        }
        if let Some(context) = self.context {
            pattern = pattern.context(context);
        }
        if let Some(info) = self.info {
            pattern = pattern.info(info);
        }
        if let Some(test) = self.test {
            pattern = pattern.test(test);
        }

        match (self.transform, self.cache) {
            (Some(name), cache) => {
                let transform = builtin(&name).ok_or_else(|| {
                    ConfigError::validation(format!(
                        "unknown transform '{name}' (expected one of: {})",
                        BUILTIN_NAMES.join(", ")
                    ))
                })?;
                let transform = match cache {
                    Some(cache) => transform.cache(cache),
                    None => transform,
                };
                pattern = pattern.transform(transform);
            }
            (None, Some(_)) => {
                return Err(ConfigError::validation("'cache' requires a 'transform'"));
            }
            (None, None) => {}
        }

        pattern.ignore = self.ignore;
        Ok(pattern
            .force(self.force)
            .priority(self.priority)
            .flatten(self.flatten)
            .no_error_on_missing(self.no_error_on_missing)
            .glob_options(self.glob_options))
    }
}
