//! Error types for copy passes.
//!
//! Construction-time problems surface as [`CopyError::Validation`] from
//! [`CopyPlugin::new`](crate::CopyPlugin::new). Everything else is recorded
//! per pattern or per file into the compilation's error/warning lists and
//! never aborts sibling work.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for fallible copy operations.
pub type CopyResult<T> = Result<T, CopyError>;

/// Which user callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Filter,
    Transform,
    TransformPath,
    TransformAll,
    To,
    CacheKeys,
}

impl CallbackKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Transform => "transform",
            Self::TransformPath => "transformPath",
            Self::TransformAll => "transformAll",
            Self::To => "to",
            Self::CacheKeys => "cache keys",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum CopyError {
    /// Malformed patterns or options, raised at construction.
    #[error("invalid options: {0}")]
    Validation(String),

    /// A literal `from` that does not exist.
    #[error("unable to locate '{from}' at '{}'", .path.display())]
    MissingSource { from: String, path: PathBuf },

    /// A glob that matched nothing.
    #[error("unable to locate '{glob}' glob")]
    GlobNoMatch { glob: String },

    /// A glob whose matches were all rejected by `filter`.
    #[error("unable to locate '{glob}' glob after filtering paths")]
    FilteredOut { glob: String },

    #[error("invalid glob '{glob}'")]
    Glob {
        glob: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to read '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} failed for '{}'", .path.display())]
    Callback {
        kind: CallbackKind,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Absolute `to` with no output root to relativize against.
    #[error(
        "using an absolute path in 'to' ('{to}') requires an output path to be configured"
    )]
    OutputPath { to: String },

    #[error("failed to emit '{filename}'")]
    Emit {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pattern #{index} did not complete: {message}")]
    Task { index: usize, message: String },
}

impl CopyError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn callback(
        kind: CallbackKind,
        path: impl Into<PathBuf>,
        source: anyhow::Error,
    ) -> Self {
        Self::Callback {
            kind,
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the "not found" family that
    /// `noErrorOnMissing` suppresses.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Self::MissingSource { .. } | Self::GlobNoMatch { .. } | Self::FilteredOut { .. }
        )
    }

    /// Render the error with its full source chain on one line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}
