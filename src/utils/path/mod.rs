//! Path utilities.
//!
//! Pure functions for path manipulation; nothing here touches the filesystem.
//!
//! - [`fs`]: Filesystem path normalization (`lexical_normalize`, `absolutize`, `relative_to`)
//! - [`slash`]: Forward-slash destination strings (`to_slash`, `normalize_slashes`)

pub mod fs;
pub mod slash;

pub use fs::{absolutize, lexical_normalize, relative_to};
pub use slash::{basename, extension, has_trailing_separator, join_slash, normalize_slashes, to_slash};
