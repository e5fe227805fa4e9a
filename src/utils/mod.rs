//! Utility modules shared by the library and the command line.

pub mod path;
mod plural;

pub use plural::{plural_count, plural_s};
