//! assetcopy - pattern-driven asset copying for build pipelines.
//!
//! A [`CopyPlugin`] turns a list of [`Pattern`]s into assets in a build's
//! [`AssetStore`]. Each pass resolves sources (files, directories, globs),
//! plans destinations, reads and transforms content, resolves destination
//! conflicts by priority, and reports the files and directories the host
//! should watch.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use assetcopy::{Compilation, CopyOptions, CopyPlugin, DiskFs, MemoryAssetStore, Pattern};
//!
//! let plugin = CopyPlugin::new(
//!     vec![
//!         Pattern::from("robots.txt"),
//!         Pattern::new("static").to("assets/"),
//!     ],
//!     CopyOptions::default(),
//! )?;
//!
//! let mut store = MemoryAssetStore::new();
//! let mut compilation = Compilation::new("/project", Arc::new(DiskFs), &mut store)
//!     .with_output_path("/project/dist");
//! let report = plugin.run(&mut compilation).await;
//! ```

pub mod asset;
pub mod cache;
pub mod cli;
pub mod compilation;
pub mod config;
pub mod emit;
pub mod error;
pub mod fs;
pub mod glob;
pub mod hash;
pub mod logger;
pub mod pattern;
pub mod pipeline;
pub mod plan;
pub mod plugin;
pub mod resolve;
pub mod template;
pub mod transform;
pub mod utils;
pub mod watch;

pub use asset::{Asset, AssetInfo, AssetStore, DiskAssetStore, MemoryAssetStore};
pub use cache::{DiskCache, MemoryCache, TransformCache};
pub use compilation::{Compilation, Dependencies};
pub use emit::{Emission, WrittenTable};
pub use error::{CallbackKind, CopyError, CopyResult};
pub use fs::{DiskFs, FileSystem, MemoryFs};
pub use hash::ContentHash;
pub use pattern::{
    CacheSetting, GlobOptions, IgnoreEntry, Info, Pattern, Source, To, ToType, Transform,
    TransformAll,
};
pub use plugin::{CopyOptions, CopyPlugin, PassReport, PassStage};
