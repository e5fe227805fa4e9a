//! User callback types.
//!
//! Every callback is stored as an `Arc<dyn Fn(..) -> BoxFuture<..>>`.
//! Synchronous closures are wrapped in a ready future, so the pipeline has
//! a single await path regardless of how the user wrote the function.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Arguments passed to `filter`.
#[derive(Debug, Clone)]
pub struct FilterInput {
    pub absolute_filename: PathBuf,
    /// Relative to the pattern context, `/`-separated.
    pub relative_filename: String,
}

/// Arguments passed to a `to` function.
#[derive(Debug, Clone)]
pub struct ToInput {
    pub context: PathBuf,
    /// `None` when called once for a `transform_all` result.
    pub absolute_filename: Option<PathBuf>,
}

/// One source file handed to `transform_all`.
#[derive(Debug, Clone)]
pub struct TransformAllInput {
    pub data: Vec<u8>,
    /// Relative to the build context, `/`-separated.
    pub source_filename: String,
    pub absolute_filename: PathBuf,
}

/// Arguments passed to an `info` function.
#[derive(Debug, Clone)]
pub struct InfoInput {
    pub absolute_filename: PathBuf,
    pub source_filename: String,
    pub filename: String,
}

pub type FilterFn = Arc<dyn Fn(FilterInput) -> BoxFuture<Result<bool>> + Send + Sync>;
pub type ToFn = Arc<dyn Fn(ToInput) -> BoxFuture<Result<String>> + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(Vec<u8>, PathBuf) -> BoxFuture<Result<Vec<u8>>> + Send + Sync>;
pub type TransformPathFn = Arc<dyn Fn(String, PathBuf) -> BoxFuture<Result<String>> + Send + Sync>;
pub type TransformAllFn =
    Arc<dyn Fn(Vec<TransformAllInput>) -> BoxFuture<Result<Vec<u8>>> + Send + Sync>;
pub type InfoFn = Arc<dyn Fn(InfoInput) -> Map<String, Value> + Send + Sync>;
/// Receives the default cache keys and the source path, returns the final keys.
pub type CacheKeysFn =
    Arc<dyn Fn(Map<String, Value>, PathBuf) -> BoxFuture<Result<Map<String, Value>>> + Send + Sync>;

/// Wrap a synchronous result in a ready future.
#[inline]
pub(crate) fn ready<T: Send + 'static>(value: T) -> BoxFuture<T> {
    Box::pin(std::future::ready(value))
}

/// Box an async closure's future.
#[inline]
pub(crate) fn boxed<F, T>(future: F) -> BoxFuture<T>
where
    F: Future<Output = T> + Send + 'static,
{
    Box::pin(future)
}
