//! Content pipeline.
//!
//! Turns one resolved candidate into an emission [`Materialized`] record:
//!
//! ```text
//! destination (to / toType) → read → transform (cached) → template
//!     → transformPath → info
//! ```
//!
//! `transform_all` patterns stop after the transform step; their files are
//! combined by [`combine`] into a single record.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::asset::AssetInfo;
use crate::cache::{TransformCache, default_keys, fingerprint};
use crate::error::{CallbackKind, CopyError, CopyResult};
use crate::fs::FileSystem;
use crate::hash::{ContentHash, KeyHasher};
use crate::pattern::{
    BoxFuture, CacheSetting, Info, InfoInput, NormalizedPattern, To, ToInput, ToType,
    TransformAllInput, classify_to,
};
use crate::plan::{PlanInput, plan, relativize};
use crate::resolve::Candidate;
use crate::template::{self, TemplateData};
use crate::utils::path::{basename, normalize_slashes, relative_to, to_slash};
use crate::debug;

/// Shared, read-only state of one pass.
pub struct PipelineContext {
    pub fs: Arc<dyn FileSystem>,
    pub cache: Arc<dyn TransformCache>,
    /// Absolute build context.
    pub context: PathBuf,
    pub output_path: Option<PathBuf>,
}

/// A file ready for conflict resolution.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// Declaration index of the owning pattern.
    pub index: usize,
    pub priority: i32,
    pub force: bool,
    /// Final destination, `/`-separated and relative to the output root.
    pub filename: String,
    pub source: Vec<u8>,
    pub info: AssetInfo,
    pub absolute_from: Option<PathBuf>,
}

/// A file after read and transform, before naming.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub candidate: Candidate,
    pub data: Vec<u8>,
    /// Relative to the build context.
    pub source_filename: String,
}

// ============================================================================
// Per-file steps
// ============================================================================

/// Read a candidate and apply the pattern's `transform`.
pub async fn load(
    ctx: &PipelineContext,
    pattern: &NormalizedPattern,
    candidate: Candidate,
) -> CopyResult<Loaded> {
    let path = candidate.absolute_from.clone();
    let fs = Arc::clone(&ctx.fs);
    let data = blocking(move || fs.read(&path))
        .await
        .map_err(|source| CopyError::Read {
            path: candidate.absolute_from.clone(),
            source,
        })?;

    let data = match &pattern.pattern.transform {
        Some(transform) => {
            let content_hash = ContentHash::of(&data);
            let func = Arc::clone(&transform.func);
            let path = candidate.absolute_from.clone();
            run_cached(
                ctx,
                &transform.id,
                &transform.cache,
                content_hash,
                &candidate.absolute_from,
                CallbackKind::Transform,
                move || func(data, path),
            )
            .await?
        }
        None => data,
    };

    let source_filename = to_slash(&relative_to(&candidate.absolute_from, &ctx.context));
    Ok(Loaded {
        candidate,
        data,
        source_filename,
    })
}

/// Run a file through the whole pipeline.
pub async fn materialize(
    ctx: &PipelineContext,
    pattern: &NormalizedPattern,
    candidate: Candidate,
) -> CopyResult<Materialized> {
    let user = &pattern.pattern;
    let absolute_from = candidate.absolute_from.clone();

    let (to, to_type) = match &user.to {
        Some(To::Func(func)) => {
            let input = ToInput {
                context: pattern.context.clone(),
                absolute_filename: Some(absolute_from.clone()),
            };
            let to = func(input)
                .await
                .map_err(|err| CopyError::callback(CallbackKind::To, &absolute_from, err))?;
            let to_type = pattern.to_type.unwrap_or_else(|| classify_to(&to));
            (Some(to), to_type)
        }
        Some(To::Path(to)) => (Some(to.clone()), pattern.to_type.unwrap_or(ToType::Dir)),
        None => (None, pattern.to_type.unwrap_or(ToType::Dir)),
    };

    let mut filename = plan(PlanInput {
        to: to.as_deref(),
        to_type,
        relative_from: &candidate.relative_from,
        flatten: user.flatten,
        output_path: ctx.output_path.as_deref(),
    })?;

    let relative_from = if user.flatten {
        basename(&candidate.relative_from).to_string()
    } else {
        candidate.relative_from.clone()
    };

    let loaded = load(ctx, pattern, candidate).await?;
    let mut immutable = false;

    if to_type == ToType::Template {
        let captures = pattern
            .test
            .as_ref()
            .map(|regex| template::captures(regex, &to_slash(&absolute_from)))
            .unwrap_or_default();
        let interpolated = template::interpolate(
            &filename,
            &TemplateData {
                relative_from: &relative_from,
                content_hash: ContentHash::of(&loaded.data),
                captures: &captures,
            },
        );
        immutable = interpolated.immutable;
        filename = interpolated.filename;
    }

    if let Some(func) = &user.transform_path {
        filename = func(filename, absolute_from.clone())
            .await
            .map_err(|err| CopyError::callback(CallbackKind::TransformPath, &absolute_from, err))?;
    }
    let filename = normalize_slashes(&relativize(&filename, ctx.output_path.as_deref())?);

    let info = asset_info(
        user.info.as_ref(),
        InfoInput {
            absolute_filename: absolute_from.clone(),
            source_filename: loaded.source_filename.clone(),
            filename: filename.clone(),
        },
        immutable,
    );

    debug!("copy"; "'{}' -> '{}'", loaded.source_filename, filename);
    Ok(Materialized {
        index: pattern.index,
        priority: user.priority,
        force: user.force,
        filename,
        source: loaded.data,
        info,
        absolute_from: Some(absolute_from),
    })
}

// ============================================================================
// transform_all
// ============================================================================

/// Combine every loaded file of a pattern into one record.
///
/// `files` must be in a deterministic order; the combined output and its
/// cache fingerprint depend on it.
pub async fn combine(
    ctx: &PipelineContext,
    pattern: &NormalizedPattern,
    files: Vec<Loaded>,
) -> CopyResult<Materialized> {
    let user = &pattern.pattern;
    let Some(transform_all) = &user.transform_all else {
        return Err(CopyError::validation("pattern has no transform_all"));
    };

    let to = match &user.to {
        Some(To::Path(to)) => to.clone(),
        Some(To::Func(func)) => {
            let input = ToInput {
                context: pattern.context.clone(),
                absolute_filename: None,
            };
            func(input)
                .await
                .map_err(|err| CopyError::callback(CallbackKind::To, &pattern.context, err))?
        }
        None => return Err(CopyError::validation("transform_all requires 'to'")),
    };

    let mut inputs_hash = KeyHasher::new();
    for file in &files {
        inputs_hash
            .part(&file.source_filename)
            .part(ContentHash::of(&file.data).as_bytes());
    }

    let inputs: Vec<TransformAllInput> = files
        .into_iter()
        .map(|file| TransformAllInput {
            data: file.data,
            source_filename: file.source_filename,
            absolute_filename: file.candidate.absolute_from,
        })
        .collect();

    let func = Arc::clone(&transform_all.func);
    let data = run_cached(
        ctx,
        &transform_all.id,
        &transform_all.cache,
        inputs_hash.finish(),
        &pattern.context,
        CallbackKind::TransformAll,
        move || func(inputs),
    )
    .await?;

    let interpolated = template::interpolate_hash(&to, ContentHash::of(&data));
    let filename = normalize_slashes(&relativize(
        &interpolated.filename,
        ctx.output_path.as_deref(),
    )?);

    let info = asset_info(
        user.info.as_ref(),
        InfoInput {
            absolute_filename: pattern.absolute_from.clone(),
            source_filename: String::new(),
            filename: filename.clone(),
        },
        interpolated.immutable,
    );

    debug!("copy"; "transform_all '{}' -> '{}'", transform_all.id, filename);
    Ok(Materialized {
        index: pattern.index,
        priority: user.priority,
        force: user.force,
        filename,
        source: data,
        info: AssetInfo {
            source_filename: None,
            ..info
        },
        absolute_from: None,
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Run a transform, consulting the cache when the setting asks for it.
///
/// `run` is only called on a cache miss.
async fn run_cached<F>(
    ctx: &PipelineContext,
    id: &str,
    setting: &CacheSetting,
    content_hash: ContentHash,
    path: &Path,
    kind: CallbackKind,
    run: F,
) -> CopyResult<Vec<u8>>
where
    F: FnOnce() -> BoxFuture<anyhow::Result<Vec<u8>>>,
{
    let key = match setting {
        CacheSetting::Off => None,
        CacheSetting::On => Some(fingerprint(&default_keys(id, content_hash))),
        CacheSetting::Keys(extra) => {
            let mut keys = default_keys(id, content_hash);
            keys.extend(extra.clone());
            Some(fingerprint(&keys))
        }
        CacheSetting::KeysFn(func) => {
            let keys = func(default_keys(id, content_hash), path.to_path_buf())
                .await
                .map_err(|err| CopyError::callback(CallbackKind::CacheKeys, path, err))?;
            Some(fingerprint(&keys))
        }
    };

    if let Some(key) = key {
        let cache = Arc::clone(&ctx.cache);
        let hit = blocking(move || Ok(cache.get(&key))).await.ok().flatten();
        if let Some(data) = hit {
            debug!("cache"; "hit {} for '{}'", key, path.display());
            return Ok(data);
        }
        debug!("cache"; "miss {} for '{}'", key, path.display());
    }

    let data = run()
        .await
        .map_err(|err| CopyError::callback(kind, path, err))?;

    if let Some(key) = key {
        let cache = Arc::clone(&ctx.cache);
        let stored = data.clone();
        if let Err(err) = blocking(move || cache.put(&key, &stored)).await {
            debug!("cache"; "failed to store {}: {}", key, err);
        }
    }
    Ok(data)
}

fn asset_info(info: Option<&Info>, input: InfoInput, immutable: bool) -> AssetInfo {
    let source_filename = Some(input.source_filename.clone());
    let extra = match info {
        Some(Info::Static(map)) => map.clone(),
        Some(Info::Func(func)) => func(input),
        None => Default::default(),
    };
    AssetInfo {
        copied: true,
        source_filename,
        immutable,
        extra,
    }
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(work: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(io::Error::other)?
}
