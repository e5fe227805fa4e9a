//! The copy plugin and its build pass.
//!
//! A pass walks a fixed sequence of stages:
//!
//! ```text
//! Idle → Normalizing → Resolving → Planning → Transforming
//!      → ResolvingConflicts → Emitted
//! ```
//!
//! Within a stage every pattern (and, while transforming, every file) runs
//! as its own task. All file work shares one semaphore, so at most
//! `concurrency` stat/read/transform operations are in flight. Results are
//! buffered and sorted by declaration order before conflicts are resolved,
//! so the outcome never depends on task completion order.

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

use crate::cache::{MemoryCache, TransformCache};
use crate::compilation::{Compilation, Dependencies};
use crate::emit::{Emission, WrittenTable, emit, resolve_conflicts};
use crate::error::{CopyError, CopyResult};
use crate::glob;
use crate::pattern::{FromKind, NormalizedPattern, Pattern, Source, To, normalize};
use crate::pipeline::{self, Loaded, Materialized, PipelineContext};
use crate::resolve::{self, Candidate, compile_ignore};
use crate::debug;

/// Default number of simultaneous file operations.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Plugin-wide options.
#[derive(Clone)]
pub struct CopyOptions {
    /// Upper bound on in-flight file operations. Must be at least 1.
    pub concurrency: usize,
    /// Backend for cached transforms; an in-memory cache when `None`.
    pub cache: Option<Arc<dyn TransformCache>>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cache: None,
        }
    }
}

impl CopyOptions {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn TransformCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOptions")
            .field("concurrency", &self.concurrency)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

// ============================================================================
// Pass report
// ============================================================================

/// Stage of a build pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PassStage {
    #[default]
    Idle,
    Normalizing,
    Resolving,
    Planning,
    Transforming,
    ResolvingConflicts,
    Emitted,
}

/// What one pass did to the asset store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub stage: PassStage,
    pub emitted: Vec<String>,
    pub updated: Vec<String>,
    pub skipped_existing: Vec<String>,
    pub unchanged: Vec<String>,
}

impl PassReport {
    /// Number of assets written (new or replaced).
    pub fn written(&self) -> usize {
        self.emitted.len() + self.updated.len()
    }

    fn enter(&mut self, stage: PassStage) {
        debug!("pass"; "{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn record(&mut self, outcomes: Vec<(String, Emission)>) {
        for (filename, emission) in outcomes {
            match emission {
                Emission::Emitted => self.emitted.push(filename),
                Emission::Updated => self.updated.push(filename),
                Emission::SkippedExisting => self.skipped_existing.push(filename),
                Emission::Unchanged => self.unchanged.push(filename),
            }
        }
    }
}

// ============================================================================
// Plugin
// ============================================================================

/// Copies files matched by [`Pattern`]s into a compilation's asset store.
///
/// One instance is meant to serve every pass of a build (including watch
/// rebuilds); it owns the written-tracking table and the transform cache.
pub struct CopyPlugin {
    patterns: Vec<Arc<Pattern>>,
    semaphore: Arc<Semaphore>,
    cache: Arc<dyn TransformCache>,
    written: WrittenTable,
}

impl CopyPlugin {
    pub const NAME: &'static str = env!("CARGO_PKG_NAME");

    /// Validate patterns and options.
    pub fn new(patterns: Vec<Pattern>, options: CopyOptions) -> CopyResult<Self> {
        if patterns.is_empty() {
            return Err(CopyError::validation("at least one pattern is required"));
        }
        if options.concurrency == 0 {
            return Err(CopyError::validation("'concurrency' must be at least 1"));
        }
        for (index, pattern) in patterns.iter().enumerate() {
            validate(pattern)
                .map_err(|err| CopyError::validation(format!("pattern #{index}: {err}")))?;
        }

        Ok(Self {
            patterns: patterns.into_iter().map(Arc::new).collect(),
            semaphore: Arc::new(Semaphore::new(options.concurrency)),
            cache: options
                .cache
                .unwrap_or_else(|| Arc::new(MemoryCache::new())),
            written: WrittenTable::new(),
        })
    }

    pub fn patterns(&self) -> &[Arc<Pattern>] {
        &self.patterns
    }

    /// Destinations written by this instance and their content hashes.
    pub fn written(&self) -> &WrittenTable {
        &self.written
    }

    /// Run one build pass.
    ///
    /// Non-fatal problems end up in `compilation.errors`; the pass still
    /// emits everything that succeeded.
    pub async fn run(&self, compilation: &mut Compilation<'_>) -> PassReport {
        let mut report = PassReport::default();
        let ctx = Arc::new(PipelineContext {
            fs: Arc::clone(&compilation.fs),
            cache: Arc::clone(&self.cache),
            context: compilation.context.clone(),
            output_path: compilation.output_path.clone(),
        });
        let mut errors = ErrorLog::default();
        let mut dependencies = Dependencies::default();

        report.enter(PassStage::Normalizing);
        let normalized = self.normalize_all(&ctx, &mut dependencies, &mut errors).await;

        report.enter(PassStage::Resolving);
        let resolved = self.resolve_all(&ctx, normalized, &mut dependencies, &mut errors).await;

        report.enter(PassStage::Planning);
        let planned = plan_all(resolved, ctx.output_path.as_deref(), &mut errors);

        report.enter(PassStage::Transforming);
        let candidates = self.materialize_all(&ctx, planned, &mut errors).await;

        report.enter(PassStage::ResolvingConflicts);
        let winners = resolve_conflicts(candidates);
        let (outcomes, emit_errors) = emit(winners, &mut *compilation.assets, &self.written);
        report.record(outcomes);
        errors.extend_pass(emit_errors);

        report.enter(PassStage::Emitted);
        compilation.dependencies.extend(dependencies);
        compilation.errors.extend(errors.into_sorted());

        debug!("pass"; "{} emitted, {} updated, {} skipped, {} unchanged",
            report.emitted.len(), report.updated.len(),
            report.skipped_existing.len(), report.unchanged.len());
        report
    }

    // ------------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------------

    async fn normalize_all(
        &self,
        ctx: &Arc<PipelineContext>,
        dependencies: &mut Dependencies,
        errors: &mut ErrorLog,
    ) -> Vec<NormalizedPattern> {
        let mut tasks = TaskSet::new();
        for (index, pattern) in self.patterns.iter().enumerate() {
            let ctx = Arc::clone(ctx);
            let pattern = Arc::clone(pattern);
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(index, async move {
                let _permit = semaphore.acquire_owned().await;
                let fs = Arc::clone(&ctx.fs);
                tokio::task::spawn_blocking(move || {
                    normalize(index, pattern, &ctx.context, fs.as_ref())
                })
                .await
                .map_err(|err| task_error(index, &err))?
            });
        }

        let mut normalized = Vec::new();
        for (index, result) in tasks.join_all().await {
            match result {
                Ok(out) => {
                    dependencies.extend(out.dependencies);
                    if let Some(err) = out.error {
                        errors.push(index, err);
                    }
                    normalized.push(out.pattern);
                }
                Err(err) => errors.push(index, err),
            }
        }
        normalized.sort_by_key(|pattern| pattern.index);
        normalized
    }

    async fn resolve_all(
        &self,
        ctx: &Arc<PipelineContext>,
        normalized: Vec<NormalizedPattern>,
        dependencies: &mut Dependencies,
        errors: &mut ErrorLog,
    ) -> Vec<(Arc<NormalizedPattern>, Vec<Candidate>)> {
        let mut tasks = TaskSet::new();
        for pattern in normalized {
            if matches!(pattern.kind, FromKind::Missing | FromKind::Unsupported) {
                continue;
            }
            let index = pattern.index;
            let pattern = Arc::new(pattern);
            let ctx = Arc::clone(ctx);
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(index, async move {
                let permit = semaphore.acquire_owned().await;
                let fs = Arc::clone(&ctx.fs);
                let blocking_pattern = Arc::clone(&pattern);
                let collected = tokio::task::spawn_blocking(move || {
                    resolve::collect(fs.as_ref(), &blocking_pattern)
                })
                .await
                .map_err(|err| task_error(index, &err))??;
                drop(permit);

                let (kept, mut filter_errors) = resolve::filter(&pattern, collected.candidates).await;
                filter_errors.extend(collected.error);
                Ok::<_, CopyError>((pattern, kept, collected.dependencies, filter_errors))
            });
        }

        let mut resolved = Vec::new();
        for (index, result) in tasks.join_all().await {
            match result {
                Ok((pattern, candidates, deps, pattern_errors)) => {
                    dependencies.extend(deps);
                    errors.extend_at(index, pattern_errors);
                    if !candidates.is_empty() {
                        debug!("copy"; "pattern #{} matched {} file(s)", index, candidates.len());
                        resolved.push((pattern, candidates));
                    }
                }
                Err(err) => errors.push(index, err),
            }
        }
        resolved.sort_by_key(|(pattern, _)| pattern.index);
        resolved
    }

    async fn materialize_all(
        &self,
        ctx: &Arc<PipelineContext>,
        planned: Vec<(Arc<NormalizedPattern>, Vec<Candidate>)>,
        errors: &mut ErrorLog,
    ) -> Vec<Materialized> {
        let mut tasks = TaskSet::new();
        for (pattern, candidates) in planned {
            let index = pattern.index;
            if pattern.pattern.transform_all.is_some() {
                let ctx = Arc::clone(ctx);
                let semaphore = Arc::clone(&self.semaphore);
                tasks.spawn(index, async move {
                    combine_pattern(ctx, pattern, candidates, semaphore).await
                });
                continue;
            }
            for candidate in candidates {
                let ctx = Arc::clone(ctx);
                let pattern = Arc::clone(&pattern);
                let semaphore = Arc::clone(&self.semaphore);
                tasks.spawn(index, async move {
                    let _permit = semaphore.acquire_owned().await;
                    pipeline::materialize(&ctx, &pattern, candidate).await
                });
            }
        }

        // Spawn order is declaration order, then file order within a pattern
        let mut candidates = Vec::new();
        for (index, result) in tasks.join_all().await {
            match result {
                Ok(candidate) => candidates.push(candidate),
                Err(err) => errors.push(index, err),
            }
        }
        candidates
    }
}

impl fmt::Debug for CopyPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyPlugin")
            .field("patterns", &self.patterns)
            .field("written", &self.written.len())
            .finish_non_exhaustive()
    }
}

/// Construction-time checks for one pattern.
fn validate(pattern: &Pattern) -> Result<(), String> {
    match &pattern.from {
        Source::Path(from) if from.trim().is_empty() => {
            return Err("'from' must be a non-empty string".into());
        }
        Source::Glob { glob, .. } if glob.trim().is_empty() => {
            return Err("'glob' must be a non-empty string".into());
        }
        _ => {}
    }
    if pattern.transform_all.is_some() && pattern.to.is_none() {
        return Err("'transform_all' requires 'to'".into());
    }
    if let Some(test) = &pattern.test {
        regex::Regex::new(test).map_err(|err| format!("invalid 'test' regex: {err}"))?;
    }
    compile_ignore(&pattern.ignore).map_err(|err| err.chain())?;

    let mut excludes = pattern.glob_options.ignore.clone();
    if let Source::Glob { options, .. } = &pattern.from {
        excludes.extend(options.ignore.iter().cloned());
    }
    glob::compile_set(&excludes, true).map_err(|err| err.chain())?;
    Ok(())
}

/// Drop patterns whose static destination can never be written.
fn plan_all(
    resolved: Vec<(Arc<NormalizedPattern>, Vec<Candidate>)>,
    output_path: Option<&Path>,
    errors: &mut ErrorLog,
) -> Vec<(Arc<NormalizedPattern>, Vec<Candidate>)> {
    resolved
        .into_iter()
        .filter(|(pattern, _)| {
            let Some(To::Path(to)) = &pattern.pattern.to else {
                return true;
            };
            match crate::plan::relativize(to, output_path) {
                Ok(_) => true,
                Err(err) => {
                    errors.push(pattern.index, err);
                    false
                }
            }
        })
        .collect()
}

/// Load every file of a `transform_all` pattern and combine them.
async fn combine_pattern(
    ctx: Arc<PipelineContext>,
    pattern: Arc<NormalizedPattern>,
    candidates: Vec<Candidate>,
    semaphore: Arc<Semaphore>,
) -> CopyResult<Materialized> {
    let index = pattern.index;
    let mut loads = TaskSet::new();
    for candidate in candidates {
        let ctx = Arc::clone(&ctx);
        let pattern = Arc::clone(&pattern);
        let semaphore = Arc::clone(&semaphore);
        loads.spawn(index, async move {
            let _permit = semaphore.acquire_owned().await;
            pipeline::load(&ctx, &pattern, candidate).await
        });
    }

    let mut files: Vec<Loaded> = Vec::new();
    for (_, result) in loads.join_all().await {
        files.push(result?);
    }
    pipeline::combine(&ctx, &pattern, files).await
}

// ============================================================================
// Task plumbing
// ============================================================================

fn task_error(index: usize, err: &JoinError) -> CopyError {
    let message = if err.is_panic() {
        "task panicked".to_string()
    } else {
        err.to_string()
    };
    CopyError::Task { index, message }
}

/// Spawned tasks that remember spawn order and the owning pattern.
///
/// Every task runs concurrently; [`TaskSet::join_all`] yields results in
/// spawn order no matter which task finished first. A panicked task
/// becomes [`CopyError::Task`] without affecting its siblings.
struct TaskSet<T> {
    handles: Vec<(usize, JoinHandle<CopyResult<T>>)>,
}

impl<T: Send + 'static> TaskSet<T> {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    fn spawn<F>(&mut self, index: usize, future: F)
    where
        F: Future<Output = CopyResult<T>> + Send + 'static,
    {
        self.handles.push((index, tokio::spawn(future)));
    }

    async fn join_all(self) -> Vec<(usize, CopyResult<T>)> {
        let mut results = Vec::with_capacity(self.handles.len());
        for (index, handle) in self.handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(task_error(index, &err)),
            };
            results.push((index, result));
        }
        results
    }
}

/// Errors tagged with the pattern that raised them, for stable ordering.
#[derive(Default)]
struct ErrorLog {
    entries: Vec<(usize, CopyError)>,
}

impl ErrorLog {
    fn push(&mut self, index: usize, err: CopyError) {
        debug!("copy"; "pattern #{}: {}", index, err.chain());
        self.entries.push((index, err));
    }

    fn extend_at(&mut self, index: usize, errors: impl IntoIterator<Item = CopyError>) {
        for err in errors {
            self.push(index, err);
        }
    }

    /// Errors not tied to one pattern, such as asset store failures.
    fn extend_pass(&mut self, errors: impl IntoIterator<Item = CopyError>) {
        for err in errors {
            debug!("copy"; "{}", err.chain());
            self.entries.push((usize::MAX, err));
        }
    }

    /// Stable sort: pattern order first, discovery order within a pattern.
    fn into_sorted(mut self) -> Vec<CopyError> {
        self.entries.sort_by_key(|(index, _)| *index);
        self.entries.into_iter().map(|(_, err)| err).collect()
    }
}
