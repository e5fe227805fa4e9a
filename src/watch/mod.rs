//! Watch mode.
//!
//! Runs a pass, then reruns it with the same plugin instance and asset store
//! whenever a dependency of the previous pass changes. Reusing the plugin
//! keeps its written-tracking table, so unchanged files are not rewritten.
//!
//! ```text
//! notify → Debouncer (timing) → relevant_changes (dependencies) → pass
//! ```
//!
//! The watcher is attached before the first pass so no change made while
//! it runs is lost.

mod debouncer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{Notify, mpsc};

use crate::asset::DiskAssetStore;
use crate::cli::build::{PassOutcome, prepare, run_pass};
use crate::cli::{Cli, PassArgs};
use crate::compilation::Dependencies;
use crate::config::CopyConfig;
use crate::error::CopyError;
use crate::logger::{status_error, status_success, status_unchanged, status_warning};
use crate::plugin::CopyPlugin;
use crate::utils::plural_count;
use crate::{debug, log};
use debouncer::{ChangeKind, Debouncer};

/// `watch` subcommand.
pub async fn watch(cli: &Cli, args: &PassArgs) -> Result<()> {
    let (config, plugin) = prepare(cli, args)?;
    let shutdown = shutdown_signal()?;

    let (notify_tx, notify_rx) = std::sync::mpsc::channel();
    let watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .context("Failed to create file watcher")?;

    let context = config.context();
    let mut session = Session::new(config, plugin, watcher);
    session.attach(&context, RecursiveMode::Recursive)?;

    session.pass().await;
    log!("watch"; "watching {} (Ctrl+C to stop)", context.display());

    let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    if async_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => log!("watch"; "notify error: {}", e),
            }
        }
    });

    let mut debouncer = Debouncer::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                log!("watch"; "shutting down...");
                break;
            }
            Some(event) = async_rx.recv() => debouncer.add_event(&event),
            _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                let Some(changes) = debouncer.take_if_ready() else {
                    continue;
                };
                let relevant = session.relevant_changes(&changes);
                if relevant.is_empty() {
                    debug!("watch"; "{} outside dependencies",
                        plural_count(changes.len(), "change"));
                    continue;
                }
                for (path, kind) in &relevant {
                    debug!("watch"; "{} {}", kind.label(), path.display());
                }
                session.pass().await;
            }
        }
    }

    Ok(())
}

/// Ctrl+C wakes the watch loop instead of killing the process mid-write.
fn shutdown_signal() -> Result<Arc<Notify>> {
    let notify = Arc::new(Notify::new());
    let handler = Arc::clone(&notify);
    ctrlc::set_handler(move || handler.notify_one())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;
    Ok(notify)
}

/// State that outlives individual passes.
struct Session {
    config: CopyConfig,
    plugin: CopyPlugin,
    store: DiskAssetStore,
    watcher: RecommendedWatcher,
    attached: FxHashSet<PathBuf>,
    dependencies: Dependencies,
    /// Whether the previous pass recorded errors.
    failed: bool,
}

impl Session {
    fn new(config: CopyConfig, plugin: CopyPlugin, watcher: RecommendedWatcher) -> Self {
        let store = DiskAssetStore::new(&config.output);
        Self {
            config,
            plugin,
            store,
            watcher,
            attached: FxHashSet::default(),
            dependencies: Dependencies::default(),
            failed: false,
        }
    }

    async fn pass(&mut self) {
        let outcome = run_pass(&self.plugin, &self.config, &mut self.store).await;
        show(&outcome);

        self.failed = !outcome.is_ok();
        self.dependencies = outcome.dependencies;
        self.attach_dependencies();
    }

    fn attach(&mut self, path: &Path, mode: RecursiveMode) -> Result<()> {
        if self.attached.contains(path) {
            return Ok(());
        }
        self.watcher
            .watch(path, mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        debug!("watch"; "attached {}", path.display());
        self.attached.insert(path.to_path_buf());
        Ok(())
    }

    /// Dependencies outside the context are watched individually.
    fn attach_dependencies(&mut self) {
        let context = self.config.context();
        let roots: Vec<_> = outside_roots(&self.dependencies, &context);
        for (path, mode) in roots {
            if let Err(e) = self.attach(&path, mode) {
                status_warning(&format!("{e:#}"));
            }
        }
    }

    fn relevant_changes(
        &self,
        changes: &FxHashMap<PathBuf, ChangeKind>,
    ) -> Vec<(PathBuf, ChangeKind)> {
        let output = &self.config.output;
        let cache = self.config.cache.dir.as_deref();
        let context = self.config.context();

        let mut relevant: Vec<_> = changes
            .iter()
            .filter(|(path, _)| !path.starts_with(output))
            .filter(|(path, _)| cache.is_none_or(|dir| !path.starts_with(dir)))
            .filter(|(path, _)| {
                self.dependencies.covers(path) || (self.failed && path.starts_with(&context))
            })
            .map(|(path, kind)| (path.clone(), *kind))
            .collect();
        relevant.sort_by(|a, b| a.0.cmp(&b.0));
        relevant
    }
}

/// Watch roots for dependencies not already under `context`.
fn outside_roots(dependencies: &Dependencies, context: &Path) -> Vec<(PathBuf, RecursiveMode)> {
    let dirs = dependencies
        .contexts
        .iter()
        .filter(|dir| !dir.starts_with(context) && dir.is_dir())
        .map(|dir| (dir.clone(), RecursiveMode::Recursive));
    let files = dependencies
        .files
        .iter()
        .filter(|file| !file.starts_with(context) && file.is_file())
        .filter(|file| !dependencies.contexts.iter().any(|dir| file.starts_with(dir)))
        .map(|file| (file.clone(), RecursiveMode::NonRecursive));
    dirs.chain(files).collect()
}

fn show(outcome: &PassOutcome) {
    if !outcome.is_ok() {
        let detail: Vec<String> = outcome.errors.iter().map(CopyError::chain).collect();
        status_error(&outcome.summary(), &detail.join("\n"));
    } else if outcome.report.written() == 0 {
        status_unchanged(&outcome.summary());
    } else {
        status_success(&outcome.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_outside_roots() {
        let dir = TempDir::new().unwrap();
        let context = dir.path().join("site");
        let shared = dir.path().join("shared");
        fs::create_dir_all(context.join("static")).unwrap();
        fs::create_dir_all(&shared).unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        fs::write(shared.join("logo.svg"), "<svg/>").unwrap();

        let mut deps = Dependencies::default();
        deps.add_context(context.join("static"));
        deps.add_context(&shared);
        deps.add_file(shared.join("logo.svg"));
        deps.add_file(dir.path().join("LICENSE"));
        deps.add_file(dir.path().join("missing.txt"));

        let roots = outside_roots(&deps, &context);
        let paths: Vec<_> = roots.iter().map(|(path, _)| path.clone()).collect();
        assert_eq!(paths, vec![shared, dir.path().join("LICENSE")]);
        assert!(matches!(roots[0].1, RecursiveMode::Recursive));
        assert!(matches!(roots[1].1, RecursiveMode::NonRecursive));
    }
}
