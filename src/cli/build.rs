//! Copy pass orchestration for the command line.
//!
//! - **Prepare** - find and load the config, build patterns and the plugin
//! - **Pass** - run the plugin against the real filesystem and output dir
//! - **Report** - print accumulated errors and a summary line

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};

use super::{Cli, PassArgs};
use crate::asset::AssetStore;
use crate::compilation::{Compilation, Dependencies};
use crate::config::{CopyConfig, find_config_file};
use crate::error::CopyError;
use crate::fs::{DiskFs, FileSystem};
use crate::plugin::{CopyPlugin, PassReport};
use crate::utils::plural_count;
use crate::{asset::DiskAssetStore, debug, log};

/// Load the config named on the command line and construct the plugin.
pub fn prepare(cli: &Cli, args: &PassArgs) -> Result<(CopyConfig, CopyPlugin)> {
    let cwd = std::env::current_dir().context("Failed to get current working directory")?;
    let Some(path) = find_config_file(&cli.config) else {
        bail!(
            "config file '{}' not found in '{}' or any parent directory",
            cli.config.display(),
            cwd.display()
        );
    };
    debug!("config"; "using {}", path.display());

    let config = CopyConfig::load(&path, &args.overrides(&cwd))?;
    let patterns = config.build_patterns()?;

    let mut options = config.copy_options();
    if args.no_cache {
        options.cache = None;
    } else if let (true, Some(dir)) = (config.cache.enable, &config.cache.dir) {
        debug!("cache"; "transform cache at {}", dir.display());
    }

    let plugin = CopyPlugin::new(patterns, options)?;
    Ok((config, plugin))
}

/// Everything a finished pass handed back.
pub struct PassOutcome {
    pub report: PassReport,
    pub dependencies: Dependencies,
    pub errors: Vec<CopyError>,
}

impl PassOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line summary such as `3 assets copied, 1 unchanged`.
    pub fn summary(&self) -> String {
        let report = &self.report;
        let mut parts = vec![format!("{} copied", plural_count(report.written(), "asset"))];
        if !report.unchanged.is_empty() {
            parts.push(format!("{} unchanged", report.unchanged.len()));
        }
        if !report.skipped_existing.is_empty() {
            parts.push(format!("{} skipped", report.skipped_existing.len()));
        }
        if !self.errors.is_empty() {
            parts.push(plural_count(self.errors.len(), "error"));
        }
        parts.join(", ")
    }
}

/// Run one pass of `plugin` against the config's context and output.
pub async fn run_pass(
    plugin: &CopyPlugin,
    config: &CopyConfig,
    store: &mut dyn AssetStore,
) -> PassOutcome {
    let fs: Arc<dyn FileSystem> = Arc::new(DiskFs);
    let mut compilation =
        Compilation::new(config.context(), fs, store).with_output_path(&config.output);
    let report = plugin.run(&mut compilation).await;

    PassOutcome {
        report,
        dependencies: compilation.dependencies,
        errors: compilation.errors,
    }
}

/// `build` subcommand.
pub async fn build(cli: &Cli, args: &PassArgs) -> Result<()> {
    let (config, plugin) = prepare(cli, args)?;
    let mut store = DiskAssetStore::new(&config.output);

    let start = Instant::now();
    let outcome = run_pass(&plugin, &config, &mut store).await;
    print_diagnostics(&outcome);

    log!(
        "build";
        "{} in {:.2?} -> {}",
        outcome.summary(),
        start.elapsed(),
        config.output.display()
    );

    if !outcome.is_ok() {
        bail!("copy pass finished with {}", plural_count(outcome.errors.len(), "error"));
    }
    Ok(())
}

/// Print accumulated errors with their causes.
pub fn print_diagnostics(outcome: &PassOutcome) {
    for error in &outcome.errors {
        log!("error"; "{}", error.chain());
    }
}
