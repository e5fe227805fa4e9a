//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CONFIG_FILE, Overrides};

/// Copy files into a build output according to declarative patterns
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, global = true, default_value = CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Print per-file and per-stage details
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one copy pass
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        args: PassArgs,
    },

    /// Run a copy pass, then rerun it whenever a source changes
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        args: PassArgs,
    },
}

impl Commands {
    pub fn args(&self) -> &PassArgs {
        match self {
            Self::Build { args } | Self::Watch { args } => args,
        }
    }
}

/// Shared arguments for Build and Watch
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PassArgs {
    /// Output directory (overrides `output`)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Build context (overrides `context`)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub context: Option<PathBuf>,

    /// Maximum simultaneous file operations (overrides `concurrency`)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Disable the persistent transform cache
    #[arg(long)]
    pub no_cache: bool,
}

impl PassArgs {
    /// Config overrides, with relative paths taken from `cwd`.
    pub fn overrides(&self, cwd: &std::path::Path) -> Overrides {
        Overrides {
            context: self.context.as_ref().map(|path| cwd.join(path)),
            output: self.output.as_ref().map(|path| cwd.join(path)),
            concurrency: self.concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from(["assetcopy", "-V", "build", "-o", "public", "-j", "4"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE));

        let args = cli.command.args();
        assert_eq!(args.output, Some(PathBuf::from("public")));
        assert_eq!(args.concurrency, Some(4));
        assert!(!args.no_cache);
    }

    #[test]
    fn test_parse_watch_alias() {
        let cli = Cli::try_parse_from(["assetcopy", "w", "--no-cache", "-C", "site/copy.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { .. }));
        assert!(cli.command.args().no_cache);
        assert_eq!(cli.config, PathBuf::from("site/copy.toml"));
    }

    #[test]
    fn test_overrides_resolve_against_cwd() {
        let args = PassArgs {
            output: Some("public".into()),
            context: Some("/abs/site".into()),
            ..PassArgs::default()
        };
        let overrides = args.overrides(Path::new("/work"));
        assert_eq!(overrides.output, Some(PathBuf::from("/work/public")));
        assert_eq!(overrides.context, Some(PathBuf::from("/abs/site")));
        assert_eq!(overrides.concurrency, None);
    }
}
