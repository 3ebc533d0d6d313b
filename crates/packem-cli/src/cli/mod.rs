//! Command-line interface definition.
//!
//! - `packem build` - build the package, optionally in watch mode
//! - `packem entries` - print the entries that would be built
//! - `packem schema` - print the JSON schema of the config file

mod tests;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Overrides;

/// packem - build npm packages from their package.json
#[derive(Parser, Debug)]
#[command(
    name = "packem",
    version,
    about = "Build npm packages from their package.json",
    long_about = "packem reads the entry points your package.json declares (main, module,\n\
                  types, exports, bin), works out the formats and environments each one\n\
                  needs, and builds them in parallel."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the package
    ///
    /// Entries are inferred from package.json unless the config lists them.
    /// Every environment and runtime variant is built into its own
    /// subdirectory of the output directory.
    Build(BuildArgs),

    /// Print the entries that would be built, without building
    Entries(EntriesArgs),

    /// Print the JSON schema of packem.config.json
    Schema,
}

/// Where to find the package and its configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Package root. Defaults to the current directory.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Config file. Defaults to packem.config.json in the package root.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output directory, relative to the root
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Source directory, relative to the root
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<PathBuf>,
}

/// Bundling engine
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum BundlerChoice {
    /// Per-file transpilation with oxc
    #[default]
    #[value(name = "transpile")]
    Transpile,

    /// Full bundling with Rolldown (requires the `rolldown` feature)
    #[value(name = "rolldown")]
    Rolldown,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Rebuild when files change
    #[arg(short, long)]
    pub watch: bool,

    /// Minify every build, not only production ones
    #[arg(long)]
    pub minify: bool,

    /// Keep the previous contents of the output directory
    #[arg(long)]
    pub no_clean: bool,

    /// Print the build report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Report warnings without failing the build
    #[arg(long)]
    pub no_fail_on_warn: bool,

    /// Shell command to run after each successful build in watch mode
    #[arg(long, value_name = "CMD", requires = "watch")]
    pub on_success: Option<String>,

    /// Bundling engine
    #[arg(long, value_enum, default_value = "transpile")]
    pub bundler: BundlerChoice,
}

impl BuildArgs {
    /// Flags that override the loaded configuration.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            out_dir: self.project.out_dir.clone(),
            source_dir: self.project.source_dir.clone(),
            minify: self.minify.then_some(true),
            clean: self.no_clean.then_some(false),
            fail_on_warn: self.no_fail_on_warn.then_some(false),
            on_success: self.on_success.clone(),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct EntriesArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print entries as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl EntriesArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            out_dir: self.project.out_dir.clone(),
            source_dir: self.project.source_dir.clone(),
            ..Default::default()
        }
    }
}
