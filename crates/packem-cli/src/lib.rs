//! packem CLI - build npm packages from their `package.json`.
//!
//! The binary is a thin layer over the [`packem`] library:
//!
//! - [`cli`] - clap definitions
//! - [`config`] - layered option loading with figment
//! - [`commands`] - `build`, `entries` and `schema`
//! - [`dev`] - watch mode
//! - [`error`] - CLI errors and miette conversion
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - terminal output
//!
//! # Example
//!
//! ```rust,no_run
//! use packem_cli::{cli, config, error::Result};
//!
//! fn main() -> Result<()> {
//!     let options = config::load(&cli::ProjectArgs::default(), &config::Overrides::default())?;
//!     println!("building into {}", options.out_dir.display());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, ConfigError, Result, ResultExt};
