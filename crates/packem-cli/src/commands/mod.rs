//! Subcommand implementations.

mod build;
mod entries;
mod schema;

pub use build::{execute as build_execute, make_bundler};
pub(crate) use build::print_outcome;
pub use entries::execute as entries_execute;
pub use schema::execute as schema_execute;
