#![cfg_attr(docsrs, feature(doc_cfg))]

//! # packem
//!
//! Entry inference and multi-target build orchestration for npm packages.
//!
//! Given a source tree and a `package.json`, packem works out what has to be
//! built (public entry points, module formats, environment and runtime
//! variants), drives a [`Bundler`] adapter once per target group, and
//! reconciles the emitted files against the package's declared surface.
//!
//! ## Quick Start
//!
//! ```no_run
//! use packem::{BuildOptions, NativeRuntime, build};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> packem::Result<()> {
//! let options = BuildOptions {
//!     root_dir: Some("./my-lib".into()),
//!     ..Default::default()
//! };
//! # #[cfg(feature = "transpile")]
//! let bundler = Arc::new(packem::TranspileBundler::new());
//! # #[cfg(feature = "transpile")]
//! let outcome = build(options, bundler, Arc::new(NativeRuntime::new())).await?;
//! # #[cfg(feature = "transpile")]
//! for entry in outcome.report.entries() {
//!     println!("{} {}", entry.path, entry.bytes);
//! }
//! # Ok(()) }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`scanner`] and [`exports`] feed [`inference`].
//! 2. [`validate`] expands globs, probes extensions and deduplicates.
//! 3. [`group`] partitions entries by environment and runtime and plans
//!    one [`BuildTask`] per format bucket, using [`extension`] for file names.
//! 4. Tasks run concurrently; results are folded into a [`report::BuildReport`].
//! 5. [`size_limit`] and [`validation`] run post-build checks.

pub mod build;
pub mod bundler;
pub mod cache;
pub mod context;
pub mod diagnostics;
pub mod entry;
pub mod exports;
pub mod extension;
pub mod group;
pub mod hooks;
pub mod inference;
pub mod options;
pub mod package_json;
pub mod report;
pub mod runtime;
pub mod scanner;
pub mod size_limit;
pub mod tsconfig;
pub mod validate;
pub mod validation;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use build::{BuildOutcome, TaskSummary, build, build_with_hooks, prepare, rebuild, resolve_entries};
pub use bundler::{BundleOutput, Bundler, OutputAsset, OutputChunk};
#[cfg(feature = "transpile")]
#[cfg_attr(docsrs, doc(cfg(feature = "transpile")))]
pub use bundler::TranspileBundler;
#[cfg(feature = "rolldown")]
#[cfg_attr(docsrs, doc(cfg(feature = "rolldown")))]
pub use bundler::RolldownBundler;
pub use cache::CacheError;
pub use context::BuildContext;
pub use diagnostics::BundlerError;
pub use entry::{BuildEntry, Environment, ModuleFormat, TargetRuntime};
pub use group::{BuildTask, TaskKind};
pub use hooks::{HookEvent, HookRegistry};
pub use options::BuildOptions;
pub use package_json::{PackageJson, PackageType};
pub use report::{BuildReport, BuildReportEntry, ReportKind};
pub use runtime::{NativeRuntime, Runtime, RuntimeError};

/// Error types for packem operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration or package metadata.
    #[error("{message}")]
    Config { message: String },

    /// A required file or directory is missing.
    #[error("{message}")]
    NotFound {
        message: String,
        path: std::path::PathBuf,
    },

    /// Warnings promoted to a failure by `failOnWarn`.
    #[error("Build finished with {} warning(s): {}", .0.len(), .0.join("; "))]
    Warnings(Vec<String>),

    /// One error per failed bundler task, in task order.
    #[error("{}", format_bundler_errors(.0))]
    Bundler(Vec<BundlerError>),

    /// Emitted files exceeded their configured size limit.
    #[error("Size limit exceeded: {}", .0.join("; "))]
    SizeLimit(Vec<String>),

    /// A lifecycle hook handler failed.
    #[error("Hook \"{event}\" failed: {message}")]
    Hook { event: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the filesystem runtime.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Error from the file cache.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for packem operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Error::NotFound {
            message: message.into(),
            path: path.into(),
        }
    }

    /// The entry-conflict error raised when two fields claim one output file.
    pub fn conflict(field: &str, path: &str) -> Self {
        Error::config(format!(
            "Conflicting field \"{field}\" with entry \"{path}\" detected. Please change one of the entries inside your \"package.json\"."
        ))
    }
}

fn format_bundler_errors(errors: &[BundlerError]) -> String {
    match errors {
        [] => "Unknown bundler error".to_string(),
        [single] => single.to_string(),
        many => format!(
            "{} tasks failed: {}",
            many.len(),
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Warnings(_) => "WARNINGS_PROMOTED",
            Error::Bundler(_) => "BUNDLER_ERROR",
            Error::SizeLimit(_) => "SIZE_LIMIT",
            Error::Hook { .. } => "HOOK_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Runtime(_) => "RUNTIME_ERROR",
            Error::Cache(_) => "CACHE_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::NotFound { path, .. } => Some(Box::new(format!(
                "Checked: {}",
                path.display()
            ))),
            Error::Warnings(_) => Some(Box::new(
                "Fix the warnings above or set \"failOnWarn\": false to allow them.",
            )),
            Error::SizeLimit(_) => Some(Box::new(
                "Reduce the bundle size, raise the limit, or set \"allowFail\": true on the limit.",
            )),
            Error::Bundler(errors) => match errors.as_slice() {
                [single] => single
                    .help
                    .as_ref()
                    .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
                    .or_else(|| {
                        single
                            .code_frame
                            .as_ref()
                            .map(|f| Box::new(f.clone()) as Box<dyn std::fmt::Display>)
                    }),
                _ => Some(Box::new(
                    "Multiple bundler tasks failed. See details above.".to_string(),
                )),
            },
            _ => None,
        }
    }
}
