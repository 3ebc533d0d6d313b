//! Error handling for the packem CLI.
//!
//! [`CliError`] is what commands return. Build failures keep the library's
//! [`packem::Error`] intact so `main` can render it with its diagnostic code
//! and help text.
//!
//! ```rust,no_run
//! use packem_cli::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn read_config(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_path(path)
//!         .with_hint("Pass --config <file> to use another file")
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The build itself failed.
    #[error(transparent)]
    Build(#[from] packem::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// Errors from loading `packem.config.json` and the other option layers.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}\n\nHint: Create a packem.config.json file or check the --config path", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid JSON in {}: {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The merged layers do not describe valid options.
    #[error("Invalid configuration: {0}\n\nHint: Run 'packem schema' to see the accepted fields")]
    Invalid(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Attach context to errors on their way to the user.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{err}\n\nHint: {hint}"))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{msg}: {err}"))
        })
    }
}

/// Convert a CLI error into a miette report for display.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::Build(e) => miette::Report::new(e),
        CliError::Config(e) => miette::miette!("{}", e),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Diagnostic;

    #[test]
    fn config_not_found_has_hint() {
        let err = ConfigError::NotFound(PathBuf::from("packem.config.json"));
        let msg = err.to_string();
        assert!(msg.contains("Config file not found: packem.config.json"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn build_errors_stay_transparent() {
        let err: CliError = packem::Error::config("No entries detected.").into();
        assert_eq!(err.to_string(), "No entries detected.");

        let report = cli_error_to_miette(err);
        assert_eq!(
            report.code().map(|c| c.to_string()).as_deref(),
            Some("CONFIG_ERROR")
        );
    }

    #[test]
    fn with_path_maps_not_found() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.with_path("/p/packem.config.json").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(path) if path == PathBuf::from("/p/packem.config.json")));
    }

    #[test]
    fn with_path_keeps_other_errors() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(matches!(result.with_path("/p").unwrap_err(), CliError::Io(_)));
    }

    #[test]
    fn hint_and_context_wrap_the_message() {
        let result: std::result::Result<(), ConfigError> =
            Err(ConfigError::Invalid("unknown field `entry`".to_string()));
        let msg = result.with_hint("Did you mean `entries`?").unwrap_err().to_string();
        assert!(msg.contains("unknown field `entry`"));
        assert!(msg.ends_with("Hint: Did you mean `entries`?"));

        let result: std::result::Result<(), ConfigError> =
            Err(ConfigError::NotFound(PathBuf::from("x.json")));
        let msg = result.context("Failed to load options").unwrap_err().to_string();
        assert!(msg.starts_with("Failed to load options: Configuration error:"));
    }
}
