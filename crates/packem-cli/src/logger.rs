//! Logging setup for the packem CLI.
//!
//! Log lines go to stderr so `--json` output on stdout stays parseable.
//!
//! Verbosity, in priority order:
//! 1. `--verbose`: debug for packem crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`
//! 4. info for packem
//!
//! ```rust,no_run
//! use packem_cli::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("starting build");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const VERBOSE_FILTER: &str = "packem=debug,packem_cli=debug";
pub const QUIET_FILTER: &str = "packem=error";
pub const DEFAULT_FILTER: &str = "packem=info,packem_cli=info";

/// Filter for the given flags.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .init();
}

/// Whether stderr output should be colored.
///
/// `NO_COLOR` wins over `FORCE_COLOR`; otherwise the terminal decides.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::Term::stderr().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn no_color_beats_force_color() {
        // SAFETY: env-touching tests are serialized.
        unsafe {
            std::env::set_var("NO_COLOR", "1");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(!should_use_colors());
        unsafe {
            std::env::remove_var("NO_COLOR");
        }
        assert!(should_use_colors());
        unsafe {
            std::env::remove_var("FORCE_COLOR");
        }
    }

    #[test]
    fn flag_filters_parse() {
        let verbose = filter_for(true, false).to_string();
        assert!(verbose.contains("packem=debug"));
        assert!(verbose.contains("packem_cli=debug"));
        assert_eq!(filter_for(false, true).to_string(), QUIET_FILTER);
    }
}
