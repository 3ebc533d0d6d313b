//! `packem build`
//!
//! 1. Load options (flags > env > package.json > config file > defaults)
//! 2. Pick the bundler adapter
//! 3. Build once, or hand over to [`crate::dev::watch`]
//! 4. Print the report, as a table on stderr or JSON on stdout

use packem::{BuildOutcome, Bundler, NativeRuntime, Runtime};
use serde_json::json;
use std::sync::Arc;

use crate::cli::{BuildArgs, BundlerChoice};
use crate::error::Result;
use crate::{config, dev, ui};

pub async fn execute(args: BuildArgs) -> Result<()> {
    let runtime: Arc<dyn Runtime> = Arc::new(NativeRuntime::new());
    let bundler = make_bundler(args.bundler, Arc::clone(&runtime))?;

    if args.watch {
        let load = || config::load(&args.project, &args.overrides());
        return dev::watch(load, bundler, runtime).await;
    }

    let options = config::load(&args.project, &args.overrides())?;

    let spinner = if args.json || ui::is_quiet() {
        ui::Spinner::hidden()
    } else {
        ui::Spinner::new("Building...")
    };

    let result = packem::build(options, bundler, runtime).await;
    spinner.clear();
    let outcome = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

/// The adapter selected by `--bundler`.
pub fn make_bundler(choice: BundlerChoice, runtime: Arc<dyn Runtime>) -> Result<Arc<dyn Bundler>> {
    match choice {
        BundlerChoice::Transpile => Ok(Arc::new(
            packem::TranspileBundler::new().with_runtime(runtime),
        )),
        #[cfg(feature = "rolldown")]
        BundlerChoice::Rolldown => Ok(Arc::new(packem::RolldownBundler::new())),
        #[cfg(not(feature = "rolldown"))]
        BundlerChoice::Rolldown => Err(crate::error::CliError::InvalidArgument(
            "this packem was built without Rolldown support; rebuild packem-cli with --features rolldown"
                .to_string(),
        )),
    }
}

/// Shared by one-shot and watch builds.
pub(crate) fn print_outcome(outcome: &BuildOutcome) {
    for warning in &outcome.warnings {
        ui::warning(warning);
    }
    if ui::is_quiet() {
        return;
    }
    ui::print_report(outcome);
    let count = outcome.entries.len();
    ui::success(&format!(
        "Built {count} {} in {}",
        if count == 1 { "entry" } else { "entries" },
        ui::format_duration(outcome.duration)
    ));
}

fn outcome_json(outcome: &BuildOutcome) -> serde_json::Value {
    let tasks: Vec<_> = outcome
        .tasks
        .iter()
        .map(|task| {
            json!({
                "label": task.label,
                "cached": task.cached,
                "durationMs": task.duration.as_millis() as u64,
                "files": task.files,
            })
        })
        .collect();

    json!({
        "report": outcome.report,
        "totalBytes": outcome.report.total_bytes(),
        "warnings": outcome.warnings,
        "tasks": tasks,
        "durationMs": outcome.duration.as_millis() as u64,
    })
}
