//! `packem entries`

use packem::NativeRuntime;

use crate::cli::EntriesArgs;
use crate::error::Result;
use crate::{config, ui};

/// Resolve entries the way `build` would and print them.
pub async fn execute(args: EntriesArgs) -> Result<()> {
    let options = config::load(&args.project, &args.overrides())?;
    let runtime = NativeRuntime::new();
    let ctx = packem::resolve_entries(options, &runtime).await?;

    for warning in ctx.warnings() {
        ui::warning(warning);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ctx.entries)?);
    } else {
        ui::print_entries(&ctx.entries, &ctx.paths.root);
    }
    Ok(())
}
