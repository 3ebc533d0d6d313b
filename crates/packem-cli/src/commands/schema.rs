//! `packem schema`

use packem::BuildOptions;

use crate::error::Result;

/// Print the JSON schema of `packem.config.json` on stdout.
pub fn execute() -> Result<()> {
    let schema = serde_json::to_string_pretty(&BuildOptions::json_schema())?;
    println!("{schema}");
    Ok(())
}
