//! list command - Show every definition with its head revision

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::ui::output;

/// List definitions, one per line, sorted by name.
pub fn list(ctx: &Context) -> Result<()> {
    let definitions = ctx
        .index
        .list_definitions()
        .with_context(|| format!("failed to list {}", ctx.index.root().display()))?;

    if definitions.is_empty() {
        output::print("No definitions.", ctx.verbosity);
        return Ok(());
    }
    println!("{}", output::format_definitions(&definitions));
    Ok(())
}
