//! history command - List every revision of a definition with audit metadata

use anyhow::{Context as _, Result};

use super::parse_name;
use crate::cli::Context;
use crate::ui::output;

/// Print the history of `name`, most recent first.
pub fn history(ctx: &Context, name: &str) -> Result<()> {
    let name = parse_name(name)?;
    let revisions = ctx
        .index
        .history(&name)
        .with_context(|| format!("cannot read history of {name}"))?;

    if revisions.is_empty() {
        output::print(format!("{name} has no revisions."), ctx.verbosity);
        return Ok(());
    }
    for info in &revisions {
        println!("{}", output::format_revision(info));
    }
    Ok(())
}
