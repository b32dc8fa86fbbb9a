//! show command - Print one revision of a definition

use std::io::Write;

use anyhow::{Context as _, Result};

use super::parse_name;
use crate::cli::Context;
use crate::core::types::RevisionSelector;

/// Print the selected revision of `name` in the repository's encoding.
pub fn show(ctx: &Context, name: &str, selector: RevisionSelector) -> Result<()> {
    let name = parse_name(name)?;
    let definition = match selector {
        RevisionSelector::Head => ctx.index.get_head(&name),
        RevisionSelector::Number(rev) => ctx.index.get_revision(&name, rev),
    }
    .with_context(|| format!("cannot show {name} at {selector}"))?;

    let bytes = ctx.index.codec().encode(&definition)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}
