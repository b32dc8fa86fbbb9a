//! append command - Store a definition file as the next revision

use std::path::Path;

use anyhow::{Context as _, Result};

use super::parse_name;
use crate::cli::Context;
use crate::core::codec::CodecFormat;
use crate::ui::output;

/// Append the definition in `file`.
///
/// The file is decoded by its extension when it names a known format, and
/// with the repository's codec otherwise. `name` overrides the name field.
pub fn append(
    ctx: &Context,
    file: &Path,
    name: Option<&str>,
    author: Option<&str>,
    notes: &str,
) -> Result<()> {
    let codec = file
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<CodecFormat>().ok())
        .map(CodecFormat::codec)
        .unwrap_or_else(|| ctx.index.codec().clone());

    let mut definition = codec
        .read(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    if let Some(name) = name {
        let name = parse_name(name)?;
        definition.set(ctx.index.name_field(), name.as_str());
    }

    let author = author.map(str::to_string).unwrap_or_else(default_author);
    let (name, revision) = ctx
        .index
        .save(&definition, &author, notes)
        .with_context(|| format!("cannot append {}", file.display()))?;

    output::print(format!("{name} revision {revision}"), ctx.verbosity);
    Ok(())
}

fn default_author() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
