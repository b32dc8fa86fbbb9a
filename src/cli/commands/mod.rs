//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Calls the repository index to do the work
//! 3. Formats and displays output

mod append;
mod history;
mod list;
mod show;
mod watch;

// Re-export command functions for testing and direct invocation
pub use append::append;
pub use history::history;
pub use list::list;
pub use show::show;
pub use watch::watch;

use anyhow::{Context as _, Result};

use crate::cli::args::Command;
use crate::cli::Context;
use crate::core::types::DefinitionName;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::List => list(ctx),
        Command::Show { name, revision } => show(ctx, &name, revision),
        Command::History { name } => history(ctx, &name),
        Command::Append {
            file,
            name,
            author,
            notes,
        } => append(ctx, &file, name.as_deref(), author.as_deref(), &notes),
        Command::Watch { duration } => watch(ctx, duration),
    }
}

fn parse_name(raw: &str) -> Result<DefinitionName> {
    DefinitionName::new(raw).with_context(|| format!("'{raw}' is not a valid definition name"))
}
