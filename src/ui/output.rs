//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag. Errors are
//! always shown.

use std::fmt::Display;

use crate::core::store::RevisionInfo;
use crate::core::types::{DefinitionName, Revision};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - results only, no commentary
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    /// Default `tracing` filter directive for this verbosity.
    pub fn log_directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Debug => "jobstore=debug",
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Format `(name, head)` pairs as aligned rows.
pub fn format_definitions(definitions: &[(DefinitionName, Revision)]) -> String {
    let width = definitions
        .iter()
        .map(|(name, _)| name.as_str().len())
        .max()
        .unwrap_or(0);
    definitions
        .iter()
        .map(|(name, head)| format!("{:<width$}  {}", name.as_str(), head, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format one history row: revision, time, author, notes.
///
/// Missing metadata is shown as `-`.
pub fn format_revision(info: &RevisionInfo) -> String {
    let modified = info
        .modified
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    let author = info.author.as_deref().unwrap_or("-");
    let notes = info.notes.as_deref().unwrap_or("");
    format!("{:>3}  {}  {}  {}", info.revision.get(), modified, author, notes)
        .trim_end()
        .to_string()
}
