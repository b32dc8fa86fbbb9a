//! ui
//!
//! Terminal output for the CLI.
//!
//! # Modules
//!
//! - [`output`] - Verbosity-aware printing and table formatting
//!
//! # Design
//!
//! Command results go to stdout; warnings and errors go to stderr, so the
//! output of `jobstore show` can be piped straight into another tool.

pub mod output;
