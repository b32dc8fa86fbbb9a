//! cli
//!
//! Command-line interface layer for jobstore.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Load configuration and open the repository
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Every read and write goes through
//! [`RepositoryIndex`], so the CLI takes the same locks and writes the same
//! files as any other process sharing the repository.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::{Context as _, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::core::config::Config;
use crate::core::index::RepositoryIndex;
use crate::ui::output::Verbosity;

/// Everything a command handler needs.
#[derive(Debug)]
pub struct Context {
    pub index: RepositoryIndex,
    pub verbosity: Verbosity,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);
    init_logging(verbosity, cli.debug);

    let config = Config::load(cli.config.as_deref(), cli.root.as_deref())
        .context("failed to load configuration")?;
    let index = RepositoryIndex::from_config(&config)?;
    tracing::debug!(
        root = %index.root().display(),
        format = %config.format(),
        name_field = config.name_field(),
        "opened repository"
    );

    let ctx = Context { index, verbosity };
    commands::dispatch(cli.command, &ctx)
}

/// Log to stderr. `RUST_LOG` wins unless `--debug` was given.
fn init_logging(verbosity: Verbosity, debug: bool) {
    let filter = if debug {
        EnvFilter::new(verbosity.log_directive())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()))
    };

    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
