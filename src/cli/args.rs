//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--root <dir>`: Repository root (overrides the configured root)
//! - `--config <path>`: Global config file (bypasses discovery)
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::types::RevisionSelector;

/// Jobstore - an append-only, versioned store for job definitions
#[derive(Parser, Debug)]
#[command(name = "jobstore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Global config file to use instead of the discovered one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List definitions with their head revisions
    #[command(
        name = "list",
        after_help = "\
EXAMPLES:
    jobstore list
    jobstore --root /srv/jobs list"
    )]
    List,

    /// Print one revision of a definition
    #[command(
        name = "show",
        long_about = "Print one revision of a definition.\n\n\
            The revision is printed in the repository's encoding, including the \
            `revision` field the store stamps on every payload.",
        after_help = "\
EXAMPLES:
    # Current head
    jobstore show pricing

    # A fixed revision
    jobstore show pricing --revision 2"
    )]
    Show {
        /// Definition name
        name: String,

        /// Revision number, or `head`
        #[arg(short, long, default_value = "head")]
        revision: RevisionSelector,
    },

    /// Show every revision of a definition with its audit metadata
    #[command(name = "history")]
    History {
        /// Definition name
        name: String,
    },

    /// Append a definition file as the next revision
    #[command(
        name = "append",
        long_about = "Append a definition file as the next revision.\n\n\
            The file is decoded by its extension (`.json` or `.toml`), falling back \
            to the repository's encoding. The definition it belongs to is taken \
            from the configured name field unless --name is given.",
        after_help = "\
EXAMPLES:
    jobstore append pricing.json --notes \"raise limits\"
    jobstore append draft.toml --name pricing --author ci"
    )]
    Append {
        /// Definition file to append
        file: PathBuf,

        /// Store under this definition name (overwrites the name field)
        #[arg(long)]
        name: Option<String>,

        /// Author recorded in the audit log (defaults to $USER)
        #[arg(long)]
        author: Option<String>,

        /// Notes recorded in the audit log
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Load the repository and print changes as other processes write them
    #[command(name = "watch")]
    Watch {
        /// Stop after this many seconds (runs until interrupted otherwise)
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Revision;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn show_defaults_to_head() {
        let cli = Cli::try_parse_from(["jobstore", "show", "pricing"]).unwrap();
        match cli.command {
            Command::Show { name, revision } => {
                assert_eq!(name, "pricing");
                assert_eq!(revision, RevisionSelector::Head);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn show_parses_revision_number() {
        let cli = Cli::try_parse_from(["jobstore", "show", "pricing", "-r", "7"]).unwrap();
        match cli.command {
            Command::Show { revision, .. } => {
                assert_eq!(revision, RevisionSelector::Number(Revision::new(7).unwrap()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn show_rejects_revision_zero() {
        assert!(Cli::try_parse_from(["jobstore", "show", "pricing", "-r", "0"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["jobstore", "list", "--root", "/srv/jobs", "--debug"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/srv/jobs")));
        assert!(cli.debug);
    }

    #[test]
    fn append_arguments() {
        let cli = Cli::try_parse_from([
            "jobstore", "append", "p.json", "--author", "alice", "--notes", "init",
        ])
        .unwrap();
        match cli.command {
            Command::Append {
                file,
                name,
                author,
                notes,
            } => {
                assert_eq!(file, PathBuf::from("p.json"));
                assert_eq!(name, None);
                assert_eq!(author.as_deref(), Some("alice"));
                assert_eq!(notes, "init");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
