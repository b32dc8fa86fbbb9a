//! Jobstore - a filesystem-backed, append-only store for job definitions
//!
//! Every definition lives in its own directory under a repository root. Each
//! save writes a new numbered revision file next to the previous ones and
//! records who made it, and why, in a binary audit log. Nothing is ever
//! rewritten, so any number of processes can share one root.
//!
//! # Architecture
//!
//! - [`core`] - Definition types, on-disk layout, locking, the store itself,
//!   the in-memory cache and the watcher that keeps it current
//! - [`cli`] - The `jobstore` command-line interface
//! - [`ui`] - Terminal output helpers for the CLI
//!
//! # Correctness Invariants
//!
//! 1. Revision numbers of a definition are contiguous from 1 and never reused
//! 2. An existing revision file is never modified
//! 3. Appends to one definition are serialized across threads and processes
//! 4. Every audit record belongs to a revision file that exists

pub mod cli;
pub mod core;
pub mod ui;
