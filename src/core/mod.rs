//! core
//!
//! Domain types, storage layout, and operations for jobstore.
//!
//! # Modules
//!
//! - [`types`] - Strong types: DefinitionName, Revision, RevisionSelector
//! - [`paths`] - Centralized path routing for the on-disk layout
//! - [`codec`] - Definition payloads and their file encodings
//! - [`ops`] - Per-definition exclusive locking
//! - [`store`] - Revision files, the audit log, and single-definition appends
//! - [`index`] - Repository-wide listing, bulk load, and lookups
//! - [`cache`] - Concurrently readable in-memory mirror
//! - [`watch`] - Filesystem watcher that keeps a cache current
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing keeps unsafe names and out-of-range revisions out of paths
//! - Files are the source of truth; the cache only mirrors them
//! - Every write is serialized per definition, never per repository

pub mod cache;
pub mod codec;
pub mod config;
pub mod index;
pub mod ops;
pub mod paths;
pub mod store;
pub mod types;
pub mod watch;
