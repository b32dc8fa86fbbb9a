//! core::ops
//!
//! Locking for mutating operations.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive per-definition lock
//!
//! # Architecture
//!
//! Every append to a definition:
//! 1. Acquires the exclusive lock on that definition's directory
//! 2. Re-reads the head under the lock
//! 3. Writes the next revision file, then its audit record
//! 4. Releases the lock
//!
//! # Example
//!
//! ```ignore
//! use jobstore::core::ops::DefinitionLock;
//!
//! let mut lock = DefinitionLock::acquire(&dir)?;
//! // ... read head, write the next revision, append the audit record ...
//! lock.release()?;
//! ```

pub mod lock;

pub use lock::{DefinitionLock, LockError};
