//! core::ops::lock
//!
//! Exclusive per-definition lock for revision allocation.
//!
//! # Architecture
//!
//! Appending a revision reads the current head and then writes the next
//! revision file and audit record. That read-then-write must be atomic with
//! respect to every other writer of the same definition, in this process
//! and in any other process sharing the filesystem.
//!
//! The lock has two layers:
//!
//! 1. An in-process gate keyed by the canonical definition directory. Two
//!    threads of one process never hold the same definition at once, even on
//!    platforms where the OS lock is per-process and therefore reentrant.
//! 2. An OS-level exclusive advisory lock (via `fs2`) on the definition's
//!    `HEAD` file, which serializes cooperating processes.
//!
//! Unrelated definitions never contend: there is no repository-wide lock.
//!
//! # Storage
//!
//! - `<root>/<name>/HEAD` - the lock target, shared with the audit log
//!
//! # Invariants
//!
//! - Acquisition blocks until the lock is available; there is no timeout
//! - The lock is released on drop (RAII), on every exit path
//! - `HEAD` is only written through the file handle owned by the guard
//!
//! # Example
//!
//! ```ignore
//! use jobstore::core::ops::lock::DefinitionLock;
//!
//! let mut lock = DefinitionLock::acquire(&dir)?;
//! // head re-read, revision written, audit appended through lock.file_mut()
//! drop(lock);
//! ```

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, OnceLock, PoisonError};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::core::paths::RepoPaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to create the definition directory or the lock file.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// In-process gate: the set of definition directories currently held.
struct LocalGate {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl LocalGate {
    fn global() -> &'static LocalGate {
        static GATE: OnceLock<LocalGate> = OnceLock::new();
        GATE.get_or_init(|| LocalGate {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        })
    }

    /// Block until `key` is free, then mark it held.
    fn enter(&self, key: &Path) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_path_buf());
    }

    fn leave(&self, key: &Path) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(key);
        drop(held);
        self.released.notify_all();
    }
}

/// An exclusive lock on one definition directory.
///
/// The lock is automatically released when this guard is dropped (RAII
/// pattern), including during unwinding.
#[derive(Debug)]
pub struct DefinitionLock {
    /// Canonical definition directory; the in-process gate key.
    key: PathBuf,
    /// Path to the `HEAD` file.
    path: PathBuf,
    /// The open file handle with the OS lock held.
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl DefinitionLock {
    /// Acquire the lock for the definition stored in `dir`, blocking until it
    /// is available.
    ///
    /// Creates `dir` and its `HEAD` file if they do not exist.
    ///
    /// # Errors
    ///
    /// - [`LockError::CreateFailed`] if the directory or `HEAD` cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be taken
    ///
    /// No retry is attempted; retry policy belongs to the caller.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let key = dir.canonicalize().map_err(|e| {
            LockError::CreateFailed(format!("cannot resolve {}: {}", dir.display(), e))
        })?;
        let path = RepoPaths::head_file(&key);

        let gate = LocalGate::global();
        gate.enter(&key);

        // From here on the gate must be left on every error path.
        match Self::lock_file(&path) {
            Ok(file) => {
                debug!(path = %path.display(), "definition lock acquired");
                Ok(Self {
                    key,
                    path,
                    file: Some(file),
                })
            }
            Err(e) => {
                gate.leave(&key);
                Err(e)
            }
        }
    }

    fn lock_file(path: &Path) -> Result<File, LockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e)))?;

        file.lock_exclusive()
            .map_err(|e| LockError::AcquireFailed(format!("{}: {}", path.display(), e)))?;
        Ok(file)
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path to the locked `HEAD` file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The canonical definition directory this lock covers.
    pub fn dir(&self) -> &Path {
        &self.key
    }

    /// The locked `HEAD` file handle, for writers inside the critical section.
    ///
    /// Returns `None` once the lock has been released.
    pub fn file_mut(&mut self) -> Option<&mut File> {
        self.file.as_mut()
    }

    /// Release the lock explicitly.
    ///
    /// This is called automatically on drop. Calling it more than once is a
    /// no-op.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            let result = file.unlock();
            LocalGate::global().leave(&self.key);
            result.map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
            debug!(path = %self.path.display(), "definition lock released");
        }
        Ok(())
    }
}

impl Drop for DefinitionLock {
    fn drop(&mut self) {
        // Best-effort release on drop; closing the handle drops the OS lock anyway.
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            LocalGate::global().leave(&self.key);
        }
    }
}
