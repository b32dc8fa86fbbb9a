//! core::store
//!
//! Per-definition storage: reading heads and revisions, listing history,
//! and appending new revisions.
//!
//! # Modules
//!
//! - [`revisions`] - Revision file naming and enumeration
//! - [`audit`] - Binary audit log (author and notes per revision)
//!
//! # Append protocol
//!
//! 1. Create the definition directory if needed
//! 2. Acquire the [`DefinitionLock`]
//! 3. Re-read the head from disk under the lock, over revision files of
//!    every encoding
//! 4. Next revision is head + 1 (fails at [`Revision::MAX`])
//! 5. Encode the payload and prepare the audit record; bad input or a
//!    corrupt log fails here, before anything is written
//! 6. Write the revision file (staged, then renamed into place)
//! 7. Commit the audit record
//! 8. Release the lock
//!
//! The revision file is the source of truth for the head. A crash between
//! steps 6 and 7 leaves a valid revision without an audit record; nothing
//! is rolled back.
//!
//! Reads take no lock: revision files are immutable once renamed into place.

pub mod audit;
pub mod revisions;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use self::audit::{AuditLog, AuditLogError};
use crate::core::codec::{CodecError, Definition, DefinitionCodec};
use crate::core::ops::lock::{DefinitionLock, LockError};
use crate::core::paths::RepoPaths;
use crate::core::types::{DefinitionName, Revision, TypeError, UtcTimestamp};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The definition, or the requested revision of it, does not exist.
    #[error("{}", not_found_message(.name, .revision))]
    NotFound {
        name: String,
        revision: Option<Revision>,
    },

    /// The definition lock could not be obtained or released.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The audit log is corrupt or could not be written.
    #[error(transparent)]
    Audit(#[from] AuditLogError),

    /// A revision file could not be decoded, or a payload encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The definition already holds the highest expressible revision.
    #[error("definition '{name}' is at revision {head}; no further revisions can be numbered")]
    RevisionOverflow { name: String, head: Revision },

    /// The revision file allocated under the lock already exists.
    ///
    /// Only possible when something wrote revision files without the lock.
    #[error("revision {revision} of '{name}' already exists on disk")]
    RevisionExists { name: String, revision: Revision },

    /// A definition name failed validation.
    #[error(transparent)]
    InvalidName(#[from] TypeError),

    /// The configured name field is missing from a definition or not a string.
    #[error("definition has no string field '{field}' to take its name from")]
    MissingNameField { field: String },

    /// The dependency hook rejected a loaded definition.
    #[error("dependency hook failed for '{name}': {message}")]
    Hook { name: String, message: String },

    /// Other filesystem error.
    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),
}

fn not_found_message(name: &str, revision: &Option<Revision>) -> String {
    match revision {
        Some(rev) => format!("revision {rev} of definition '{name}' not found"),
        None => format!("definition '{name}' not found"),
    }
}

impl StoreError {
    /// True for [`StoreError::NotFound`], the normal negative result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// One row of a definition's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInfo {
    pub revision: Revision,
    /// Modification time of the revision file, when the filesystem reports one.
    pub modified: Option<UtcTimestamp>,
    /// Absent when the revision has no audit record.
    pub author: Option<String>,
    /// Absent when the revision has no audit record.
    pub notes: Option<String>,
}

/// Store for the revisions of individual definitions.
///
/// Every operation takes the definition's directory; the directory's final
/// component is the definition name.
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    codec: Arc<dyn DefinitionCodec>,
}

impl DefinitionStore {
    /// Create a store that reads and writes revisions with `codec`.
    pub fn new(codec: Arc<dyn DefinitionCodec>) -> Self {
        Self { codec }
    }

    /// The codec in use.
    pub fn codec(&self) -> &Arc<dyn DefinitionCodec> {
        &self.codec
    }

    fn ext(&self) -> &str {
        self.codec.extension()
    }

    fn name_of(dir: &Path) -> Result<DefinitionName, StoreError> {
        RepoPaths::name_of_dir(dir).ok_or_else(|| {
            StoreError::InvalidName(TypeError::InvalidDefinitionName(format!(
                "'{}' is not a definition directory",
                dir.display()
            )))
        })
    }

    /// Current head revision number ([`Revision::ZERO`] if none).
    pub fn head(&self, dir: &Path) -> Result<Revision, StoreError> {
        Ok(revisions::head(dir, self.ext())?)
    }

    /// Read the head revision, with its revision number injected.
    ///
    /// A definition without revisions yields `(Revision::ZERO, empty)`.
    pub fn read_head(&self, dir: &Path) -> Result<(Revision, Definition), StoreError> {
        let listing = revisions::list(dir, self.ext())?;
        match listing.last_key_value() {
            Some((rev, path)) => Ok((*rev, self.codec.read(path)?.with_revision(*rev))),
            None => Ok((Revision::ZERO, Definition::new())),
        }
    }

    /// Read a specific revision, with its revision number injected.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if that revision file does not exist.
    pub fn read_revision(&self, dir: &Path, rev: Revision) -> Result<Definition, StoreError> {
        let name = Self::name_of(dir)?;
        let path = revisions::path_for(dir, &name, rev, self.ext());
        if rev.is_zero() || !path.is_file() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                revision: Some(rev),
            });
        }
        Ok(self.codec.read(&path)?.with_revision(rev))
    }

    /// History of the definition, most recent first.
    ///
    /// Revisions without an audit record report no author or notes.
    pub fn list_revisions(&self, dir: &Path) -> Result<Vec<RevisionInfo>, StoreError> {
        let listing = revisions::list(dir, self.ext())?;
        let mut audit = AuditLog::read_all(dir)?;

        let mut history = Vec::with_capacity(listing.len());
        for (rev, path) in listing.into_iter().rev() {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(UtcTimestamp::from);
            let entry = audit.remove(&rev);
            history.push(RevisionInfo {
                revision: rev,
                modified,
                author: entry.as_ref().map(|e| e.author.clone()),
                notes: entry.map(|e| e.notes),
            });
        }
        Ok(history)
    }

    /// Append `definition` as the next revision of the definition in `dir`.
    ///
    /// The stored payload has its `revision` field set to the new number.
    /// Blocks while another thread or process is appending to the same
    /// definition.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Lock`] if the lock cannot be taken
    /// - [`StoreError::RevisionOverflow`] if the head is already [`Revision::MAX`]
    /// - [`StoreError::Codec`] if the payload cannot be encoded
    /// - [`StoreError::Audit`] if a field is too long or the log is corrupt,
    ///   in which case nothing is written; or if the revision was written but
    ///   committing its audit record failed, in which case the revision stays
    pub fn append(
        &self,
        dir: &Path,
        definition: &Definition,
        author: &str,
        notes: &str,
    ) -> Result<Revision, StoreError> {
        let name = Self::name_of(dir)?;
        let mut lock = DefinitionLock::acquire(dir)?;

        // Numbers taken in any encoding count, so writers configured with
        // different formats never share a revision.
        let head = revisions::allocated_head(dir)?;
        let next = head.next().ok_or_else(|| StoreError::RevisionOverflow {
            name: name.to_string(),
            head,
        })?;

        // Everything that can reject the append runs before the revision
        // file exists.
        let payload = definition.clone().with_revision(next);
        let bytes = self.codec.encode(&payload)?;
        let pending = AuditLog::prepare(&mut lock, next, author, notes)?;

        self.write_revision_file(dir, &name, next, &bytes)?;
        let offset = pending.commit(&mut lock)?;
        lock.release()?;

        debug!(
            definition = %name,
            revision = %next,
            audit_offset = offset,
            "revision appended"
        );
        Ok(next)
    }

    /// Stage `bytes` in a hidden temp file and rename it to the revision path.
    fn write_revision_file(
        &self,
        dir: &Path,
        name: &DefinitionName,
        rev: Revision,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let target = revisions::path_for(dir, name, rev, self.ext());
        if target.exists() {
            return Err(StoreError::RevisionExists {
                name: name.to_string(),
                revision: rev,
            });
        }

        let staged = RepoPaths::staging_file(dir, name, rev, self.ext());
        let written = File::create(&staged).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&staged, &target)) {
            if let Err(cleanup) = fs::remove_file(&staged) {
                warn!(path = %staged.display(), error = %cleanup, "failed to remove staged revision");
            }
            return Err(e.into());
        }
        Ok(())
    }
}
