//! core::paths
//!
//! Centralized path routing for repository storage.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/
//!   <name>/
//!     HEAD                  lock + audit log (binary)
//!     <name>.001.<ext>      revision 1
//!     <name>.002.<ext>      revision 2
//!     .<name>.003.<ext>.tmp in-flight write, renamed into place
//! ```
//!
//! **Hard rule:** No code outside this module joins definition or revision
//! file names onto a path by hand.
//!
//! # Example
//!
//! ```
//! use jobstore::core::paths::RepoPaths;
//! use jobstore::core::types::{DefinitionName, Revision};
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new("/srv/jobs");
//! let name = DefinitionName::new("pricing").unwrap();
//!
//! assert_eq!(paths.definition_dir(&name), PathBuf::from("/srv/jobs/pricing"));
//! assert_eq!(
//!     RepoPaths::revision_file(&paths.definition_dir(&name), &name, Revision::FIRST, "json"),
//!     PathBuf::from("/srv/jobs/pricing/pricing.001.json")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::core::types::{DefinitionName, Revision};

/// Name of the per-definition lock and audit-log file.
pub const HEAD_FILE: &str = "HEAD";

/// Path routing for one repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    root: PathBuf,
}

impl RepoPaths {
    /// Create path routing for the repository at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every revision of `name`.
    pub fn definition_dir(&self, name: &DefinitionName) -> PathBuf {
        self.root.join(name.as_str())
    }

    // =========================================================================
    // Per-definition paths (take the definition directory directly)
    // =========================================================================

    /// The `HEAD` lock + audit-log file inside a definition directory.
    pub fn head_file(dir: &Path) -> PathBuf {
        dir.join(HEAD_FILE)
    }

    /// `<dir>/<name>.<NNN>.<ext>`
    pub fn revision_file(dir: &Path, name: &DefinitionName, rev: Revision, ext: &str) -> PathBuf {
        dir.join(format!("{}.{}.{}", name, rev.file_component(), ext))
    }

    /// Hidden temp file a revision is staged in before being renamed into place.
    ///
    /// The leading `.` and trailing `.tmp` keep it out of revision listings.
    pub fn staging_file(dir: &Path, name: &DefinitionName, rev: Revision, ext: &str) -> PathBuf {
        dir.join(format!(
            ".{}.{}.{}.{}.tmp",
            name,
            rev.file_component(),
            ext,
            std::process::id()
        ))
    }

    /// The definition name a directory stands for (its final component).
    ///
    /// Returns `None` when the directory name is not a valid definition name.
    pub fn name_of_dir(dir: &Path) -> Option<DefinitionName> {
        let component = dir.file_name()?.to_str()?;
        DefinitionName::new(component).ok()
    }
}
