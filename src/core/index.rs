//! core::index
//!
//! Repository-wide view over every definition under one root.
//!
//! # Architecture
//!
//! [`RepositoryIndex`] composes a [`DefinitionStore`] across the immediate
//! subdirectories of the repository root. It offers:
//!
//! - Listing definitions with their head revisions
//! - A bulk load of every revision of every definition (process startup)
//! - Single-definition lookups that avoid a full scan
//! - Saving a definition routed by its configured name field
//!
//! Definitions are named by a payload field chosen at construction time
//! (`name` unless configured otherwise).
//!
//! # Example
//!
//! ```ignore
//! use jobstore::core::index::RepositoryIndex;
//! use jobstore::core::codec::JsonCodec;
//!
//! let index = RepositoryIndex::new("/srv/jobs", Arc::new(JsonCodec));
//! let (name, rev) = index.save(&definition, "alice", "initial import")?;
//! let head = index.get_head(&name)?;
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::cache::{CachedRevision, DefinitionHistory};
use crate::core::codec::{Definition, DefinitionCodec};
use crate::core::config::{Config, DEFAULT_NAME_FIELD};
use crate::core::paths::RepoPaths;
use crate::core::store::audit::AuditLog;
use crate::core::store::revisions;
use crate::core::store::{DefinitionStore, RevisionInfo, StoreError};
use crate::core::types::{DefinitionName, Revision};

/// Hook run on every definition the index decodes.
///
/// This is where external dependencies a definition references get
/// resolved. Returning an error fails the load that triggered it.
pub trait DependencyHook: Send + Sync {
    fn resolve(&self, name: &DefinitionName, definition: &Definition) -> Result<(), String>;
}

/// A decoded revision file, attributed to a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRevision {
    pub name: DefinitionName,
    pub revision: Revision,
    pub definition: Definition,
}

/// Repository-wide operations over one root directory.
#[derive(Clone)]
pub struct RepositoryIndex {
    paths: RepoPaths,
    store: DefinitionStore,
    name_field: String,
    hook: Option<Arc<dyn DependencyHook>>,
}

impl std::fmt::Debug for RepositoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryIndex")
            .field("root", &self.paths.root())
            .field("codec", self.store.codec())
            .field("name_field", &self.name_field)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl RepositoryIndex {
    /// Index the repository at `root`, reading revisions with `codec`.
    pub fn new(root: impl Into<PathBuf>, codec: Arc<dyn DefinitionCodec>) -> Self {
        Self {
            paths: RepoPaths::new(root),
            store: DefinitionStore::new(codec),
            name_field: DEFAULT_NAME_FIELD.to_string(),
            hook: None,
        }
    }

    /// Index the configured repository with the configured codec and name field.
    pub fn from_config(config: &Config) -> Result<Self, crate::core::config::ConfigError> {
        let root = config.require_root()?;
        Ok(Self::new(root, config.format().codec()).with_name_field(config.name_field()))
    }

    /// Use `field` as the payload field naming a definition.
    pub fn with_name_field(mut self, field: impl Into<String>) -> Self {
        self.name_field = field.into();
        self
    }

    /// Run `hook` on every decoded definition.
    pub fn with_hook(mut self, hook: Arc<dyn DependencyHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The same index over a different spelling of the root, e.g. its
    /// canonical path.
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            paths: RepoPaths::new(root),
            ..self.clone()
        }
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub fn codec(&self) -> &Arc<dyn DefinitionCodec> {
        self.store.codec()
    }

    pub fn name_field(&self) -> &str {
        &self.name_field
    }

    fn dir(&self, name: &DefinitionName) -> PathBuf {
        self.paths.definition_dir(name)
    }

    fn run_hook(&self, name: &DefinitionName, definition: &Definition) -> Result<(), StoreError> {
        match &self.hook {
            Some(hook) => hook.resolve(name, definition).map_err(|message| StoreError::Hook {
                name: name.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    /// Every definition directory under the root with its head revision,
    /// sorted by name.
    ///
    /// Hidden entries, plain files, and directories whose names are not valid
    /// definition names are skipped. A missing root has no definitions.
    pub fn list_definitions(&self) -> Result<Vec<(DefinitionName, Revision)>, StoreError> {
        let entries = match fs::read_dir(self.root()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut definitions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = RepoPaths::name_of_dir(&entry.path()) else {
                continue;
            };
            let head = self.store.head(&entry.path())?;
            definitions.push((name, head));
        }
        definitions.sort();
        Ok(definitions)
    }

    /// Load every revision of one definition, with audit metadata.
    pub fn load_definition(&self, name: &DefinitionName) -> Result<DefinitionHistory, StoreError> {
        let dir = self.dir(name);
        let listing = revisions::list(&dir, self.codec().extension())?;
        let mut audit = AuditLog::read_all(&dir)?;

        let mut loaded = BTreeMap::new();
        for (rev, path) in listing {
            let definition = self.codec().read(&path)?.with_revision(rev);
            self.run_hook(name, &definition)?;
            loaded.insert(rev, Arc::new(CachedRevision::new(definition, audit.remove(&rev))));
        }
        Ok(DefinitionHistory::from_revisions(loaded))
    }

    /// Load every revision of every definition.
    ///
    /// A full synchronous scan, meant for startup; use [`get_head`] or
    /// [`get_revision`] for single lookups.
    ///
    /// [`get_head`]: RepositoryIndex::get_head
    /// [`get_revision`]: RepositoryIndex::get_revision
    pub fn load_all(&self) -> Result<BTreeMap<DefinitionName, DefinitionHistory>, StoreError> {
        let mut all = BTreeMap::new();
        for (name, _) in self.list_definitions()? {
            let history = self.load_definition(&name)?;
            debug!(definition = %name, revisions = history.len(), "loaded definition");
            all.insert(name, history);
        }
        Ok(all)
    }

    /// The head revision of `name`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the definition has no revisions.
    pub fn get_head(&self, name: &DefinitionName) -> Result<Definition, StoreError> {
        let (rev, definition) = self.store.read_head(&self.dir(name))?;
        if rev.is_zero() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                revision: None,
            });
        }
        self.run_hook(name, &definition)?;
        Ok(definition)
    }

    /// A specific revision of `name`.
    pub fn get_revision(&self, name: &DefinitionName, rev: Revision) -> Result<Definition, StoreError> {
        let definition = self.store.read_revision(&self.dir(name), rev)?;
        self.run_hook(name, &definition)?;
        Ok(definition)
    }

    /// History of `name`, most recent first.
    pub fn history(&self, name: &DefinitionName) -> Result<Vec<RevisionInfo>, StoreError> {
        let dir = self.dir(name);
        if !dir.is_dir() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
                revision: None,
            });
        }
        self.store.list_revisions(&dir)
    }

    /// The definition name carried in the configured name field.
    pub fn resolve_name(&self, definition: &Definition) -> Result<DefinitionName, StoreError> {
        let raw = definition
            .string_field(&self.name_field)
            .ok_or_else(|| StoreError::MissingNameField {
                field: self.name_field.clone(),
            })?;
        Ok(DefinitionName::new(raw)?)
    }

    /// Append `definition` as the next revision of the definition it names.
    pub fn save(
        &self,
        definition: &Definition,
        author: &str,
        notes: &str,
    ) -> Result<(DefinitionName, Revision), StoreError> {
        let name = self.resolve_name(definition)?;
        let rev = self.store.append(&self.dir(&name), definition, author, notes)?;
        Ok((name, rev))
    }

    /// Decode a revision file found on disk, attributing it by payload.
    ///
    /// The name is always the definition directory, the same key reads and
    /// audit refreshes use; a payload naming something else is warned about.
    /// The revision comes from the payload's `revision` field, falling back
    /// to the filename. Returns `Ok(None)` when `path` is not a
    /// revision file of this repository's encoding.
    pub fn decode_revision_file(&self, path: &Path) -> Result<Option<DecodedRevision>, StoreError> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some((file_def, file_rev)) =
            revisions::split_revision_file_name(file_name, self.codec().extension())
        else {
            return Ok(None);
        };
        if path.parent().and_then(RepoPaths::name_of_dir).as_ref() != Some(&file_def) {
            return Ok(None);
        }

        let definition = self.codec().read(path)?;
        if let Some(payload) = definition.string_field(&self.name_field) {
            if payload != file_def.as_str() {
                warn!(
                    path = %path.display(),
                    payload,
                    directory = %file_def,
                    "payload name differs from its directory; keeping the directory"
                );
            }
        }
        let revision = definition.revision().unwrap_or(file_rev);
        let definition = definition.with_revision(revision);
        self.run_hook(&file_def, &definition)?;

        Ok(Some(DecodedRevision {
            name: file_def,
            revision,
            definition,
        }))
    }
}
