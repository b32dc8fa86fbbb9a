//! core::cache
//!
//! In-memory mirror of a repository's definitions.
//!
//! # Consistency
//!
//! The cache maps each definition name to an immutable
//! [`DefinitionHistory`] behind an `Arc`. Writers never mutate a history in
//! place: they build a new one and swap it in under the write lock, so a
//! reader holding an `Arc<DefinitionHistory>` always sees a complete
//! snapshot of that definition.
//!
//! The cache is eventually consistent with disk. It is seeded by
//! [`RepositoryIndex::load_all`](crate::core::index::RepositoryIndex::load_all)
//! and kept current by [`CacheWatcher`](crate::core::watch::CacheWatcher).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::codec::Definition;
use crate::core::store::audit::AuditEntry;
use crate::core::types::{DefinitionName, Revision, RevisionSelector};

/// One cached revision: its payload and audit metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRevision {
    pub definition: Definition,
    /// `None` when the revision has no audit record (yet).
    pub audit: Option<AuditEntry>,
}

impl CachedRevision {
    pub fn new(definition: Definition, audit: Option<AuditEntry>) -> Self {
        Self { definition, audit }
    }
}

/// All known revisions of one definition plus its head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionHistory {
    revisions: BTreeMap<Revision, Arc<CachedRevision>>,
    /// Entry of the highest revision; recomputed on every construction.
    head: Option<(Revision, Arc<CachedRevision>)>,
}

impl DefinitionHistory {
    /// Build a history from its revisions.
    pub fn from_revisions(revisions: BTreeMap<Revision, Arc<CachedRevision>>) -> Self {
        let head = revisions
            .last_key_value()
            .map(|(rev, cached)| (*rev, Arc::clone(cached)));
        Self { revisions, head }
    }

    /// The head revision number, or [`Revision::ZERO`] if empty.
    pub fn head_revision(&self) -> Revision {
        self.head.as_ref().map(|(rev, _)| *rev).unwrap_or(Revision::ZERO)
    }

    /// The head entry.
    pub fn head(&self) -> Option<&CachedRevision> {
        self.head.as_ref().map(|(_, cached)| cached.as_ref())
    }

    /// A specific revision.
    pub fn get(&self, rev: Revision) -> Option<&CachedRevision> {
        self.revisions.get(&rev).map(Arc::as_ref)
    }

    /// The head or a specific revision.
    pub fn select(&self, selector: RevisionSelector) -> Option<&CachedRevision> {
        match selector {
            RevisionSelector::Head => self.head(),
            RevisionSelector::Number(rev) => self.get(rev),
        }
    }

    /// Revisions in ascending order.
    pub fn revisions(&self) -> impl Iterator<Item = (Revision, &CachedRevision)> {
        self.revisions.iter().map(|(rev, cached)| (*rev, cached.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// A copy with `rev` inserted (or replaced).
    pub fn with_revision(&self, rev: Revision, cached: CachedRevision) -> Self {
        let mut revisions = self.revisions.clone();
        revisions.insert(rev, Arc::new(cached));
        Self::from_revisions(revisions)
    }

    /// A copy with every revision from `other` inserted (or replaced).
    pub fn merged_with(&self, other: &DefinitionHistory) -> Self {
        let mut revisions = self.revisions.clone();
        for (rev, cached) in &other.revisions {
            revisions.insert(*rev, Arc::clone(cached));
        }
        Self::from_revisions(revisions)
    }

    /// A copy with audit metadata attached to the matching revisions.
    ///
    /// Revisions not present in `audit` keep whatever metadata they had.
    pub fn with_audit(&self, audit: &BTreeMap<Revision, AuditEntry>) -> Self {
        let revisions = self
            .revisions
            .iter()
            .map(|(rev, cached)| match audit.get(rev) {
                Some(entry) if cached.audit.as_ref() != Some(entry) => (
                    *rev,
                    Arc::new(CachedRevision::new(
                        cached.definition.clone(),
                        Some(entry.clone()),
                    )),
                ),
                _ => (*rev, Arc::clone(cached)),
            })
            .collect();
        Self::from_revisions(revisions)
    }
}

/// Shared, concurrently readable cache of every definition in a repository.
#[derive(Debug, Default)]
pub struct RepositoryCache {
    entries: RwLock<HashMap<DefinitionName, Arc<DefinitionHistory>>>,
}

impl RepositoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded from a bulk load.
    pub fn from_snapshot(snapshot: BTreeMap<DefinitionName, DefinitionHistory>) -> Self {
        let cache = Self::new();
        cache.replace_all(snapshot);
        cache
    }

    /// Replace the whole cache with `snapshot`.
    pub fn replace_all(&self, snapshot: BTreeMap<DefinitionName, DefinitionHistory>) {
        let fresh: HashMap<_, _> = snapshot
            .into_iter()
            .map(|(name, history)| (name, Arc::new(history)))
            .collect();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Snapshot of one definition.
    pub fn get(&self, name: &DefinitionName) -> Option<Arc<DefinitionHistory>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The cached head of `name`.
    pub fn head(&self, name: &DefinitionName) -> Option<CachedRevision> {
        self.get(name)?.head().cloned()
    }

    /// A cached revision of `name`.
    pub fn revision(&self, name: &DefinitionName, rev: Revision) -> Option<CachedRevision> {
        self.get(name)?.get(rev).cloned()
    }

    /// The head or a specific revision of `name`.
    pub fn select(&self, name: &DefinitionName, selector: RevisionSelector) -> Option<CachedRevision> {
        self.get(name)?.select(selector).cloned()
    }

    /// Every cached definition name with its head revision, sorted by name.
    pub fn names(&self) -> Vec<(DefinitionName, Revision)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = entries
            .iter()
            .map(|(name, history)| (name.clone(), history.head_revision()))
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically apply `update` to the history of `name`.
    ///
    /// `update` receives the current history (empty if unknown) and returns
    /// its replacement.
    fn swap(&self, name: &DefinitionName, update: impl FnOnce(&DefinitionHistory) -> DefinitionHistory) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let next = match entries.get(name) {
            Some(current) => update(current),
            None => update(&DefinitionHistory::default()),
        };
        entries.insert(name.clone(), Arc::new(next));
    }

    /// Insert or replace one revision of `name`, recomputing its head.
    pub fn merge_revision(&self, name: &DefinitionName, rev: Revision, cached: CachedRevision) {
        self.swap(name, |current| current.with_revision(rev, cached));
    }

    /// Merge every revision of `history` into the entry for `name`.
    pub fn merge_history(&self, name: &DefinitionName, history: &DefinitionHistory) {
        self.swap(name, |current| current.merged_with(history));
    }

    /// Attach audit metadata to already cached revisions of `name`.
    ///
    /// Does nothing for a name that is not cached.
    pub fn merge_audit(&self, name: &DefinitionName, audit: &BTreeMap<Revision, AuditEntry>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = entries.get(name) {
            let next = current.with_audit(audit);
            entries.insert(name.clone(), Arc::new(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn name(s: &str) -> DefinitionName {
        DefinitionName::new(s).unwrap()
    }

    fn rev(n: u32) -> Revision {
        Revision::new(n).unwrap()
    }

    fn cached(n: u32) -> CachedRevision {
        let definition = Definition::from_value(json!({"n": n}))
            .unwrap()
            .with_revision(rev(n));
        CachedRevision::new(definition, None)
    }

    fn audit(author: &str) -> AuditEntry {
        AuditEntry {
            author: author.into(),
            notes: String::new(),
        }
    }

    #[test]
    fn empty_history_has_zero_head() {
        let history = DefinitionHistory::default();
        assert_eq!(history.head_revision(), Revision::ZERO);
        assert!(history.head().is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn head_follows_highest_revision() {
        let history = DefinitionHistory::default()
            .with_revision(rev(2), cached(2))
            .with_revision(rev(1), cached(1));
        assert_eq!(history.head_revision(), rev(2));
        assert_eq!(history.head(), Some(&cached(2)));

        let history = history.with_revision(rev(3), cached(3));
        assert_eq!(history.head_revision(), rev(3));
        assert_eq!(history.select(RevisionSelector::Head), Some(&cached(3)));
        assert_eq!(history.select(RevisionSelector::Number(rev(1))), Some(&cached(1)));
    }

    #[test]
    fn merge_revision_creates_and_extends_entries() {
        let cache = RepositoryCache::new();
        cache.merge_revision(&name("etl"), rev(1), cached(1));
        cache.merge_revision(&name("etl"), rev(2), cached(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.head(&name("etl")), Some(cached(2)));
        assert_eq!(cache.revision(&name("etl"), rev(1)), Some(cached(1)));
        assert_eq!(cache.revision(&name("etl"), rev(3)), None);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let cache = RepositoryCache::new();
        cache.merge_revision(&name("etl"), rev(1), cached(1));
        let before = cache.get(&name("etl")).unwrap();

        cache.merge_revision(&name("etl"), rev(2), cached(2));

        assert_eq!(before.head_revision(), rev(1));
        assert_eq!(before.len(), 1);
        assert_eq!(cache.get(&name("etl")).unwrap().head_revision(), rev(2));
    }

    #[test]
    fn merge_audit_only_touches_known_revisions() {
        let cache = RepositoryCache::new();
        cache.merge_revision(&name("etl"), rev(1), cached(1));

        let mut records = BTreeMap::new();
        records.insert(rev(1), audit("alice"));
        records.insert(rev(2), audit("bob"));
        cache.merge_audit(&name("etl"), &records);
        cache.merge_audit(&name("unknown"), &records);

        let history = cache.get(&name("etl")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(rev(1)).unwrap().audit, Some(audit("alice")));
        assert!(cache.get(&name("unknown")).is_none());
    }

    #[test]
    fn replace_all_discards_previous_entries() {
        let cache = RepositoryCache::new();
        cache.merge_revision(&name("old"), rev(1), cached(1));

        let mut snapshot = BTreeMap::new();
        snapshot.insert(
            name("new"),
            DefinitionHistory::default().with_revision(rev(4), cached(4)),
        );
        cache.replace_all(snapshot);

        assert_eq!(cache.names(), vec![(name("new"), rev(4))]);
    }

    #[test]
    fn merge_history_unions_revisions() {
        let cache = RepositoryCache::new();
        cache.merge_revision(&name("etl"), rev(1), cached(1));
        let incoming = DefinitionHistory::default()
            .with_revision(rev(2), cached(2))
            .with_revision(rev(3), cached(3));

        cache.merge_history(&name("etl"), &incoming);
        let history = cache.get(&name("etl")).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.head_revision(), rev(3));
    }

    #[test]
    fn concurrent_merges_are_not_lost() {
        let cache = Arc::new(RepositoryCache::new());
        let handles: Vec<_> = (1..=20)
            .map(|n| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.merge_revision(&name("etl"), rev(n), cached(n)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history = cache.get(&name("etl")).unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history.head_revision(), rev(20));
    }
}
