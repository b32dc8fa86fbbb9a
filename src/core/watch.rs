//! core::watch
//!
//! Keeps a [`RepositoryCache`] current with revisions written by other
//! processes.
//!
//! # Architecture
//!
//! A `notify` watcher subscribes recursively to the repository root and
//! forwards raw events over a channel to a dedicated worker thread. The
//! worker applies each relevant event to the cache as an atomic per-name
//! merge:
//!
//! - A revision file appears: decode it, merge it at its revision number
//! - A `HEAD` file changes: re-read that definition's audit log and attach
//!   the metadata to cached revisions
//! - A definition directory appears: load whatever it already contains,
//!   since files created before the directory watch was added emit no event
//!
//! Revision files are renamed into place, so both create and rename events
//! are treated as arrivals. Decode failures are logged and skipped.
//!
//! The watcher complements, and does not replace, the startup bulk load.
//!
//! # Shutdown
//!
//! [`CacheWatcher::stop`] drops the subscription, lets the worker finish the
//! events already queued, and joins it. The worker only exits once its
//! queue is empty. Dropping the watcher does the same.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::cache::{CachedRevision, RepositoryCache};
use crate::core::index::RepositoryIndex;
use crate::core::paths::{RepoPaths, HEAD_FILE};
use crate::core::store::audit::AuditLog;
use crate::core::types::{DefinitionName, Revision};

/// How often an idle worker checks for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Errors from starting the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The filesystem subscription could not be established.
    #[error("failed to watch {path}: {source}")]
    Subscribe {
        path: PathBuf,
        source: notify::Error,
    },

    /// The repository root could not be created.
    #[error("failed to create repository root {path}: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The worker thread could not be spawned.
    #[error("failed to spawn watcher thread: {0}")]
    Spawn(std::io::Error),
}

/// A change the watcher applied to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// A revision was merged.
    Revision {
        name: DefinitionName,
        revision: Revision,
    },
    /// Audit metadata for a definition was refreshed.
    Audit { name: DefinitionName },
}

type Subscribers = Arc<Mutex<Vec<Sender<CacheUpdate>>>>;

/// Applies filesystem events to the cache. Owned by the worker thread.
struct Applier {
    index: Arc<RepositoryIndex>,
    cache: Arc<RepositoryCache>,
    subscribers: Subscribers,
}

impl Applier {
    fn publish(&self, update: CacheUpdate) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    fn apply(&self, event: &Event) {
        let arrival = matches!(
            event.kind,
            EventKind::Create(_)
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Modify(ModifyKind::Data(_))
                | EventKind::Modify(ModifyKind::Any)
        );
        if !arrival {
            return;
        }

        for path in &event.paths {
            if path.file_name().and_then(|n| n.to_str()) == Some(HEAD_FILE) {
                if let Some(dir) = path.parent() {
                    self.refresh_audit(dir);
                }
            } else if matches!(event.kind, EventKind::Create(CreateKind::Folder)) || path.is_dir() {
                self.scan_directory(path);
            } else {
                self.merge_revision_file(path);
            }
        }
    }

    fn merge_revision_file(&self, path: &Path) {
        let decoded = match self.index.decode_revision_file(path) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping undecodable revision file");
                return;
            }
        };

        let audit = path
            .parent()
            .and_then(|dir| match AuditLog::read_all(dir) {
                Ok(records) => Some(records),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot read audit log");
                    None
                }
            })
            .and_then(|mut records| records.remove(&decoded.revision));

        self.cache.merge_revision(
            &decoded.name,
            decoded.revision,
            CachedRevision::new(decoded.definition, audit),
        );
        debug!(definition = %decoded.name, revision = %decoded.revision, "cache merged revision");
        self.publish(CacheUpdate::Revision {
            name: decoded.name,
            revision: decoded.revision,
        });
    }

    fn refresh_audit(&self, dir: &Path) {
        let Some(name) = RepoPaths::name_of_dir(dir) else {
            return;
        };
        match AuditLog::read_all(dir) {
            Ok(records) => {
                self.cache.merge_audit(&name, &records);
                self.publish(CacheUpdate::Audit { name });
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "cannot read audit log"),
        }
    }

    fn scan_directory(&self, dir: &Path) {
        if dir.parent() != Some(self.index.root()) {
            return;
        }
        let Some(name) = RepoPaths::name_of_dir(dir) else {
            return;
        };
        match self.index.load_definition(&name) {
            Ok(history) if !history.is_empty() => {
                let revisions: Vec<Revision> = history.revisions().map(|(rev, _)| rev).collect();
                self.cache.merge_history(&name, &history);
                for revision in revisions {
                    self.publish(CacheUpdate::Revision {
                        name: name.clone(),
                        revision,
                    });
                }
            }
            Ok(_) => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "cannot load new definition"),
        }
    }
}

/// Background observer that mirrors on-disk changes into a cache.
pub struct CacheWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    subscribers: Subscribers,
}

impl std::fmt::Debug for CacheWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWatcher")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish()
    }
}

impl CacheWatcher {
    /// Start watching the root of `index`, merging changes into `cache`.
    ///
    /// Creates the root if it does not exist. Returns once the subscription
    /// is established; all further work happens on a background thread.
    pub fn start(index: Arc<RepositoryIndex>, cache: Arc<RepositoryCache>) -> Result<Self, WatchError> {
        let root = index.root().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| WatchError::Root {
            path: root.clone(),
            source,
        })?;
        // Events report canonical paths on some platforms.
        let root = root.canonicalize().map_err(|source| WatchError::Root {
            path: root.clone(),
            source,
        })?;
        let index = if index.root() == root {
            index
        } else {
            Arc::new(index.with_root(root.clone()))
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // The worker may already be gone during shutdown.
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|source| WatchError::Subscribe {
            path: root.clone(),
            source,
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Subscribe {
                path: root.clone(),
                source,
            })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let applier = Applier {
            index,
            cache,
            subscribers: Arc::clone(&subscribers),
        };
        let worker = {
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("jobstore-watch".into())
                .spawn(move || run_worker(rx, applier, shutdown))
                .map_err(WatchError::Spawn)?
        };

        info!(root = %root.display(), "cache watcher started");
        Ok(Self {
            root,
            watcher: Some(watcher),
            worker: Some(worker),
            shutdown,
            subscribers,
        })
    }

    /// The watched root (canonicalized).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True until [`stop`](CacheWatcher::stop) is called.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Receive every [`CacheUpdate`] applied from now on.
    pub fn subscribe(&self) -> Receiver<CacheUpdate> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Cancel the subscription and wait for queued merges to finish.
    pub fn stop(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if self.watcher.take().is_none() {
            return;
        }
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("cache watcher thread panicked");
            }
        }
        info!(root = %self.root.display(), "cache watcher stopped");
    }
}

impl Drop for CacheWatcher {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn run_worker(rx: Receiver<notify::Result<Event>>, applier: Applier, shutdown: Arc<AtomicBool>) {
    loop {
        match rx.recv_timeout(SHUTDOWN_POLL) {
            Ok(Ok(event)) => applier.apply(&event),
            Ok(Err(e)) => warn!(error = %e, "filesystem watch error"),
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
