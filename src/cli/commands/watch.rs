//! watch command - Mirror the repository in memory and report changes
//!
//! Loads every definition, starts a [`CacheWatcher`], and prints each
//! revision other processes add until the duration elapses.

use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::cache::RepositoryCache;
use crate::core::watch::{CacheUpdate, CacheWatcher};
use crate::ui::output;

/// Upper bound on a single wait when running without a deadline.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Watch for `duration` seconds, or until interrupted.
pub fn watch(ctx: &Context, duration: Option<u64>) -> Result<()> {
    let snapshot = ctx
        .index
        .load_all()
        .with_context(|| format!("failed to load {}", ctx.index.root().display()))?;
    let cache = Arc::new(RepositoryCache::from_snapshot(snapshot));

    let watcher = CacheWatcher::start(Arc::new(ctx.index.clone()), Arc::clone(&cache))?;
    let updates = watcher.subscribe();
    output::print(
        format!(
            "Watching {} ({} definitions)",
            watcher.root().display(),
            cache.len()
        ),
        ctx.verbosity,
    );

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let wait = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => left,
                _ => break,
            },
            None => IDLE_WAIT,
        };

        match updates.recv_timeout(wait) {
            Ok(CacheUpdate::Revision { name, revision }) => println!("{name} {revision}"),
            Ok(CacheUpdate::Audit { name }) => {
                tracing::debug!(definition = %name, "audit metadata refreshed");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    watcher.stop();
    output::print(
        format!("Stopped; {} definitions cached", cache.len()),
        ctx.verbosity,
    );
    Ok(())
}
