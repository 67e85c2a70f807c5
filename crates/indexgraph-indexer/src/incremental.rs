//! C11 incremental indexer: given `{added, modified, deleted}` paths, runs
//! C2-C5 on the changed set and replaces just those files' rows, with
//! bounded per-repository concurrency (exactly one pass runs at a time;
//! overlapping requests coalesce into the next run).

use indexgraph_core::error::StateError;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IncrementalResult {
    pub files_updated: u64,
    pub files_deleted: u64,
    pub symbols_extracted: u64,
    pub references_extracted: u64,
    pub errors: Vec<String>,
}

/// Per-repository mutual exclusion: a single in-flight incremental pass at a
/// time. A caller that finds the repository already busy should coalesce
/// its change set into the next run rather than spawn a second pass.
#[derive(Default)]
pub struct IncrementalGate {
    busy: Mutex<HashSet<String>>,
}

impl IncrementalGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempt to mark `repository_id` as busy. Returns `None` if a pass is
    /// already running for it, in which case the caller should merge its
    /// change set into the next flush instead.
    pub fn try_enter(self: &Arc<Self>, repository_id: &str) -> Option<IncrementalGuard> {
        let mut busy = self.busy.lock().unwrap();
        if busy.contains(repository_id) {
            return None;
        }
        busy.insert(repository_id.to_string());
        Some(IncrementalGuard { gate: Arc::clone(self), repository_id: repository_id.to_string() })
    }
}

pub struct IncrementalGuard {
    gate: Arc<IncrementalGate>,
    repository_id: String,
}

impl Drop for IncrementalGuard {
    fn drop(&mut self) {
        self.gate.busy.lock().unwrap().remove(&self.repository_id);
    }
}

/// Apply one change set to `repository_id`. Deleted paths are removed first
/// (cascading their symbols/references/edges and appending a deletion
/// manifest entry); added/modified paths are rescanned and replaced via the
/// scoped two-pass protocol.
pub fn run_incremental(
    conn: &Connection,
    repository_id: &str,
    repo_root: &Path,
    changes: &ChangeSet,
    manifest_path: &Path,
) -> IncrementalResult {
    let mut result = IncrementalResult::default();

    for path in &changes.deleted {
        match delete_one(conn, repository_id, path, manifest_path) {
            Ok(()) => result.files_deleted += 1,
            Err(err) => {
                warn!(path = %path, error = %err, "incremental delete failed");
                result.errors.push(format!("{path}: {err}"));
            }
        }
    }

    let touched: Vec<String> = changes.added.iter().chain(changes.modified.iter()).cloned().collect();
    if !touched.is_empty() {
        match crate::pipeline::run_scoped_index(conn, repository_id, repo_root, &touched) {
            Ok(stats) => {
                result.files_updated = stats.files_indexed;
                result.symbols_extracted = stats.symbols_extracted;
                result.references_extracted = stats.references_found;
            }
            Err(err) => {
                warn!(error = %err, "incremental scoped index failed");
                result.errors.push(err.to_string());
            }
        }
    }

    result
}

fn delete_one(conn: &Connection, repository_id: &str, path: &str, manifest_path: &Path) -> Result<(), StateError> {
    let Some(existing) = indexgraph_state::files::get_by_path(conn, repository_id, path)? else {
        return Ok(());
    };
    indexgraph_state::pipeline::delete_path(conn, repository_id, path)?;
    indexgraph_state::sync::manifest::append(
        manifest_path,
        &indexgraph_state::sync::manifest::DeletionEntry {
            table: "indexed_files".to_string(),
            id: existing.id,
            deleted_at: indexgraph_core::time::now_iso8601(),
        },
    )?;
    Ok(())
}

/// Coalescing accumulator the watcher drains into a `ChangeSet` at each
/// debounce flush: later events for the same path overwrite earlier ones.
#[derive(Default)]
pub struct PendingChanges {
    entries: HashMap<String, PendingKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Added,
    Modified,
    Deleted,
}

impl PendingChanges {
    pub fn has_pending(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn record(&mut self, path: String, kind: PendingKind) {
        self.entries.insert(path, kind);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for (path, kind) in self.entries.drain() {
            match kind {
                PendingKind::Added => changes.added.push(path),
                PendingKind::Modified => changes.modified.push(path),
                PendingKind::Deleted => changes.deleted.push(path),
            }
        }
        changes.added.sort();
        changes.modified.sort();
        changes.deleted.sort();
        changes
    }

    /// Re-insert a previously drained `ChangeSet` that couldn't be dispatched
    /// (busy gate), so it coalesces into the next flush. A path already
    /// re-recorded since the drain (a newer event) wins over the stale entry.
    pub fn re_queue(&mut self, changes: ChangeSet) {
        for path in changes.added {
            self.entries.entry(path).or_insert(PendingKind::Added);
        }
        for path in changes.modified {
            self.entries.entry(path).or_insert(PendingKind::Modified);
        }
        for path in changes.deleted {
            self.entries.entry(path).or_insert(PendingKind::Deleted);
        }
    }
}

pub fn classify_change(path: &Path, had_prior_pending_event: bool) -> PendingKind {
    if !path.exists() {
        PendingKind::Deleted
    } else if !had_prior_pending_event {
        PendingKind::Added
    } else {
        PendingKind::Modified
    }
}
