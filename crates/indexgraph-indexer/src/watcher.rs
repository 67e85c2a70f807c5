//! C12 source watcher: a single-threaded cooperative dispatcher per
//! repository. Each filesystem event cancels any pending debounce timer and
//! schedules a new one; when the timer fires, the accumulated path map is
//! drained into a `ChangeSet` and dispatched into C11, which is allowed to
//! block the dispatcher thread while it runs.

use crate::incremental::{classify_change, run_incremental, ChangeSet, IncrementalGate, PendingChanges};
use indexgraph_core::constants::{BUILTIN_IGNORE_DIRS, DEFAULT_WATCHED_EXTENSIONS, DEFAULT_WATCH_DEBOUNCE_MS};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

pub type DispatchFn = Box<dyn Fn(&ChangeSet) + Send>;

/// Drives C11 for one repository in response to filesystem events. Dropping
/// the handle (or calling [`WatchHandle::stop`]) cancels the debounce timer
/// and closes the underlying notify watcher; any in-flight C11 run is left
/// to complete on its own.
pub struct WatchHandle {
    stop: Arc<AtomicBool>,
    _watcher: RecommendedWatcher,
    join: Option<std::thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn is_watched_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| DEFAULT_WATCHED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_in_ignored_dir(path: &Path, repo_root: &Path) -> bool {
    path.strip_prefix(repo_root)
        .unwrap_or(path)
        .components()
        .any(|c| {
            c.as_os_str()
                .to_str()
                .map(|name| BUILTIN_IGNORE_DIRS.contains(&name))
                .unwrap_or(false)
        })
}

/// Start watching `repo_root`, dispatching debounced change sets into C11
/// via a fresh connection opened with `open_conn` on the dispatcher thread.
pub fn watch(
    repository_id: String,
    repo_root: PathBuf,
    open_conn: impl Fn() -> Result<Connection, indexgraph_core::error::StateError> + Send + 'static,
    manifest_path: PathBuf,
    gate: Arc<IncrementalGate>,
) -> notify::Result<WatchHandle> {
    let (tx, rx): (Sender<Event>, Receiver<Event>) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&repo_root, RecursiveMode::Recursive)?;

    let stop = Arc::new(AtomicBool::new(false));
    let dispatch_stop = Arc::clone(&stop);
    let pending = Arc::new(Mutex::new(PendingChanges::default()));
    let watch_root = repo_root.clone();

    let join = std::thread::spawn(move || {
        run_dispatch_loop(
            &repository_id,
            &watch_root,
            &rx,
            &pending,
            &dispatch_stop,
            open_conn,
            &manifest_path,
            &gate,
        );
    });

    Ok(WatchHandle { stop, _watcher: watcher, join: Some(join) })
}

#[allow(clippy::too_many_arguments)]
fn run_dispatch_loop(
    repository_id: &str,
    repo_root: &Path,
    rx: &Receiver<Event>,
    pending: &Arc<Mutex<PendingChanges>>,
    stop: &AtomicBool,
    open_conn: impl Fn() -> Result<Connection, indexgraph_core::error::StateError>,
    manifest_path: &Path,
    gate: &Arc<IncrementalGate>,
) {
    let debounce = Duration::from_millis(DEFAULT_WATCH_DEBOUNCE_MS);
    let mut deadline: Option<std::time::Instant> = None;

    while !stop.load(Ordering::Relaxed) {
        let timeout = deadline
            .map(|d| d.saturating_duration_since(std::time::Instant::now()))
            .unwrap_or(debounce);

        match rx.recv_timeout(timeout) {
            Ok(event) => {
                for path in &event.paths {
                    if is_in_ignored_dir(path, repo_root) || !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                        continue;
                    }
                    if path.is_dir() {
                        continue;
                    }
                    if !is_watched_extension(path) && path.exists() {
                        continue;
                    }
                    let Ok(relative) = path.strip_prefix(repo_root) else { continue };
                    let relative_str = relative.to_string_lossy().replace('\\', "/");

                    let mut guard = pending.lock().unwrap();
                    let had_prior = guard.has_pending(&relative_str);
                    let kind = classify_change(path, had_prior);
                    guard.record(relative_str, kind);
                }
                deadline = Some(std::time::Instant::now() + debounce);
            }
            Err(RecvTimeoutError::Timeout) => {
                let mut guard = pending.lock().unwrap();
                if !guard.is_empty() {
                    let changes = guard.drain();
                    drop(guard);
                    deadline = None;
                    if !dispatch(repository_id, repo_root, &changes, &open_conn, manifest_path, gate) {
                        pending.lock().unwrap().re_queue(changes);
                        deadline = Some(std::time::Instant::now() + debounce);
                    }
                } else {
                    deadline = None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Dispatches `changes` into C11 if the per-repository gate is free. Returns
/// `false` when the gate is already busy, in which case the caller is
/// responsible for re-queuing `changes` so they coalesce into the next flush
/// instead of being silently dropped.
fn dispatch(
    repository_id: &str,
    repo_root: &Path,
    changes: &ChangeSet,
    open_conn: &impl Fn() -> Result<Connection, indexgraph_core::error::StateError>,
    manifest_path: &Path,
    gate: &Arc<IncrementalGate>,
) -> bool {
    let Some(_guard) = gate.try_enter(repository_id) else {
        warn!(repository_id, "incremental pass already running, change set will coalesce into next flush");
        return false;
    };
    let conn = match open_conn() {
        Ok(conn) => conn,
        Err(err) => {
            warn!(repository_id, error = %err, "watcher failed to open connection for dispatch");
            return true;
        }
    };
    let result = run_incremental(&conn, repository_id, repo_root, changes, manifest_path);
    info!(
        repository_id,
        files_updated = result.files_updated,
        files_deleted = result.files_deleted,
        errors = result.errors.len(),
        "incremental pass dispatched from watcher"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_directory_path_is_excluded() {
        let root = Path::new("/repo");
        let path = Path::new("/repo/node_modules/lib/index.js");
        assert!(is_in_ignored_dir(path, root));
    }

    #[test]
    fn watched_extension_allows_rust_source() {
        assert!(is_watched_extension(Path::new("src/main.rs")));
        assert!(!is_watched_extension(Path::new("README.md")));
    }
}
