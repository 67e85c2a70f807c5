//! C10 worker pool: a fixed team of cooperative loops draining `pending`
//! jobs, each running the full C1-C8 pipeline inside chunk-scoped
//! transactions rather than one job-wide transaction.

use indexgraph_core::constants::DEFAULT_WORKER_COUNT;
use indexgraph_core::types::{IndexJob, JobStats, JobStatus};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Resolves a repository id to the working-tree root a submitter registered
/// for it; the job tracker carries no filesystem path of its own, per the
/// job-submission contract's "working-tree roots are absolute paths given by
/// the job submitter".
pub trait RepositoryRootResolver: Send + Sync {
    fn root_for(&self, repository_id: &str) -> Option<PathBuf>;
}

impl<F> RepositoryRootResolver for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn root_for(&self, repository_id: &str) -> Option<PathBuf> {
        self(repository_id)
    }
}

pub struct WorkerPool {
    size: usize,
    extensions: Vec<String>,
}

impl WorkerPool {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { size: DEFAULT_WORKER_COUNT, extensions }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Run every worker's drain loop until `stop` is set, opening a
    /// dedicated connection per worker (rusqlite `Connection` isn't `Sync`).
    pub fn run(
        &self,
        open_conn: impl Fn() -> Result<Connection, indexgraph_core::error::StateError> + Send + Sync + 'static,
        resolver: Arc<dyn RepositoryRootResolver>,
        stop: Arc<AtomicBool>,
    ) -> Vec<std::thread::JoinHandle<()>> {
        let open_conn = Arc::new(open_conn);
        (0..self.size)
            .map(|worker_id| {
                let open_conn = Arc::clone(&open_conn);
                let resolver = Arc::clone(&resolver);
                let stop = Arc::clone(&stop);
                let extensions = self.extensions.clone();
                std::thread::spawn(move || {
                    let conn = match open_conn() {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!(worker_id, error = %err, "worker failed to open connection");
                            return;
                        }
                    };
                    drain_loop(worker_id, &conn, resolver.as_ref(), &extensions, &stop);
                })
            })
            .collect()
    }
}

fn drain_loop(
    worker_id: usize,
    conn: &Connection,
    resolver: &dyn RepositoryRootResolver,
    extensions: &[String],
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        match indexgraph_state::jobs::claim_next_pending(conn) {
            Ok(Some(job)) => run_job(worker_id, conn, &job, resolver, extensions),
            Ok(None) => std::thread::sleep(Duration::from_millis(200)),
            Err(err) => {
                warn!(worker_id, error = %err, "failed to claim next pending job");
                std::thread::sleep(Duration::from_millis(500));
            }
        }
    }
}

fn run_job(
    worker_id: usize,
    conn: &Connection,
    job: &IndexJob,
    resolver: &dyn RepositoryRootResolver,
    extensions: &[String],
) {
    let now = indexgraph_core::time::now_iso8601();
    if indexgraph_state::jobs::transition_job_status(conn, &job.id, JobStatus::Processing, &now).is_err() {
        warn!(worker_id, job_id = %job.id, "failed to claim job for processing");
        return;
    }

    let Some(root) = resolver.root_for(&job.repository_id) else {
        let _ = indexgraph_state::jobs::record_failure(conn, &job.id, "repository root not registered", &indexgraph_core::time::now_iso8601());
        return;
    };

    match crate::pipeline::run_full_index(conn, &job.repository_id, &root, extensions) {
        Ok(stats) => {
            let _ = indexgraph_state::jobs::update_stats(
                conn,
                &job.id,
                &JobStats {
                    files_indexed: stats.files_indexed,
                    symbols_extracted: stats.symbols_extracted,
                    references_found: stats.references_found,
                    dependencies_extracted: stats.dependencies_extracted,
                    chunks_completed: 0,
                    current_chunk: 0,
                },
            );
            let completed_at = indexgraph_core::time::now_iso8601();
            if indexgraph_state::jobs::transition_job_status(conn, &job.id, JobStatus::Completed, &completed_at).is_err() {
                warn!(worker_id, job_id = %job.id, "job finished but status transition to completed failed");
            }
            info!(worker_id, job_id = %job.id, files = stats.files_indexed, "job completed");
        }
        Err(err) => {
            let _ = indexgraph_state::jobs::record_failure(conn, &job.id, &err.to_string(), &indexgraph_core::time::now_iso8601());
            warn!(worker_id, job_id = %job.id, error = %err, "job failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexgraph_core::types::{Repository, RepositoryOwner};
    use indexgraph_state::{db, repositories, schema};
    use tempfile::tempdir;

    #[test]
    fn single_job_transitions_through_to_completed() {
        let db_dir = tempdir().unwrap();
        let conn = db::open_connection(&db_dir.path().join("test.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        repositories::upsert_repository(
            &conn,
            &Repository {
                id: "repo_1".to_string(),
                full_name: "acme/widgets".to_string(),
                default_ref: "main".to_string(),
                installation_id: None,
                owner: RepositoryOwner::User { user_id: "u1".to_string() },
            },
        )
        .unwrap();

        let source_dir = tempdir().unwrap();
        std::fs::write(source_dir.path().join("a.rs"), "fn main() {}\n").unwrap();

        let job = IndexJob {
            id: "job_1".to_string(),
            repository_id: "repo_1".to_string(),
            r#ref: "main".to_string(),
            commit_sha: None,
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            stats: JobStats::default(),
        };
        indexgraph_state::jobs::create_job(&conn, &job, "2026-01-01T00:00:00Z").unwrap();

        let root = source_dir.path().to_path_buf();
        let resolver = move |_: &str| Some(root.clone());
        run_job(0, &conn, &job, &resolver, &["rs".to_string()]);

        let stored = indexgraph_state::jobs::get_job_internal(&conn, "job_1").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.stats.files_indexed >= 1);
    }
}
