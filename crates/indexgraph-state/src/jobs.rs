use indexgraph_core::error::{AccessError, StateError};
use indexgraph_core::types::{IndexJob, JobStats, JobStatus};
use rusqlite::{Connection, params};

/// Create a new index job in `Pending` status.
pub fn create_job(conn: &Connection, job: &IndexJob, created_at: &str) -> Result<(), StateError> {
    conn.execute(
        "INSERT INTO index_jobs
         (id, repository_id, \"ref\", commit_sha, status, started_at, completed_at, error_message, retry_count,
          files_indexed, symbols_extracted, references_found, dependencies_extracted, chunks_completed, current_chunk,
          created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            job.id,
            job.repository_id,
            job.r#ref,
            job.commit_sha,
            job.status.as_str(),
            job.started_at,
            job.completed_at,
            job.error_message,
            job.retry_count,
            job.stats.files_indexed,
            job.stats.symbols_extracted,
            job.stats.references_found,
            job.stats.dependencies_extracted,
            job.stats.chunks_completed,
            job.stats.current_chunk,
            created_at,
        ],
    )
    .map_err(StateError::sqlite)?;
    Ok(())
}

/// Transition a job's status, enforcing spec's allowed-transition table.
/// Rejects the update (without mutating anything) if the transition isn't
/// one `JobStatus::allows_transition_to` permits.
pub fn transition_job_status(
    conn: &Connection,
    job_id: &str,
    to: JobStatus,
    timestamp: &str,
) -> Result<(), StateError> {
    let current = get_job_internal(conn, job_id)?.ok_or_else(|| {
        StateError::InvalidTransition {
            from: "missing".to_string(),
            to: to.as_str().to_string(),
        }
    })?;

    if !current.status.allows_transition_to(to) {
        return Err(StateError::InvalidTransition {
            from: current.status.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    let started_at = if to == JobStatus::Processing {
        Some(timestamp.to_string())
    } else {
        current.started_at.clone()
    };
    let completed_at = if to.is_terminal() {
        Some(timestamp.to_string())
    } else {
        None
    };

    conn.execute(
        "UPDATE index_jobs SET status = ?1, started_at = COALESCE(?2, started_at), completed_at = ?3
         WHERE id = ?4",
        params![to.as_str(), started_at, completed_at, job_id],
    )
    .map_err(StateError::sqlite)?;
    Ok(())
}

/// Update progress counters for a running job.
pub fn update_stats(conn: &Connection, job_id: &str, stats: &JobStats) -> Result<(), StateError> {
    conn.execute(
        "UPDATE index_jobs SET files_indexed = ?1, symbols_extracted = ?2, references_found = ?3,
         dependencies_extracted = ?4, chunks_completed = ?5, current_chunk = ?6 WHERE id = ?7",
        params![
            stats.files_indexed,
            stats.symbols_extracted,
            stats.references_found,
            stats.dependencies_extracted,
            stats.chunks_completed,
            stats.current_chunk,
            job_id,
        ],
    )
    .map_err(StateError::sqlite)?;
    Ok(())
}

pub fn record_failure(
    conn: &Connection,
    job_id: &str,
    error_message: &str,
    timestamp: &str,
) -> Result<(), StateError> {
    transition_job_status(conn, job_id, JobStatus::Failed, timestamp)?;
    conn.execute(
        "UPDATE index_jobs SET error_message = ?1 WHERE id = ?2",
        params![error_message, job_id],
    )
    .map_err(StateError::sqlite)?;
    Ok(())
}

pub fn increment_retry_count(conn: &Connection, job_id: &str) -> Result<u32, StateError> {
    conn.execute(
        "UPDATE index_jobs SET retry_count = retry_count + 1 WHERE id = ?1",
        params![job_id],
    )
    .map_err(StateError::sqlite)?;
    let count: u32 = conn
        .query_row(
            "SELECT retry_count FROM index_jobs WHERE id = ?1",
            params![job_id],
            |row| row.get(0),
        )
        .map_err(StateError::sqlite)?;
    Ok(count)
}

/// Access-controlled job lookup. Returns the same `NotFound` error whether
/// the job doesn't exist or belongs to a different repository than the
/// caller is authorized for — callers must never be able to distinguish
/// "absent" from "forbidden".
pub fn get(
    conn: &Connection,
    job_id: &str,
    authorized_repository_id: &str,
) -> Result<IndexJob, AccessError> {
    let job = get_job_internal(conn, job_id)
        .map_err(|e| AccessError::Internal(e.to_string()))?
        .filter(|job| job.repository_id == authorized_repository_id)
        .ok_or_else(|| AccessError::not_found("index_job", job_id))?;
    Ok(job)
}

/// Unscoped lookup for internal callers (pipeline, worker pool) that already
/// operate within the correct repository scope.
pub fn get_job_internal(conn: &Connection, job_id: &str) -> Result<Option<IndexJob>, StateError> {
    let result = conn.query_row(
        "SELECT id, repository_id, \"ref\", commit_sha, status, started_at, completed_at, error_message,
                retry_count, files_indexed, symbols_extracted, references_found, dependencies_extracted,
                chunks_completed, current_chunk
         FROM index_jobs WHERE id = ?1",
        params![job_id],
        row_to_job,
    );
    match result {
        Ok(job) => Ok(Some(job)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

pub fn get_active_job_for_ref(
    conn: &Connection,
    repository_id: &str,
    ref_name: &str,
) -> Result<Option<IndexJob>, StateError> {
    let result = conn.query_row(
        "SELECT id, repository_id, \"ref\", commit_sha, status, started_at, completed_at, error_message,
                retry_count, files_indexed, symbols_extracted, references_found, dependencies_extracted,
                chunks_completed, current_chunk
         FROM index_jobs
         WHERE repository_id = ?1 AND \"ref\" = ?2 AND status IN ('pending', 'processing')
         ORDER BY created_at DESC LIMIT 1",
        params![repository_id, ref_name],
        row_to_job,
    );
    match result {
        Ok(job) => Ok(Some(job)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

/// Pop the oldest pending job, for the worker pool to claim.
pub fn claim_next_pending(conn: &Connection) -> Result<Option<IndexJob>, StateError> {
    let result = conn.query_row(
        "SELECT id, repository_id, \"ref\", commit_sha, status, started_at, completed_at, error_message,
                retry_count, files_indexed, symbols_extracted, references_found, dependencies_extracted,
                chunks_completed, current_chunk
         FROM index_jobs WHERE status = 'pending'
         ORDER BY created_at ASC LIMIT 1",
        [],
        row_to_job,
    );
    match result {
        Ok(job) => Ok(Some(job)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

/// All jobs across every repository, ordered by id. Used by the export side
/// of the sync layer.
pub fn list_all(conn: &Connection) -> Result<Vec<IndexJob>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, repository_id, \"ref\", commit_sha, status, started_at, completed_at, error_message,
                    retry_count, files_indexed, symbols_extracted, references_found, dependencies_extracted,
                    chunks_completed, current_chunk
             FROM index_jobs ORDER BY id",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt.query_map([], row_to_job).map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<IndexJob> {
    let status_str: String = row.get(4)?;
    let status = JobStatus::parse(&status_str).unwrap_or(JobStatus::Pending);
    Ok(IndexJob {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        r#ref: row.get(2)?,
        commit_sha: row.get(3)?,
        status,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        error_message: row.get(7)?,
        retry_count: row.get(8)?,
        stats: JobStats {
            files_indexed: row.get(9)?,
            symbols_extracted: row.get(10)?,
            references_found: row.get(11)?,
            dependencies_extracted: row.get(12)?,
            chunks_completed: row.get(13)?,
            current_chunk: row.get(14)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, repositories, schema};
    use indexgraph_core::types::{Repository, RepositoryOwner};
    use tempfile::tempdir;

    fn setup_test_db() -> Connection {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("test.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        for id in ["repo_1", "repo_2"] {
            repositories::upsert_repository(
                &conn,
                &Repository {
                    id: id.to_string(),
                    full_name: format!("acme/{id}"),
                    default_ref: "main".to_string(),
                    installation_id: None,
                    owner: RepositoryOwner::User {
                        user_id: "u1".to_string(),
                    },
                },
            )
            .unwrap();
        }
        conn
    }

    fn sample_job(id: &str, repository_id: &str) -> IndexJob {
        IndexJob {
            id: id.to_string(),
            repository_id: repository_id.to_string(),
            r#ref: "main".to_string(),
            commit_sha: Some("abc123".to_string()),
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            stats: JobStats::default(),
        }
    }

    #[test]
    fn create_and_internal_get_round_trips() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();

        let job = get_job_internal(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn transition_allows_pending_to_processing() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();

        transition_job_status(&conn, "j1", JobStatus::Processing, "2026-01-01T00:01:00Z").unwrap();
        let job = get_job_internal(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.started_at.as_deref(), Some("2026-01-01T00:01:00Z"));
    }

    #[test]
    fn transition_rejects_pending_to_completed_directly() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();

        let err = transition_job_status(&conn, "j1", JobStatus::Completed, "2026-01-01T00:01:00Z")
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));

        let job = get_job_internal(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn transition_sets_completed_at_on_terminal_status() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();
        transition_job_status(&conn, "j1", JobStatus::Processing, "2026-01-01T00:01:00Z").unwrap();
        transition_job_status(&conn, "j1", JobStatus::Completed, "2026-01-01T00:05:00Z").unwrap();

        let job = get_job_internal(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.completed_at.as_deref(), Some("2026-01-01T00:05:00Z"));
    }

    #[test]
    fn failed_can_transition_back_to_processing_for_retry() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();
        transition_job_status(&conn, "j1", JobStatus::Processing, "t1").unwrap();
        record_failure(&conn, "j1", "boom", "t2").unwrap();
        transition_job_status(&conn, "j1", JobStatus::Processing, "t3").unwrap();

        let job = get_job_internal(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn access_get_hides_existence_across_repositories() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();

        let cross_repo = get(&conn, "j1", "repo_2").unwrap_err();
        let absent = get(&conn, "nonexistent", "repo_2").unwrap_err();
        assert_eq!(cross_repo, absent);
        assert!(matches!(cross_repo, AccessError::NotFound { .. }));
    }

    #[test]
    fn access_get_succeeds_for_authorized_repository() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();

        let job = get(&conn, "j1", "repo_1").unwrap();
        assert_eq!(job.id, "j1");
    }

    #[test]
    fn claim_next_pending_returns_oldest_pending_job() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j_old", "repo_1"), "2026-01-01T00:00:00Z").unwrap();
        create_job(&conn, &sample_job("j_new", "repo_1"), "2026-01-02T00:00:00Z").unwrap();

        let claimed = claim_next_pending(&conn).unwrap().unwrap();
        assert_eq!(claimed.id, "j_old");
    }

    #[test]
    fn list_all_returns_every_job() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();
        create_job(&conn, &sample_job("j2", "repo_2"), "2026-01-02T00:00:00Z").unwrap();

        assert_eq!(list_all(&conn).unwrap().len(), 2);
    }

    #[test]
    fn increment_retry_count_accumulates() {
        let conn = setup_test_db();
        create_job(&conn, &sample_job("j1", "repo_1"), "2026-01-01T00:00:00Z").unwrap();

        assert_eq!(increment_retry_count(&conn, "j1").unwrap(), 1);
        assert_eq!(increment_retry_count(&conn, "j1").unwrap(), 2);
    }
}
