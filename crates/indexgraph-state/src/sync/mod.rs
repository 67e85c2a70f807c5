//! Export/import/merge for moving index state between working copies:
//! JSONL export per table, an append-only deletion manifest, and a
//! three-way merge driver for reconciling two exports against a shared
//! base.

pub mod export;
pub mod manifest;
pub mod merge;

use indexgraph_core::error::StateError;
use indexgraph_core::types::{DependencyEdge, IndexJob, IndexedFile, Reference, Repository, Symbol};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use export::ExportedEdge;
use manifest::DeletionEntry;

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportStats {
    pub deletions_applied: u64,
    pub deletions_skipped_unknown_table: u64,
    pub records_loaded: u64,
}

/// Apply the deletion manifest, then load every table file present in
/// `export_dir`, then truncate the manifest. Mirrors spec's three-step
/// import contract.
pub fn import_directory(
    conn: &Connection,
    export_dir: &Path,
    manifest_path: &Path,
) -> Result<ImportStats, StateError> {
    let mut stats = ImportStats::default();

    let deletions = manifest::read_all(manifest_path)?;
    apply_deletion_manifest(conn, &deletions, &mut stats)?;

    stats.records_loaded += import_table_file(conn, export_dir, export::REPOSITORIES_FILE, import_repositories)?;
    stats.records_loaded += import_table_file(conn, export_dir, export::FILES_FILE, import_files)?;
    stats.records_loaded += import_table_file(conn, export_dir, export::SYMBOLS_FILE, import_symbols)?;
    stats.records_loaded += import_table_file(conn, export_dir, export::REFERENCES_FILE, import_references)?;
    stats.records_loaded += import_table_file(conn, export_dir, export::EDGES_FILE, import_edges)?;
    stats.records_loaded += import_table_file(conn, export_dir, export::JOBS_FILE, import_jobs)?;

    manifest::truncate(manifest_path)?;
    Ok(stats)
}

fn import_table_file(
    conn: &Connection,
    export_dir: &Path,
    file_name: &str,
    loader: impl Fn(&Connection, &str) -> Result<u64, StateError>,
) -> Result<u64, StateError> {
    let path = export_dir.join(file_name);
    if !path.exists() {
        return Ok(0);
    }
    let contents = std::fs::read_to_string(&path).map_err(StateError::Io)?;
    loader(conn, &contents)
}

/// Delete rows named by the manifest, grouped by table, inside one
/// savepoint. An entry naming an unrecognized table is skipped with a
/// warning rather than failing the whole import.
fn apply_deletion_manifest(
    conn: &Connection,
    entries: &[DeletionEntry],
    stats: &mut ImportStats,
) -> Result<(), StateError> {
    if entries.is_empty() {
        return Ok(());
    }

    let savepoint = format!(
        "indexgraph_sync_delete_{}",
        SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
        .map_err(StateError::sqlite)?;

    let result = (|| {
        for entry in entries {
            let sql = match entry.table.as_str() {
                "repositories" => "DELETE FROM repositories WHERE id = ?1",
                "indexed_files" => "DELETE FROM indexed_files WHERE id = ?1",
                "symbols" => "DELETE FROM symbols WHERE id = ?1",
                "references" => "DELETE FROM \"references\" WHERE id = ?1",
                "dependency_edges" => "DELETE FROM dependency_edges WHERE id = ?1",
                "index_jobs" => "DELETE FROM index_jobs WHERE id = ?1",
                other => {
                    warn!(table = other, "deletion manifest names an unknown table, skipping");
                    stats.deletions_skipped_unknown_table += 1;
                    continue;
                }
            };
            conn.execute(sql, params![entry.id]).map_err(StateError::sqlite)?;
            stats.deletions_applied += 1;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch(&format!("RELEASE {savepoint}"))
                .map_err(StateError::sqlite)?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch(&format!("ROLLBACK TO {savepoint}; RELEASE {savepoint}"));
            Err(err)
        }
    }
}

fn import_repositories(conn: &Connection, contents: &str) -> Result<u64, StateError> {
    let mut count = 0;
    for line in non_empty_lines(contents) {
        let repo: Repository =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        crate::repositories::upsert_repository(conn, &repo)?;
        count += 1;
    }
    Ok(count)
}

fn import_files(conn: &Connection, contents: &str) -> Result<u64, StateError> {
    let mut files = Vec::new();
    for line in non_empty_lines(contents) {
        let file: IndexedFile =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        files.push(file);
    }
    let count = files.len() as u64;
    if !files.is_empty() {
        crate::files::insert_files_chunk(conn, &files)?;
    }
    Ok(count)
}

fn import_symbols(conn: &Connection, contents: &str) -> Result<u64, StateError> {
    let mut count = 0;
    for line in non_empty_lines(contents) {
        let symbol: Symbol =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        let metadata = serde_json::to_string(&symbol.metadata).unwrap_or_else(|_| "{}".into());
        conn.execute(
            "INSERT INTO symbols (id, file_id, name, kind, line_start, line_end, signature, documentation, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               file_id = excluded.file_id, name = excluded.name, kind = excluded.kind,
               line_start = excluded.line_start, line_end = excluded.line_end,
               signature = excluded.signature, documentation = excluded.documentation,
               metadata = excluded.metadata",
            params![
                symbol.id,
                symbol.file_id,
                symbol.name,
                symbol.kind.as_str(),
                symbol.line_start,
                symbol.line_end,
                symbol.signature,
                symbol.documentation,
                metadata,
            ],
        )
        .map_err(StateError::sqlite)?;
        count += 1;
    }
    Ok(count)
}

fn import_references(conn: &Connection, contents: &str) -> Result<u64, StateError> {
    let mut count = 0;
    for line in non_empty_lines(contents) {
        let reference: Reference =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        let metadata = serde_json::to_string(&reference.metadata).unwrap_or_else(|_| "{}".into());
        conn.execute(
            "INSERT INTO \"references\"
             (id, source_file_id, target_symbol_key, target_file_id, line_number, column_number, reference_type, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               source_file_id = excluded.source_file_id, target_symbol_key = excluded.target_symbol_key,
               target_file_id = excluded.target_file_id, line_number = excluded.line_number,
               column_number = excluded.column_number, reference_type = excluded.reference_type,
               metadata = excluded.metadata",
            params![
                reference.id,
                reference.source_file_id,
                reference.target_symbol_key,
                reference.target_file_id,
                reference.line_number,
                reference.column_number,
                reference.reference_type.as_str(),
                metadata,
            ],
        )
        .map_err(StateError::sqlite)?;
        count += 1;
    }
    Ok(count)
}

fn import_edges(conn: &Connection, contents: &str) -> Result<u64, StateError> {
    let mut count = 0;
    for line in non_empty_lines(contents) {
        let exported: ExportedEdge =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        let edge: DependencyEdge = exported.edge;
        let metadata = serde_json::to_string(&edge.metadata).unwrap_or_else(|_| "{}".into());
        conn.execute(
            "INSERT INTO dependency_edges
             (id, from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               from_file_id = excluded.from_file_id, to_file_id = excluded.to_file_id,
               from_symbol_id = excluded.from_symbol_id, to_symbol_id = excluded.to_symbol_id,
               dependency_type = excluded.dependency_type, confidence = excluded.confidence,
               metadata = excluded.metadata",
            params![
                exported.id,
                edge.from_file_id,
                edge.to_file_id,
                edge.from_symbol_id,
                edge.to_symbol_id,
                edge.dependency_type.as_str(),
                edge.confidence.as_str(),
                metadata,
            ],
        )
        .map_err(StateError::sqlite)?;
        count += 1;
    }
    Ok(count)
}

fn import_jobs(conn: &Connection, contents: &str) -> Result<u64, StateError> {
    let mut count = 0;
    for line in non_empty_lines(contents) {
        let job: IndexJob =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        conn.execute(
            "INSERT INTO index_jobs
             (id, repository_id, \"ref\", commit_sha, status, started_at, completed_at, error_message, retry_count,
              files_indexed, symbols_extracted, references_found, dependencies_extracted, chunks_completed, current_chunk,
              created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
               repository_id = excluded.repository_id, \"ref\" = excluded.\"ref\", commit_sha = excluded.commit_sha,
               status = excluded.status, started_at = excluded.started_at, completed_at = excluded.completed_at,
               error_message = excluded.error_message, retry_count = excluded.retry_count,
               files_indexed = excluded.files_indexed, symbols_extracted = excluded.symbols_extracted,
               references_found = excluded.references_found, dependencies_extracted = excluded.dependencies_extracted,
               chunks_completed = excluded.chunks_completed, current_chunk = excluded.current_chunk",
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
            ],
        )
        .map_err(StateError::sqlite)?;
        count += 1;
    }
    Ok(count)
}

fn non_empty_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents.lines().filter(|line| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, files, jobs, repositories, schema};
    use indexgraph_core::types::{JobStats, JobStatus, Repository, RepositoryOwner};
    use tempfile::tempdir;

    fn setup_test_db() -> Connection {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("test.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn import_directory_with_no_files_is_a_noop() {
        let conn = setup_test_db();
        let export_dir = tempdir().unwrap();
        let manifest_path = tempdir().unwrap().path().join(".deletions.jsonl");

        let stats = import_directory(&conn, export_dir.path(), &manifest_path).unwrap();
        assert_eq!(stats.records_loaded, 0);
    }

    #[test]
    fn import_directory_loads_repositories_file() {
        let conn = setup_test_db();
        let export_dir = tempdir().unwrap();
        let repo = Repository {
            id: "repo_1".to_string(),
            full_name: "acme/widgets".to_string(),
            default_ref: "main".to_string(),
            installation_id: None,
            owner: RepositoryOwner::User {
                user_id: "u1".to_string(),
            },
        };
        std::fs::write(
            export_dir.path().join(export::REPOSITORIES_FILE),
            format!("{}\n", serde_json::to_string(&repo).unwrap()),
        )
        .unwrap();

        let manifest_path = tempdir().unwrap().path().join(".deletions.jsonl");
        let stats = import_directory(&conn, export_dir.path(), &manifest_path).unwrap();
        assert_eq!(stats.records_loaded, 1);
        assert!(repositories::get_by_id(&conn, "repo_1").unwrap().is_some());
    }

    #[test]
    fn deletion_manifest_is_applied_then_truncated() {
        let conn = setup_test_db();
        repositories::upsert_repository(
            &conn,
            &Repository {
                id: "repo_1".to_string(),
                full_name: "acme/widgets".to_string(),
                default_ref: "main".to_string(),
                installation_id: None,
                owner: RepositoryOwner::User {
                    user_id: "u1".to_string(),
                },
            },
        )
        .unwrap();
        files::insert_files_chunk(
            &conn,
            &[IndexedFile {
                id: "f1".to_string(),
                repository_id: "repo_1".to_string(),
                path: "a.rs".to_string(),
                content: "".to_string(),
                language: "rust".to_string(),
                size_bytes: 0,
                content_hash: "h".to_string(),
                indexed_at: "2026-01-01T00:00:00Z".to_string(),
                metadata: Default::default(),
            }],
        )
        .unwrap();

        let manifest_dir = tempdir().unwrap();
        let manifest_path = manifest_dir.path().join(".deletions.jsonl");
        manifest::append(
            &manifest_path,
            &DeletionEntry {
                table: "indexed_files".to_string(),
                id: "f1".to_string(),
                deleted_at: "2026-01-02T00:00:00Z".to_string(),
            },
        )
        .unwrap();

        let export_dir = tempdir().unwrap();
        let stats = import_directory(&conn, export_dir.path(), &manifest_path).unwrap();
        assert_eq!(stats.deletions_applied, 1);
        assert!(files::get_by_path(&conn, "repo_1", "a.rs").unwrap().is_none());
        assert!(manifest::read_all(&manifest_path).unwrap().is_empty());
    }

    #[test]
    fn unknown_table_in_manifest_is_skipped_not_fatal() {
        let conn = setup_test_db();
        let manifest_dir = tempdir().unwrap();
        let manifest_path = manifest_dir.path().join(".deletions.jsonl");
        manifest::append(
            &manifest_path,
            &DeletionEntry {
                table: "not_a_real_table".to_string(),
                id: "x".to_string(),
                deleted_at: "2026-01-02T00:00:00Z".to_string(),
            },
        )
        .unwrap();

        let export_dir = tempdir().unwrap();
        let stats = import_directory(&conn, export_dir.path(), &manifest_path).unwrap();
        assert_eq!(stats.deletions_skipped_unknown_table, 1);
        assert_eq!(stats.deletions_applied, 0);
    }

    #[test]
    fn import_is_idempotent_on_job_ids() {
        let conn = setup_test_db();
        repositories::upsert_repository(
            &conn,
            &Repository {
                id: "repo_1".to_string(),
                full_name: "acme/widgets".to_string(),
                default_ref: "main".to_string(),
                installation_id: None,
                owner: RepositoryOwner::User {
                    user_id: "u1".to_string(),
                },
            },
        )
        .unwrap();

        let job = IndexJob {
            id: "j1".to_string(),
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
        let export_dir = tempdir().unwrap();
        std::fs::write(
            export_dir.path().join(export::JOBS_FILE),
            format!("{}\n", serde_json::to_string(&job).unwrap()),
        )
        .unwrap();

        let manifest_path = tempdir().unwrap().path().join(".deletions.jsonl");
        import_directory(&conn, export_dir.path(), &manifest_path).unwrap();
        import_directory(&conn, export_dir.path(), &manifest_path).unwrap();

        assert!(jobs::get_job_internal(&conn, "j1").unwrap().is_some());
    }
}
