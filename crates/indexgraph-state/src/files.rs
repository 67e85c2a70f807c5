use indexgraph_core::error::StateError;
use indexgraph_core::types::IndexedFile;
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Insert or replace a chunk of files atomically (pass 1 of the two-pass
/// write: files land first so pass 2 can query back their generated ids).
pub fn insert_files_chunk(conn: &Connection, files: &[IndexedFile]) -> Result<(), StateError> {
    let savepoint = format!(
        "indexgraph_files_chunk_{}",
        SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
        .map_err(StateError::sqlite)?;

    let result = (|| {
        let mut stmt = conn
            .prepare(
                "INSERT INTO indexed_files
                 (id, repository_id, path, content, language, size_bytes, content_hash, indexed_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(repository_id, path) DO UPDATE SET
                   id = excluded.id,
                   content = excluded.content,
                   language = excluded.language,
                   size_bytes = excluded.size_bytes,
                   content_hash = excluded.content_hash,
                   indexed_at = excluded.indexed_at,
                   metadata = excluded.metadata",
            )
            .map_err(StateError::sqlite)?;

        for file in files {
            let metadata = serde_json::to_string(&file.metadata).unwrap_or_else(|_| "{}".into());
            stmt.execute(params![
                file.id,
                file.repository_id,
                file.path,
                file.content,
                file.language,
                file.size_bytes as i64,
                file.content_hash,
                file.indexed_at,
                metadata,
            ])
            .map_err(StateError::sqlite)?;
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

/// Query back a page of files for a repository, ordered by id for stable
/// pagination across pass-2 batches.
pub fn get_files_page(
    conn: &Connection,
    repository_id: &str,
    after_id: Option<&str>,
    limit: usize,
) -> Result<Vec<IndexedFile>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, repository_id, path, content, language, size_bytes, content_hash, indexed_at, metadata
             FROM indexed_files
             WHERE repository_id = ?1 AND id > COALESCE(?2, '')
             ORDER BY id
             LIMIT ?3",
        )
        .map_err(StateError::sqlite)?;

    let rows = stmt
        .query_map(params![repository_id, after_id, limit as i64], row_to_file)
        .map_err(StateError::sqlite)?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(StateError::sqlite)
}

pub fn get_by_path(
    conn: &Connection,
    repository_id: &str,
    path: &str,
) -> Result<Option<IndexedFile>, StateError> {
    let result = conn.query_row(
        "SELECT id, repository_id, path, content, language, size_bytes, content_hash, indexed_at, metadata
         FROM indexed_files WHERE repository_id = ?1 AND path = ?2",
        params![repository_id, path],
        row_to_file,
    );
    match result {
        Ok(file) => Ok(Some(file)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

pub fn delete_by_path(
    conn: &Connection,
    repository_id: &str,
    path: &str,
) -> Result<(), StateError> {
    conn.execute(
        "DELETE FROM indexed_files WHERE repository_id = ?1 AND path = ?2",
        params![repository_id, path],
    )
    .map_err(StateError::sqlite)?;
    Ok(())
}

/// All files across every repository, ordered by id. Used by the export
/// side of the sync layer.
pub fn list_all(conn: &Connection) -> Result<Vec<IndexedFile>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, repository_id, path, content, language, size_bytes, content_hash, indexed_at, metadata
             FROM indexed_files ORDER BY id",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt.query_map([], row_to_file).map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

pub fn file_count(conn: &Connection, repository_id: &str) -> Result<u64, StateError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM indexed_files WHERE repository_id = ?1",
            params![repository_id],
            |row| row.get(0),
        )
        .map_err(StateError::sqlite)?;
    Ok(count as u64)
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<IndexedFile> {
    let metadata_json: String = row.get(8)?;
    let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(IndexedFile {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        path: row.get(2)?,
        content: row.get(3)?,
        language: row.get(4)?,
        size_bytes: row.get::<_, i64>(5)? as u64,
        content_hash: row.get(6)?,
        indexed_at: row.get(7)?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use indexgraph_core::types::{Repository, RepositoryOwner};
    use tempfile::tempdir;

    fn setup_test_db() -> Connection {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("test.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        crate::repositories::upsert_repository(
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
        conn
    }

    fn sample_file(id: &str, path: &str) -> IndexedFile {
        IndexedFile {
            id: id.to_string(),
            repository_id: "repo_1".to_string(),
            path: path.to_string(),
            content: "fn main() {}".to_string(),
            language: "rust".to_string(),
            size_bytes: 13,
            content_hash: "hash1".to_string(),
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn insert_chunk_then_get_by_path_round_trips() {
        let conn = setup_test_db();
        let file = sample_file("f1", "src/main.rs");
        insert_files_chunk(&conn, &[file.clone()]).unwrap();

        let found = get_by_path(&conn, "repo_1", "src/main.rs").unwrap().unwrap();
        assert_eq!(found.content_hash, "hash1");
    }

    #[test]
    fn upsert_replaces_existing_path_not_duplicates() {
        let conn = setup_test_db();
        insert_files_chunk(&conn, &[sample_file("f1", "src/main.rs")]).unwrap();

        let mut updated = sample_file("f1", "src/main.rs");
        updated.content_hash = "hash2".to_string();
        insert_files_chunk(&conn, &[updated]).unwrap();

        assert_eq!(file_count(&conn, "repo_1").unwrap(), 1);
        let found = get_by_path(&conn, "repo_1", "src/main.rs").unwrap().unwrap();
        assert_eq!(found.content_hash, "hash2");
    }

    #[test]
    fn pagination_walks_all_rows_in_order() {
        let conn = setup_test_db();
        let files: Vec<IndexedFile> = (0..5)
            .map(|i| sample_file(&format!("f{i}"), &format!("src/m{i}.rs")))
            .collect();
        insert_files_chunk(&conn, &files).unwrap();

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = get_files_page(&conn, "repo_1", cursor.as_deref(), 2).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = Some(page.last().unwrap().id.clone());
            seen.extend(page.into_iter().map(|f| f.id));
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn delete_by_path_removes_row() {
        let conn = setup_test_db();
        insert_files_chunk(&conn, &[sample_file("f1", "src/main.rs")]).unwrap();
        delete_by_path(&conn, "repo_1", "src/main.rs").unwrap();
        assert!(get_by_path(&conn, "repo_1", "src/main.rs").unwrap().is_none());
    }

    #[test]
    fn list_all_returns_every_file_ordered_by_id() {
        let conn = setup_test_db();
        insert_files_chunk(
            &conn,
            &[sample_file("f2", "b.rs"), sample_file("f1", "a.rs")],
        )
        .unwrap();

        let all = list_all(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "f1");
        assert_eq!(all[1].id, "f2");
    }
}
