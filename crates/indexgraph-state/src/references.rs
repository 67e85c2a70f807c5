use indexgraph_core::error::StateError;
use indexgraph_core::types::{Reference, ReferenceType};
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replace the references extracted from a single source file.
pub fn replace_references_for_file(
    conn: &Connection,
    source_file_id: &str,
    references: &[Reference],
) -> Result<(), StateError> {
    let savepoint = format!(
        "indexgraph_references_{}",
        SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
        .map_err(StateError::sqlite)?;

    let result = (|| {
        conn.execute(
            "DELETE FROM \"references\" WHERE source_file_id = ?1",
            params![source_file_id],
        )
        .map_err(StateError::sqlite)?;

        let mut stmt = conn
            .prepare(
                "INSERT INTO \"references\"
                 (id, source_file_id, target_symbol_key, target_file_id, line_number, column_number, reference_type, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(StateError::sqlite)?;
        for reference in references {
            let metadata =
                serde_json::to_string(&reference.metadata).unwrap_or_else(|_| "{}".into());
            stmt.execute(params![
                reference.id,
                reference.source_file_id,
                reference.target_symbol_key,
                reference.target_file_id,
                reference.line_number,
                reference.column_number,
                reference.reference_type.as_str(),
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

pub fn get_for_file(
    conn: &Connection,
    source_file_id: &str,
) -> Result<Vec<Reference>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_file_id, target_symbol_key, target_file_id, line_number, column_number, reference_type, metadata
             FROM \"references\" WHERE source_file_id = ?1
             ORDER BY line_number, column_number",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![source_file_id], row_to_reference)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

pub fn get_by_target_symbol(
    conn: &Connection,
    target_symbol_key: &str,
) -> Result<Vec<Reference>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_file_id, target_symbol_key, target_file_id, line_number, column_number, reference_type, metadata
             FROM \"references\" WHERE target_symbol_key = ?1
             ORDER BY source_file_id, line_number",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![target_symbol_key], row_to_reference)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

/// All references across every file, ordered by id. Used by the export side
/// of the sync layer.
pub fn list_all(conn: &Connection) -> Result<Vec<Reference>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_file_id, target_symbol_key, target_file_id, line_number, column_number, reference_type, metadata
             FROM \"references\" ORDER BY id",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt.query_map([], row_to_reference).map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    let reference_type_str: String = row.get(6)?;
    let reference_type = ReferenceType::parse(&reference_type_str).unwrap_or(ReferenceType::Call);
    let metadata_json: String = row.get(7)?;
    let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(Reference {
        id: row.get(0)?,
        source_file_id: row.get(1)?,
        target_symbol_key: row.get(2)?,
        target_file_id: row.get(3)?,
        line_number: row.get(4)?,
        column_number: row.get(5)?,
        reference_type,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, files, repositories, schema};
    use indexgraph_core::types::{IndexedFile, Repository, RepositoryOwner};
    use tempfile::tempdir;

    fn setup_test_db() -> Connection {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("test.db")).unwrap();
        schema::create_tables(&conn).unwrap();
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
                id: "file_1".to_string(),
                repository_id: "repo_1".to_string(),
                path: "src/lib.rs".to_string(),
                content: "".to_string(),
                language: "rust".to_string(),
                size_bytes: 0,
                content_hash: "h".to_string(),
                indexed_at: "2026-01-01T00:00:00Z".to_string(),
                metadata: HashMap::new(),
            }],
        )
        .unwrap();
        conn
    }

    fn sample_reference(id: &str, line: u32, target: Option<&str>) -> Reference {
        Reference {
            id: id.to_string(),
            source_file_id: "file_1".to_string(),
            target_symbol_key: target.map(str::to_string),
            target_file_id: None,
            line_number: line,
            column_number: 0,
            reference_type: ReferenceType::Call,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn replace_then_fetch_round_trips() {
        let conn = setup_test_db();
        replace_references_for_file(
            &conn,
            "file_1",
            &[sample_reference("r1", 5, Some("foo::bar::3"))],
        )
        .unwrap();

        let refs = get_for_file(&conn, "file_1").unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_symbol_key.as_deref(), Some("foo::bar::3"));
    }

    #[test]
    fn replace_clears_previous_references() {
        let conn = setup_test_db();
        replace_references_for_file(&conn, "file_1", &[sample_reference("r1", 5, None)]).unwrap();
        replace_references_for_file(&conn, "file_1", &[sample_reference("r2", 9, None)]).unwrap();

        let refs = get_for_file(&conn, "file_1").unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "r2");
    }

    #[test]
    fn lookup_by_target_symbol_finds_referrers() {
        let conn = setup_test_db();
        replace_references_for_file(
            &conn,
            "file_1",
            &[
                sample_reference("r1", 5, Some("foo::bar::3")),
                sample_reference("r2", 9, Some("foo::baz::7")),
            ],
        )
        .unwrap();

        let found = get_by_target_symbol(&conn, "foo::bar::3").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r1");
    }

    #[test]
    fn list_all_returns_every_reference() {
        let conn = setup_test_db();
        replace_references_for_file(
            &conn,
            "file_1",
            &[sample_reference("r1", 5, None), sample_reference("r2", 9, None)],
        )
        .unwrap();

        assert_eq!(list_all(&conn).unwrap().len(), 2);
    }
}
