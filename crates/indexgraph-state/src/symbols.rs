use indexgraph_core::error::StateError;
use indexgraph_core::types::{Symbol, SymbolKind};
use rusqlite::{Connection, params, params_from_iter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Insert symbols for a single file inside its own savepoint, replacing any
/// symbols previously recorded for that file.
pub fn replace_symbols_for_file(
    conn: &Connection,
    file_id: &str,
    symbols: &[Symbol],
) -> Result<(), StateError> {
    let savepoint = format!(
        "indexgraph_symbols_{}",
        SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
        .map_err(StateError::sqlite)?;

    let result = (|| {
        conn.execute(
            "DELETE FROM symbols WHERE file_id = ?1",
            params![file_id],
        )
        .map_err(StateError::sqlite)?;

        let mut stmt = conn
            .prepare(
                "INSERT INTO symbols
                 (id, file_id, name, kind, line_start, line_end, signature, documentation, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(StateError::sqlite)?;
        for symbol in symbols {
            let metadata = serde_json::to_string(&symbol.metadata).unwrap_or_else(|_| "{}".into());
            stmt.execute(params![
                symbol.id,
                symbol.file_id,
                symbol.name,
                symbol.kind.as_str(),
                symbol.line_start,
                symbol.line_end,
                symbol.signature,
                symbol.documentation,
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

/// Fetch symbols for a batch of file ids (pass 2's batched symbol query).
pub fn get_symbols_for_files(
    conn: &Connection,
    file_ids: &[String],
) -> Result<Vec<Symbol>, StateError> {
    if file_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = std::iter::repeat_n("?", file_ids.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT id, file_id, name, kind, line_start, line_end, signature, documentation, metadata
         FROM symbols WHERE file_id IN ({placeholders})
         ORDER BY file_id, line_start"
    );
    let mut stmt = conn.prepare(&sql).map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params_from_iter(file_ids), row_to_symbol)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

/// All symbols across every file, ordered by id. Used by the export side of
/// the sync layer.
pub fn list_all(conn: &Connection) -> Result<Vec<Symbol>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_id, name, kind, line_start, line_end, signature, documentation, metadata
             FROM symbols ORDER BY id",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt.query_map([], row_to_symbol).map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

pub fn get_by_id(conn: &Connection, symbol_id: &str) -> Result<Option<Symbol>, StateError> {
    let result = conn.query_row(
        "SELECT id, file_id, name, kind, line_start, line_end, signature, documentation, metadata
         FROM symbols WHERE id = ?1",
        params![symbol_id],
        row_to_symbol,
    );
    match result {
        Ok(symbol) => Ok(Some(symbol)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StateError::sqlite(e)),
    }
}

pub fn find_by_name_in_file(
    conn: &Connection,
    file_id: &str,
    name: &str,
) -> Result<Vec<Symbol>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_id, name, kind, line_start, line_end, signature, documentation, metadata
             FROM symbols WHERE file_id = ?1 AND name = ?2
             ORDER BY line_start",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![file_id, name], row_to_symbol)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get(3)?;
    let kind = SymbolKind::parse(&kind_str).unwrap_or(SymbolKind::Variable);
    let metadata_json: String = row.get(8)?;
    let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(Symbol {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        kind,
        line_start: row.get(4)?,
        line_end: row.get(5)?,
        signature: row.get(6)?,
        documentation: row.get(7)?,
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

    fn sample_symbol(id: &str, name: &str, line: u32) -> Symbol {
        Symbol {
            id: id.to_string(),
            file_id: "file_1".to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            line_start: line,
            line_end: line + 2,
            signature: Some(format!("fn {name}()")),
            documentation: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn replace_then_fetch_round_trips() {
        let conn = setup_test_db();
        replace_symbols_for_file(&conn, "file_1", &[sample_symbol("s1", "foo", 1)]).unwrap();

        let found = get_by_id(&conn, "s1").unwrap().unwrap();
        assert_eq!(found.name, "foo");
        assert_eq!(found.kind, SymbolKind::Function);
    }

    #[test]
    fn replace_clears_previous_symbols_for_file() {
        let conn = setup_test_db();
        replace_symbols_for_file(&conn, "file_1", &[sample_symbol("s1", "foo", 1)]).unwrap();
        replace_symbols_for_file(&conn, "file_1", &[sample_symbol("s2", "bar", 5)]).unwrap();

        assert!(get_by_id(&conn, "s1").unwrap().is_none());
        assert!(get_by_id(&conn, "s2").unwrap().is_some());
    }

    #[test]
    fn batched_fetch_returns_symbols_for_requested_files_only() {
        let conn = setup_test_db();
        replace_symbols_for_file(
            &conn,
            "file_1",
            &[sample_symbol("s1", "foo", 1), sample_symbol("s2", "bar", 10)],
        )
        .unwrap();

        let symbols = get_symbols_for_files(&conn, &["file_1".to_string()]).unwrap();
        assert_eq!(symbols.len(), 2);

        let none = get_symbols_for_files(&conn, &["missing".to_string()]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn find_by_name_in_file_filters_correctly() {
        let conn = setup_test_db();
        replace_symbols_for_file(
            &conn,
            "file_1",
            &[sample_symbol("s1", "foo", 1), sample_symbol("s2", "foo", 20)],
        )
        .unwrap();

        let found = find_by_name_in_file(&conn, "file_1", "foo").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line_start, 1);
    }

    #[test]
    fn list_all_returns_every_symbol() {
        let conn = setup_test_db();
        replace_symbols_for_file(
            &conn,
            "file_1",
            &[sample_symbol("s1", "foo", 1), sample_symbol("s2", "bar", 10)],
        )
        .unwrap();

        let all = list_all(&conn).unwrap();
        assert_eq!(all.len(), 2);
    }
}
