use indexgraph_core::error::StateError;
use indexgraph_core::types::{DependencyEdge, DependencyType, EdgeConfidence};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Insert or replace dependency edges. Idempotent on
/// `(from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type)`.
pub fn insert_edges(conn: &Connection, edges: &[DependencyEdge]) -> Result<(), StateError> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO dependency_edges
             (from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type)
             DO UPDATE SET confidence = excluded.confidence, metadata = excluded.metadata",
        )
        .map_err(StateError::sqlite)?;

    for edge in edges {
        let metadata = serde_json::to_string(&edge.metadata).unwrap_or_else(|_| "{}".into());
        stmt.execute(params![
            edge.from_file_id,
            edge.to_file_id,
            edge.from_symbol_id,
            edge.to_symbol_id,
            edge.dependency_type.as_str(),
            edge.confidence.as_str(),
            metadata,
        ])
        .map_err(StateError::sqlite)?;
    }
    Ok(())
}

/// Atomically replace all edges originating from a file (file-level edges)
/// or from any symbol in the given list (symbol-level edges).
pub fn replace_edges_for_file(
    conn: &Connection,
    file_id: &str,
    symbol_ids: &[String],
    new_edges: &[DependencyEdge],
) -> Result<(), StateError> {
    let savepoint = format!(
        "indexgraph_edges_{}",
        SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
        .map_err(StateError::sqlite)?;

    let result = (|| {
        conn.execute(
            "DELETE FROM dependency_edges WHERE from_file_id = ?1",
            params![file_id],
        )
        .map_err(StateError::sqlite)?;

        for symbol_id in symbol_ids {
            conn.execute(
                "DELETE FROM dependency_edges WHERE from_symbol_id = ?1",
                params![symbol_id],
            )
            .map_err(StateError::sqlite)?;
        }

        insert_edges(conn, new_edges)
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

pub fn get_edges_from_file(
    conn: &Connection,
    from_file_id: &str,
) -> Result<Vec<DependencyEdge>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata
             FROM dependency_edges WHERE from_file_id = ?1
             ORDER BY to_file_id, dependency_type",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![from_file_id], row_to_edge)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

pub fn get_edges_to_file(
    conn: &Connection,
    to_file_id: &str,
) -> Result<Vec<DependencyEdge>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata
             FROM dependency_edges WHERE to_file_id = ?1
             ORDER BY from_file_id, dependency_type",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![to_file_id], row_to_edge)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

pub fn get_edges_from_symbol(
    conn: &Connection,
    from_symbol_id: &str,
) -> Result<Vec<DependencyEdge>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata
             FROM dependency_edges WHERE from_symbol_id = ?1
             ORDER BY to_symbol_id, dependency_type",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![from_symbol_id], row_to_edge)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

pub fn get_edges_to_symbol(
    conn: &Connection,
    to_symbol_id: &str,
) -> Result<Vec<DependencyEdge>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata
             FROM dependency_edges WHERE to_symbol_id = ?1
             ORDER BY from_symbol_id, dependency_type",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map(params![to_symbol_id], row_to_edge)
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

/// All edges ordered by their internal rowid, paired with that rowid since
/// `DependencyEdge` itself carries no id (its identity is the 5-column
/// conflict key). Used by the export side of the sync layer, which needs a
/// stable `id` field on every exported record.
pub fn list_all_with_rowid(conn: &Connection) -> Result<Vec<(i64, DependencyEdge)>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type, confidence, metadata
             FROM dependency_edges ORDER BY id",
        )
        .map_err(StateError::sqlite)?;
    let rows = stmt
        .query_map([], |row| {
            let rowid: i64 = row.get(0)?;
            let edge = row_to_edge_from_offset(row, 1)?;
            Ok((rowid, edge))
        })
        .map_err(StateError::sqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)
}

/// Existence check used by the dependency builder's dedup pass — cheaper
/// than fetching and comparing the whole row.
pub fn edge_exists(
    conn: &Connection,
    edge: &DependencyEdge,
) -> Result<bool, StateError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM dependency_edges
             WHERE from_file_id IS ?1 AND to_file_id IS ?2
               AND from_symbol_id IS ?3 AND to_symbol_id IS ?4
               AND dependency_type = ?5",
            params![
                edge.from_file_id,
                edge.to_file_id,
                edge.from_symbol_id,
                edge.to_symbol_id,
                edge.dependency_type.as_str(),
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(StateError::sqlite)?;
    Ok(found.is_some())
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<DependencyEdge> {
    row_to_edge_from_offset(row, 0)
}

fn row_to_edge_from_offset(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<DependencyEdge> {
    let dependency_type_str: String = row.get(offset + 4)?;
    let dependency_type = parse_dependency_type(&dependency_type_str);
    let confidence_str: String = row.get(offset + 5)?;
    let confidence = match confidence_str.as_str() {
        "medium" => EdgeConfidence::Medium,
        "low" => EdgeConfidence::Low,
        _ => EdgeConfidence::High,
    };
    let metadata_json: String = row.get(offset + 6)?;
    let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
    Ok(DependencyEdge {
        from_file_id: row.get(offset)?,
        to_file_id: row.get(offset + 1)?,
        from_symbol_id: row.get(offset + 2)?,
        to_symbol_id: row.get(offset + 3)?,
        dependency_type,
        confidence,
        metadata,
    })
}

fn parse_dependency_type(s: &str) -> DependencyType {
    match s {
        "re_export" => DependencyType::ReExport,
        "export_all" => DependencyType::ExportAll,
        "calls" => DependencyType::Calls,
        "references_type" => DependencyType::ReferencesType,
        "property_of" => DependencyType::PropertyOf,
        _ => DependencyType::Import,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use tempfile::tempdir;

    fn setup_test_db() -> Connection {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("test.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    fn file_edge(from: &str, to: &str) -> DependencyEdge {
        DependencyEdge {
            from_file_id: Some(from.to_string()),
            to_file_id: Some(to.to_string()),
            from_symbol_id: None,
            to_symbol_id: None,
            dependency_type: DependencyType::Import,
            confidence: EdgeConfidence::High,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn insert_then_query_from_and_to() {
        let conn = setup_test_db();
        insert_edges(&conn, &[file_edge("a", "b"), file_edge("a", "c")]).unwrap();

        let from_a = get_edges_from_file(&conn, "a").unwrap();
        assert_eq!(from_a.len(), 2);

        let to_b = get_edges_to_file(&conn, "b").unwrap();
        assert_eq!(to_b.len(), 1);
    }

    #[test]
    fn insert_is_idempotent_on_conflict_key() {
        let conn = setup_test_db();
        insert_edges(&conn, &[file_edge("a", "b")]).unwrap();
        insert_edges(&conn, &[file_edge("a", "b")]).unwrap();

        let from_a = get_edges_from_file(&conn, "a").unwrap();
        assert_eq!(from_a.len(), 1);
    }

    #[test]
    fn replace_edges_for_file_swaps_contents() {
        let conn = setup_test_db();
        insert_edges(&conn, &[file_edge("a", "b")]).unwrap();

        replace_edges_for_file(&conn, "a", &[], &[file_edge("a", "c")]).unwrap();

        let from_a = get_edges_from_file(&conn, "a").unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].to_file_id.as_deref(), Some("c"));
    }

    #[test]
    fn edge_exists_detects_prior_insert() {
        let conn = setup_test_db();
        let edge = file_edge("a", "b");
        assert!(!edge_exists(&conn, &edge).unwrap());
        insert_edges(&conn, &[edge.clone()]).unwrap();
        assert!(edge_exists(&conn, &edge).unwrap());
    }

    #[test]
    fn symbol_level_edges_are_queryable_both_directions() {
        let conn = setup_test_db();
        let edge = DependencyEdge {
            from_file_id: None,
            to_file_id: None,
            from_symbol_id: Some("s1".to_string()),
            to_symbol_id: Some("s2".to_string()),
            dependency_type: DependencyType::Calls,
            confidence: EdgeConfidence::Medium,
            metadata: HashMap::new(),
        };
        insert_edges(&conn, &[edge]).unwrap();

        assert_eq!(get_edges_from_symbol(&conn, "s1").unwrap().len(), 1);
        assert_eq!(get_edges_to_symbol(&conn, "s2").unwrap().len(), 1);
    }

    #[test]
    fn list_all_with_rowid_assigns_increasing_ids() {
        let conn = setup_test_db();
        insert_edges(&conn, &[file_edge("a", "b"), file_edge("a", "c")]).unwrap();

        let all = list_all_with_rowid(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].0 < all[1].0);
    }
}
