//! Two-pass batched persistence: pass 1 writes files and symbols in chunks,
//! pass 2 (run only after all pass-1 chunks land) resolves references/edges
//! against the file ids pass 1 generated.

use crate::{edges, files, references, symbols};
use indexgraph_core::constants::{
    DEFAULT_FILE_QUERY_BATCH_SIZE, DEFAULT_FILE_WRITE_CHUNK_SIZE, DEFAULT_SYMBOL_QUERY_BATCH_SIZE,
};
use indexgraph_core::error::StateError;
use indexgraph_core::types::{DependencyEdge, IndexedFile, Reference, Symbol};
use rusqlite::{Connection, params};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file and the symbols extracted from it, chunked together so pass 1 can
/// write both inside the same savepoint.
#[derive(Debug, Clone)]
pub struct FileWithSymbols {
    pub file: IndexedFile,
    pub symbols: Vec<Symbol>,
}

/// The reference/edge set resolved for one file in pass 2, plus the symbol
/// ids owned by that file (so stale edges rooted at those symbols can be
/// cleared before the replacement set is written).
#[derive(Debug, Clone)]
pub struct FileResolution {
    pub file_id: String,
    pub symbol_ids: Vec<String>,
    pub references: Vec<Reference>,
    pub edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassOneStats {
    pub files_written: u64,
    pub symbols_written: u64,
    pub chunks_completed: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassTwoStats {
    pub references_written: u64,
    pub edges_written: u64,
}

/// Delete every file, symbol, reference and edge owned by a repository.
/// Used at the start of a full reindex (pass 1, chunk 0) and, scoped to a
/// single path, by the incremental indexer.
pub fn delete_repository_contents(conn: &Connection, repository_id: &str) -> Result<(), StateError> {
    let file_ids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT id FROM indexed_files WHERE repository_id = ?1")
            .map_err(StateError::sqlite)?;
        let rows = stmt
            .query_map(params![repository_id], |row| row.get(0))
            .map_err(StateError::sqlite)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::sqlite)?
    };
    delete_files_by_id(conn, &file_ids)
}

fn delete_files_by_id(conn: &Connection, file_ids: &[String]) -> Result<(), StateError> {
    for file_id in file_ids {
        conn.execute(
            "DELETE FROM dependency_edges WHERE from_file_id = ?1 OR to_file_id = ?1",
            params![file_id],
        )
        .map_err(StateError::sqlite)?;
        conn.execute(
            "DELETE FROM \"references\" WHERE source_file_id = ?1 OR target_file_id = ?1",
            params![file_id],
        )
        .map_err(StateError::sqlite)?;
        conn.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])
            .map_err(StateError::sqlite)?;
        conn.execute("DELETE FROM indexed_files WHERE id = ?1", params![file_id])
            .map_err(StateError::sqlite)?;
    }
    Ok(())
}

/// Delete the rows for a single changed path, for the incremental path
/// (spec's "delete rows for the exact changed paths" step).
pub fn delete_path(conn: &Connection, repository_id: &str, path: &str) -> Result<(), StateError> {
    if let Some(existing) = files::get_by_path(conn, repository_id, path)? {
        delete_files_by_id(conn, &[existing.id])?;
    }
    Ok(())
}

/// Run pass 1 over pre-chunked file batches. When `full_reindex` is set, all
/// of the repository's existing files/symbols (and anything cascading from
/// them) are deleted before chunk 0 lands, per spec's "if k == 0, first
/// delete all files/symbols of the Repository".
pub fn run_pass1(
    conn: &Connection,
    repository_id: &str,
    chunks: &[Vec<FileWithSymbols>],
    full_reindex: bool,
) -> Result<PassOneStats, StateError> {
    let mut stats = PassOneStats::default();

    for (index, chunk) in chunks.iter().enumerate() {
        let savepoint = format!(
            "indexgraph_pass1_{}",
            SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
            .map_err(StateError::sqlite)?;

        let result = (|| {
            if index == 0 && full_reindex {
                delete_repository_contents(conn, repository_id)?;
            }

            let files_in_chunk: Vec<IndexedFile> =
                chunk.iter().map(|entry| entry.file.clone()).collect();
            files::insert_files_chunk(conn, &files_in_chunk)?;

            for entry in chunk {
                symbols::replace_symbols_for_file(conn, &entry.file.id, &entry.symbols)?;
                stats.symbols_written += entry.symbols.len() as u64;
            }
            stats.files_written += chunk.len() as u64;
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute_batch(&format!("RELEASE {savepoint}"))
                    .map_err(StateError::sqlite)?;
                stats.chunks_completed += 1;
                info!(chunk = index, files = chunk.len(), "pass 1 chunk committed");
            }
            Err(err) => {
                let _ = conn.execute_batch(&format!("ROLLBACK TO {savepoint}; RELEASE {savepoint}"));
                warn!(chunk = index, error = %err, "pass 1 chunk failed, aborting job");
                return Err(err);
            }
        }
    }

    Ok(stats)
}

/// Query back every file belonging to a repository, paginating by the
/// configured file batch size so pass 2 never issues an oversized request.
pub fn query_back_all_files(
    conn: &Connection,
    repository_id: &str,
) -> Result<Vec<IndexedFile>, StateError> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = files::get_files_page(
            conn,
            repository_id,
            cursor.as_deref(),
            DEFAULT_FILE_QUERY_BATCH_SIZE,
        )?;
        if page.is_empty() {
            break;
        }
        let short_page = page.len() < DEFAULT_FILE_QUERY_BATCH_SIZE;
        cursor = page.last().map(|file| file.id.clone());
        all.extend(page);
        if short_page {
            break;
        }
    }
    Ok(all)
}

/// Fetch symbols for a set of file ids in batches of at most
/// [`DEFAULT_SYMBOL_QUERY_BATCH_SIZE`] ids per query.
pub fn query_back_symbols(
    conn: &Connection,
    file_ids: &[String],
) -> Result<Vec<Symbol>, StateError> {
    let mut all = Vec::new();
    for batch in file_ids.chunks(DEFAULT_SYMBOL_QUERY_BATCH_SIZE) {
        all.extend(symbols::get_symbols_for_files(conn, batch)?);
    }
    Ok(all)
}

/// Run pass 2: write resolved references and edges in chunks of
/// [`DEFAULT_FILE_WRITE_CHUNK_SIZE`] files. Never deletes a file or symbol
/// row — pass 2 failures must not erase pass-1 data.
pub fn run_pass2(
    conn: &Connection,
    resolutions: &[FileResolution],
) -> Result<PassTwoStats, StateError> {
    let mut stats = PassTwoStats::default();

    for chunk in resolutions.chunks(DEFAULT_FILE_WRITE_CHUNK_SIZE) {
        let savepoint = format!(
            "indexgraph_pass2_{}",
            SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        conn.execute_batch(&format!("SAVEPOINT {savepoint}"))
            .map_err(StateError::sqlite)?;

        let result = (|| {
            for resolution in chunk {
                references::replace_references_for_file(
                    conn,
                    &resolution.file_id,
                    &resolution.references,
                )?;
                edges::replace_edges_for_file(
                    conn,
                    &resolution.file_id,
                    &resolution.symbol_ids,
                    &resolution.edges,
                )?;
                stats.references_written += resolution.references.len() as u64;
                stats.edges_written += resolution.edges.len() as u64;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute_batch(&format!("RELEASE {savepoint}"))
                    .map_err(StateError::sqlite)?;
            }
            Err(err) => {
                let _ = conn.execute_batch(&format!("ROLLBACK TO {savepoint}; RELEASE {savepoint}"));
                warn!(error = %err, "pass 2 chunk failed");
                return Err(err);
            }
        }
    }

    info!(
        references = stats.references_written,
        edges = stats.edges_written,
        "pass 2 complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, repositories, schema};
    use indexgraph_core::types::{DependencyType, EdgeConfidence, ReferenceType, Repository, RepositoryOwner, SymbolKind};
    use std::collections::HashMap;
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
        conn
    }

    fn sample_entry(id: &str, path: &str) -> FileWithSymbols {
        FileWithSymbols {
            file: IndexedFile {
                id: id.to_string(),
                repository_id: "repo_1".to_string(),
                path: path.to_string(),
                content: "fn main() {}".to_string(),
                language: "rust".to_string(),
                size_bytes: 13,
                content_hash: "hash".to_string(),
                indexed_at: "2026-01-01T00:00:00Z".to_string(),
                metadata: HashMap::new(),
            },
            symbols: vec![Symbol {
                id: format!("{id}_sym"),
                file_id: id.to_string(),
                name: "main".to_string(),
                kind: SymbolKind::Function,
                line_start: 1,
                line_end: 1,
                signature: Some("fn main()".to_string()),
                documentation: None,
                metadata: HashMap::new(),
            }],
        }
    }

    #[test]
    fn pass1_writes_files_and_symbols_across_chunks() {
        let conn = setup_test_db();
        let chunks = vec![
            vec![sample_entry("f1", "a.rs")],
            vec![sample_entry("f2", "b.rs")],
        ];
        let stats = run_pass1(&conn, "repo_1", &chunks, true).unwrap();
        assert_eq!(stats.files_written, 2);
        assert_eq!(stats.symbols_written, 2);
        assert_eq!(stats.chunks_completed, 2);
        assert_eq!(files::file_count(&conn, "repo_1").unwrap(), 2);
    }

    #[test]
    fn full_reindex_deletes_prior_repository_contents() {
        let conn = setup_test_db();
        run_pass1(&conn, "repo_1", &[vec![sample_entry("stale", "old.rs")]], true).unwrap();
        assert_eq!(files::file_count(&conn, "repo_1").unwrap(), 1);

        run_pass1(&conn, "repo_1", &[vec![sample_entry("f1", "a.rs")]], true).unwrap();
        assert_eq!(files::file_count(&conn, "repo_1").unwrap(), 1);
        assert!(files::get_by_path(&conn, "repo_1", "old.rs").unwrap().is_none());
    }

    #[test]
    fn query_back_all_files_paginates_to_completion() {
        let conn = setup_test_db();
        let chunk: Vec<FileWithSymbols> = (0..3)
            .map(|i| sample_entry(&format!("f{i}"), &format!("src/m{i}.rs")))
            .collect();
        run_pass1(&conn, "repo_1", &[chunk], true).unwrap();

        let all = query_back_all_files(&conn, "repo_1").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn pass2_writes_references_and_edges_without_touching_files() {
        let conn = setup_test_db();
        run_pass1(&conn, "repo_1", &[vec![sample_entry("f1", "a.rs")]], true).unwrap();

        let resolution = FileResolution {
            file_id: "f1".to_string(),
            symbol_ids: vec!["f1_sym".to_string()],
            references: vec![Reference {
                id: "r1".to_string(),
                source_file_id: "f1".to_string(),
                target_symbol_key: Some("a.rs::main::1".to_string()),
                target_file_id: Some("f1".to_string()),
                line_number: 1,
                column_number: 0,
                reference_type: ReferenceType::Call,
                metadata: HashMap::new(),
            }],
            edges: vec![DependencyEdge {
                from_file_id: Some("f1".to_string()),
                to_file_id: Some("f1".to_string()),
                from_symbol_id: None,
                to_symbol_id: None,
                dependency_type: DependencyType::Import,
                confidence: EdgeConfidence::High,
                metadata: HashMap::new(),
            }],
        };

        let stats = run_pass2(&conn, &[resolution]).unwrap();
        assert_eq!(stats.references_written, 1);
        assert_eq!(stats.edges_written, 1);
        assert_eq!(files::file_count(&conn, "repo_1").unwrap(), 1);
    }

    #[test]
    fn delete_path_removes_only_the_targeted_file() {
        let conn = setup_test_db();
        run_pass1(
            &conn,
            "repo_1",
            &[vec![sample_entry("f1", "a.rs"), sample_entry("f2", "b.rs")]],
            true,
        )
        .unwrap();

        delete_path(&conn, "repo_1", "a.rs").unwrap();
        assert!(files::get_by_path(&conn, "repo_1", "a.rs").unwrap().is_none());
        assert!(files::get_by_path(&conn, "repo_1", "b.rs").unwrap().is_some());
    }
}
