//! JSONL export: one file per table under the export directory, one record
//! per line, sorted by id for deterministic diffs.

use indexgraph_core::error::StateError;
use indexgraph_core::types::DependencyEdge;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{edges, files, jobs, references, repositories, symbols};

pub const REPOSITORIES_FILE: &str = "repositories.jsonl";
pub const FILES_FILE: &str = "indexed_files.jsonl";
pub const SYMBOLS_FILE: &str = "symbols.jsonl";
pub const REFERENCES_FILE: &str = "references.jsonl";
pub const EDGES_FILE: &str = "dependency_edges.jsonl";
pub const JOBS_FILE: &str = "index_jobs.jsonl";

/// All table export file names, in a fixed order.
pub const TABLE_FILES: &[&str] = &[
    REPOSITORIES_FILE,
    FILES_FILE,
    SYMBOLS_FILE,
    REFERENCES_FILE,
    EDGES_FILE,
    JOBS_FILE,
];

/// Edges carry no `id` field of their own; the export record synthesizes one
/// from the table's internal rowid so every exported line has an `id`, per
/// the JSONL record layout contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedEdge {
    pub id: i64,
    #[serde(flatten)]
    pub edge: DependencyEdge,
}

/// Export every table into `export_dir`, creating it if needed. Each file is
/// written to a temporary path and renamed into place so a crash mid-export
/// never leaves a half-written table file.
pub fn export_all(conn: &Connection, export_dir: &Path) -> Result<(), StateError> {
    std::fs::create_dir_all(export_dir).map_err(StateError::Io)?;

    write_jsonl(export_dir, REPOSITORIES_FILE, &repositories::list_all(conn)?)?;
    write_jsonl(export_dir, FILES_FILE, &files::list_all(conn)?)?;
    write_jsonl(export_dir, SYMBOLS_FILE, &symbols::list_all(conn)?)?;
    write_jsonl(export_dir, REFERENCES_FILE, &references::list_all(conn)?)?;

    let exported_edges: Vec<ExportedEdge> = edges::list_all_with_rowid(conn)?
        .into_iter()
        .map(|(id, edge)| ExportedEdge { id, edge })
        .collect();
    write_jsonl(export_dir, EDGES_FILE, &exported_edges)?;

    write_jsonl(export_dir, JOBS_FILE, &jobs::list_all(conn)?)?;
    Ok(())
}

fn write_jsonl<T: Serialize>(dir: &Path, file_name: &str, records: &[T]) -> Result<(), StateError> {
    let final_path = dir.join(file_name);
    let tmp_path = tmp_path_for(dir, file_name);

    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(StateError::Io)?;
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| StateError::CorruptManifest(e.to_string()))?;
            writeln!(tmp, "{line}").map_err(StateError::Io)?;
        }
        tmp.sync_all().map_err(StateError::Io)?;
    }

    std::fs::rename(&tmp_path, &final_path).map_err(StateError::Io)?;
    Ok(())
}

fn tmp_path_for(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!("{file_name}.tmp"))
}
