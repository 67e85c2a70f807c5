//! Glues C1-C7 extraction onto `indexgraph_state::pipeline`'s two-pass
//! writer for one repository: scan, read, parse, extract, chunk, persist.

use crate::{dependencies, parser, path_alias, references as refs_mod, symbols, walker};
use indexgraph_core::constants::DEFAULT_FILE_WRITE_CHUNK_SIZE;
use indexgraph_core::error::StateError;
use indexgraph_core::ids::generate_file_id;
use indexgraph_core::types::{compute_content_hash, compute_symbol_id, Reference, Symbol};
use indexgraph_state::pipeline::{
    run_pass1, run_pass2, FileResolution, FileWithSymbols,
};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexRunStats {
    pub files_indexed: u64,
    pub symbols_extracted: u64,
    pub references_found: u64,
    pub dependencies_extracted: u64,
}

struct PreparedFile {
    path: String,
    language: String,
    content: String,
    tree: Option<tree_sitter::Tree>,
    extracted_symbols: Vec<symbols::ExtractedSymbol>,
}

fn prepare_files(repo_root: &Path, extensions: &[String]) -> Vec<PreparedFile> {
    let scanned = walker::scan_directory_filtered(repo_root, indexgraph_core::constants::MAX_FILE_SIZE, extensions);
    let mut prepared = Vec::with_capacity(scanned.len());

    for file in scanned {
        let Some(read) = crate::reader::read_file(&file) else { continue };
        let tree = parser::parse_file(&read.content, &read.language).ok();
        let extracted_symbols = match &tree {
            Some(tree) => symbols::extract_symbols(tree, &read.content, &read.language),
            None => Vec::new(),
        };
        prepared.push(PreparedFile {
            path: read.relative_path,
            language: read.language,
            content: read.content,
            tree,
            extracted_symbols,
        });
    }
    prepared
}

/// Run a full reindex of `repo_root` into `repository_id`, storing results
/// through `conn`. Performs the complete C1-C8 contract: pass 1 (files +
/// symbols, chunked, full delete at chunk 0), a query-back, then pass 2
/// (references + edges resolved against the file ids pass 1 produced).
pub fn run_full_index(
    conn: &Connection,
    repository_id: &str,
    repo_root: &Path,
    extensions: &[String],
) -> Result<IndexRunStats, StateError> {
    let prepared = prepare_files(repo_root, extensions);
    run_index_over(conn, repository_id, repo_root, prepared, true)
}

/// Run a scoped reindex over just `paths` (relative to `repo_root`), for the
/// incremental path: no repository-wide delete, only the named paths are
/// replaced.
pub fn run_scoped_index(
    conn: &Connection,
    repository_id: &str,
    repo_root: &Path,
    paths: &[String],
) -> Result<IndexRunStats, StateError> {
    let mut prepared = Vec::new();
    for relative_path in paths {
        let full_path = repo_root.join(relative_path);
        let Ok(content) = std::fs::read_to_string(&full_path) else {
            warn!(path = %relative_path, "incremental read failed, skipping");
            continue;
        };
        let ext = Path::new(relative_path).extension().and_then(|e| e.to_str()).unwrap_or("");
        let language = indexgraph_core::languages::detect_language_from_extension(ext).to_string();
        let tree = parser::parse_file(&content, &language).ok();
        let extracted_symbols = match &tree {
            Some(tree) => symbols::extract_symbols(tree, &content, &language),
            None => Vec::new(),
        };
        prepared.push(PreparedFile { path: relative_path.clone(), language, content, tree, extracted_symbols });
    }
    run_index_over(conn, repository_id, repo_root, prepared, false)
}

fn run_index_over(
    conn: &Connection,
    repository_id: &str,
    repo_root: &Path,
    prepared: Vec<PreparedFile>,
    full_reindex: bool,
) -> Result<IndexRunStats, StateError> {
    let mut stats = IndexRunStats::default();

    if !full_reindex {
        for file in &prepared {
            indexgraph_state::pipeline::delete_path(conn, repository_id, &file.path)?;
        }
    }

    let mut entries = Vec::with_capacity(prepared.len());
    for file in &prepared {
        let file_id = generate_file_id(repository_id, &file.path);
        let stored_symbols: Vec<Symbol> = file
            .extracted_symbols
            .iter()
            .map(|extracted| {
                let id = compute_symbol_id(repository_id, &file.path, extracted.kind, extracted.line_start, &extracted.name);
                symbols::to_stored_symbol(extracted, id, file_id.clone())
            })
            .collect();
        stats.symbols_extracted += stored_symbols.len() as u64;

        entries.push(FileWithSymbols {
            file: indexgraph_core::types::IndexedFile {
                id: file_id,
                repository_id: repository_id.to_string(),
                path: file.path.clone(),
                content: file.content.clone(),
                language: file.language.clone(),
                size_bytes: file.content.len() as u64,
                content_hash: compute_content_hash(&file.content),
                indexed_at: indexgraph_core::time::now_iso8601(),
                metadata: HashMap::new(),
            },
            symbols: stored_symbols,
        });
    }

    let chunks: Vec<Vec<FileWithSymbols>> = entries
        .chunks(DEFAULT_FILE_WRITE_CHUNK_SIZE)
        .map(|c| c.to_vec())
        .collect();
    let pass1_stats = run_pass1(conn, repository_id, &chunks, full_reindex)?;
    stats.files_indexed = pass1_stats.files_written;

    let all_files = indexgraph_state::pipeline::query_back_all_files(conn, repository_id)?;
    let file_ids: Vec<String> = all_files.iter().map(|f| f.id.clone()).collect();
    let all_symbols = indexgraph_state::pipeline::query_back_symbols(conn, &file_ids)?;

    let file_set: HashSet<String> = all_files.iter().map(|f| f.path.clone()).collect();
    let path_to_id: HashMap<String, String> = all_files.iter().map(|f| (f.path.clone(), f.id.clone())).collect();
    let mappings = path_alias::discover_mappings(repo_root);

    let mut resolutions = Vec::new();
    for file in &prepared {
        let Some(file_id) = path_to_id.get(&file.path) else { continue };
        let mut extracted_refs = refs_mod::extract_imports(&file.content, &file.language);
        if let Some(tree) = &file.tree {
            extracted_refs.extend(refs_mod::extract_node_references(tree, &file.content, &file.language));
        }

        let mut stored_refs = Vec::with_capacity(extracted_refs.len());
        for extracted in extracted_refs {
            let target_file_id = if extracted.reference_type == indexgraph_core::types::ReferenceType::Import {
                let import_source = extracted.metadata.get("import_source").cloned().unwrap_or_default();
                path_alias::resolve_import(&import_source, &file.path, &file_set, mappings.as_ref())
                    .and_then(|resolved| path_to_id.get(&resolved).cloned())
            } else {
                None
            };

            let mut metadata = extracted.metadata.clone();
            metadata.insert("target_name".to_string(), extracted.target_name.clone());

            let reference_id = compute_reference_id(file_id, extracted.line_number, extracted.column_number, &extracted.target_name);
            stored_refs.push(Reference {
                id: reference_id,
                source_file_id: file_id.clone(),
                target_symbol_key: None,
                target_file_id,
                line_number: extracted.line_number,
                column_number: extracted.column_number,
                reference_type: extracted.reference_type,
                metadata,
            });
        }
        stats.references_found += stored_refs.len() as u64;

        let file_symbols: Vec<Symbol> = all_symbols.iter().filter(|s| &s.file_id == file_id).cloned().collect();
        let file_files: Vec<indexgraph_core::types::IndexedFile> = all_files.clone();
        let edges = dependencies::build_dependency_edges(&file_files, &all_symbols, &mut stored_refs);
        let own_edges: Vec<_> = edges
            .into_iter()
            .filter(|e| e.from_file_id.as_deref() == Some(file_id.as_str()) || e.from_symbol_id.as_ref().is_some_and(|id| file_symbols.iter().any(|s| &s.id == id)))
            .collect();
        stats.dependencies_extracted += own_edges.len() as u64;

        resolutions.push(FileResolution {
            file_id: file_id.clone(),
            symbol_ids: file_symbols.iter().map(|s| s.id.clone()).collect(),
            references: stored_refs,
            edges: own_edges,
        });
    }

    run_pass2(conn, &resolutions)?;

    Ok(stats)
}

fn compute_reference_id(file_id: &str, line: u32, column: u32, target_name: &str) -> String {
    let input = format!("{file_id}|{line}|{column}|{target_name}");
    blake3::hash(input.as_bytes()).to_hex().to_string()
}
