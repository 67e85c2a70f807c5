use anyhow::{Context, Result};
use indexgraph_core::config::Config;
use indexgraph_core::constants;
use indexgraph_core::ids::generate_repository_id;
use indexgraph_state::{db, schema, sync};
use std::path::Path;
use tracing::info;

pub fn run_export(repo_root: &Path, config_file: Option<&Path>, export_dir: &Path) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("failed to resolve repository root")?;
    let repo_root_str = repo_root.to_string_lossy().to_string();

    let config = Config::load_with_file(Some(&repo_root), config_file)?;
    let repository_id = generate_repository_id(&repo_root_str);
    let data_dir = config.repository_data_dir(&repository_id);
    let db_path = data_dir.join(constants::STATE_DB_FILE);

    let conn = db::open_connection(&db_path)?;
    schema::create_tables(&conn)?;

    sync::export::export_all(&conn, export_dir)?;

    println!("Exported index state to {}", export_dir.display());
    info!(repository_id, export_dir = %export_dir.display(), "sync export completed");
    Ok(())
}

pub fn run_import(repo_root: &Path, config_file: Option<&Path>, import_dir: &Path) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("failed to resolve repository root")?;
    let repo_root_str = repo_root.to_string_lossy().to_string();

    let config = Config::load_with_file(Some(&repo_root), config_file)?;
    let repository_id = generate_repository_id(&repo_root_str);
    let data_dir = config.repository_data_dir(&repository_id);
    let db_path = data_dir.join(constants::STATE_DB_FILE);
    let manifest_path = data_dir.join(".deletions.jsonl");

    let conn = db::open_connection(&db_path)?;
    schema::create_tables(&conn)?;

    let stats = sync::import_directory(&conn, import_dir, &manifest_path)?;

    println!("Imported index state from {}", import_dir.display());
    println!("  Records loaded:              {}", stats.records_loaded);
    println!("  Deletions applied:           {}", stats.deletions_applied);
    println!("  Deletions skipped (unknown): {}", stats.deletions_skipped_unknown_table);

    info!(repository_id, import_dir = %import_dir.display(), records = stats.records_loaded, "sync import completed");
    Ok(())
}

pub fn run_merge(base: &Path, ours: &Path, theirs: &Path, out: &Path) -> Result<()> {
    let base_text = std::fs::read_to_string(base).context("failed to read base export")?;
    let ours_text = std::fs::read_to_string(ours).context("failed to read ours export")?;
    let theirs_text = std::fs::read_to_string(theirs).context("failed to read theirs export")?;

    let merged = sync::merge::merge_table(&base_text, &ours_text, &theirs_text)?;
    std::fs::write(out, merged).context("failed to write merged output")?;

    println!("Merged table written to {}", out.display());
    Ok(())
}
