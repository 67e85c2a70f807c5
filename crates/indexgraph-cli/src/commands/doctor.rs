use anyhow::{Context, Result};
use indexgraph_core::config::Config;
use indexgraph_core::constants;
use indexgraph_core::ids::generate_repository_id;
use indexgraph_state::{db, repositories, schema};
use std::path::Path;

pub fn run(repo_root: &Path, config_file: Option<&Path>) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("failed to resolve repository root")?;
    let repo_root_str = repo_root.to_string_lossy().to_string();

    let config = Config::load_with_file(Some(&repo_root), config_file)?;
    let repository_id = generate_repository_id(&repo_root_str);
    let data_dir = config.repository_data_dir(&repository_id);
    let db_path = data_dir.join(constants::STATE_DB_FILE);

    println!("indexgraph doctor");
    println!("  Root: {repo_root_str}");
    println!();

    if !db_path.exists() {
        println!("[FAIL] database not found at {}", db_path.display());
        println!("       run `indexgraph init` first");
        return Ok(());
    }

    let conn = db::open_connection(&db_path)?;
    schema::create_tables(&conn)?;

    match db::check_sqlite_health(&conn) {
        Ok((true, _)) => println!("[OK]   database integrity check passed"),
        Ok((false, Some(detail))) => println!("[FAIL] database integrity check failed: {detail}"),
        Ok((false, None)) => println!("[FAIL] database integrity check failed"),
        Err(err) => println!("[FAIL] could not run integrity check: {err}"),
    }

    match repositories::get_by_id(&conn, &repository_id)? {
        Some(_) => println!("[OK]   repository registered"),
        None => println!("[FAIL] repository not registered, run `indexgraph init`"),
    }

    for language in indexgraph_indexer::parser::supported_languages() {
        match indexgraph_indexer::parser::parse_file("", language) {
            Ok(_) => println!("[OK]   grammar available for {language}"),
            Err(err) => println!("[FAIL] grammar unavailable for {language}: {err}"),
        }
    }

    let ignore_file = repo_root.join(indexgraph_indexer::walker::IGNORE_FILE);
    if ignore_file.exists() {
        let rule_count = std::fs::read_to_string(&ignore_file)
            .map(|content| content.lines().filter(|l| !l.trim().is_empty() && !l.starts_with('#')).count())
            .unwrap_or(0);
        println!("[OK]   {} has {rule_count} rule(s)", indexgraph_indexer::walker::IGNORE_FILE);
    } else {
        println!("[INFO] no {} present", indexgraph_indexer::walker::IGNORE_FILE);
    }

    Ok(())
}
