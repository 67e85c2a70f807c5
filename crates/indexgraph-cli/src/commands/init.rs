use anyhow::{Context, Result};
use indexgraph_core::config::Config;
use indexgraph_core::constants;
use indexgraph_core::ids::generate_repository_id;
use indexgraph_core::time::now_iso8601;
use indexgraph_core::types::{Repository, RepositoryOwner};
use indexgraph_core::vcs;
use indexgraph_state::{db, repositories, schema};
use std::path::Path;
use tracing::info;

pub fn run(repo_root: &Path, config_file: Option<&Path>) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("failed to resolve repository root")?;
    let repo_root_str = repo_root.to_string_lossy().to_string();

    let config = Config::load_with_file(Some(&repo_root), config_file)?;
    let repository_id = generate_repository_id(&repo_root_str);
    let data_dir = config.repository_data_dir(&repository_id);

    std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

    let db_path = data_dir.join(constants::STATE_DB_FILE);
    let conn = db::open_connection(&db_path)?;
    schema::create_tables(&conn)?;

    if let Some(existing) = repositories::get_by_full_name(&conn, &repo_root_str)? {
        println!("Repository already initialized:");
        println!("  ID:       {}", existing.id);
        println!("  Root:     {}", existing.full_name);
        println!("  Data dir: {}", data_dir.display());
        return Ok(());
    }

    let default_ref = if vcs::is_git_repo(&repo_root) {
        vcs::detect_head_branch(&repo_root).unwrap_or_else(|_| "main".to_string())
    } else {
        "main".to_string()
    };

    let repository = Repository {
        id: repository_id.clone(),
        full_name: repo_root_str.clone(),
        default_ref,
        installation_id: None,
        owner: RepositoryOwner::User { user_id: "local".to_string() },
    };
    repositories::upsert_repository(&conn, &repository)?;

    println!("Repository initialized successfully!");
    println!("  ID:       {}", repository_id);
    println!("  Root:     {}", repo_root_str);
    println!("  Data dir: {}", data_dir.display());
    println!();
    println!("Next step: run `indexgraph index` to index the codebase.");

    info!(repository_id, root = %repo_root_str, at = %now_iso8601(), "repository initialized");
    Ok(())
}
