use anyhow::{Context, Result, bail};
use indexgraph_core::config::Config;
use indexgraph_core::constants;
use indexgraph_core::ids::{generate_repository_id, new_job_id};
use indexgraph_core::time::now_iso8601;
use indexgraph_core::types::{IndexJob, JobStats, JobStatus};
use indexgraph_state::{db, jobs, repositories, schema};
use std::path::Path;
use tracing::info;

pub fn run(repo_root: &Path, config_file: Option<&Path>, force: bool) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("failed to resolve repository root")?;
    let repo_root_str = repo_root.to_string_lossy().to_string();

    let config = Config::load_with_file(Some(&repo_root), config_file)?;
    let repository_id = generate_repository_id(&repo_root_str);
    let data_dir = config.repository_data_dir(&repository_id);
    let db_path = data_dir.join(constants::STATE_DB_FILE);
    let conn = db::open_connection(&db_path)?;
    schema::create_tables(&conn)?;

    let Some(repository) = repositories::get_by_id(&conn, &repository_id)? else {
        bail!("repository not initialized, run `indexgraph init` first");
    };

    if !force {
        if let Some(active) = jobs::get_active_job_for_ref(&conn, &repository_id, &repository.default_ref)? {
            println!("An index job is already active: {}", active.id);
            return Ok(());
        }
    }

    let job = IndexJob {
        id: new_job_id(),
        repository_id: repository_id.clone(),
        r#ref: repository.default_ref.clone(),
        commit_sha: None,
        status: JobStatus::Pending,
        started_at: None,
        completed_at: None,
        error_message: None,
        retry_count: 0,
        stats: JobStats::default(),
    };
    jobs::create_job(&conn, &job, &now_iso8601())?;
    jobs::transition_job_status(&conn, &job.id, JobStatus::Processing, &now_iso8601())?;

    println!("Indexing {repo_root_str}...");

    let extensions: Vec<String> = constants::DEFAULT_WATCHED_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    match indexgraph_indexer::pipeline::run_full_index(&conn, &repository_id, &repo_root, &extensions) {
        Ok(stats) => {
            jobs::update_stats(
                &conn,
                &job.id,
                &JobStats {
                    files_indexed: stats.files_indexed,
                    symbols_extracted: stats.symbols_extracted,
                    references_found: stats.references_found,
                    dependencies_extracted: stats.dependencies_extracted,
                    chunks_completed: 0,
                    current_chunk: 0,
                },
            )?;
            jobs::transition_job_status(&conn, &job.id, JobStatus::Completed, &now_iso8601())?;

            println!("Index complete!");
            println!("  Files:        {}", stats.files_indexed);
            println!("  Symbols:      {}", stats.symbols_extracted);
            println!("  References:   {}", stats.references_found);
            println!("  Dependencies: {}", stats.dependencies_extracted);

            info!(job_id = %job.id, files = stats.files_indexed, "index job completed");
            Ok(())
        }
        Err(err) => {
            jobs::record_failure(&conn, &job.id, &err.to_string(), &now_iso8601())?;
            Err(err.into())
        }
    }
}
