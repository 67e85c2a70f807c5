use anyhow::{Context, Result};
use indexgraph_core::config::Config;
use indexgraph_core::constants;
use indexgraph_core::ids::generate_repository_id;
use indexgraph_state::{db, schema};
use std::path::Path;
use std::sync::Arc;

pub fn run(repo_root: &Path, config_file: Option<&Path>) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("failed to resolve repository root")?;
    let repo_root_str = repo_root.to_string_lossy().to_string();

    let config = Config::load_with_file(Some(&repo_root), config_file)?;
    let repository_id = generate_repository_id(&repo_root_str);
    let data_dir = config.repository_data_dir(&repository_id);
    let db_path = data_dir.join(constants::STATE_DB_FILE);
    let manifest_path = data_dir.join(".deletions.jsonl");

    {
        let conn = db::open_connection(&db_path)?;
        schema::create_tables(&conn)?;
    }

    println!("Watching {repo_root_str} for changes (Ctrl-C to stop)...");

    let gate = indexgraph_indexer::incremental::IncrementalGate::new();
    let watch_db_path = db_path.clone();
    let handle = indexgraph_indexer::watcher::watch(
        repository_id,
        repo_root.clone(),
        move || db::open_connection(&watch_db_path),
        manifest_path,
        Arc::clone(&gate),
    )?;

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc_like_wait(tx);
    let _ = rx.recv();

    handle.stop();
    println!("Watcher stopped.");
    Ok(())
}

/// Block until an interrupt signal arrives. The teacher's CLI layer has no
/// existing signal-handling helper to ground this on; a direct `ctrlc`
/// dependency isn't part of the aligned stack, so this blocks on stdin EOF
/// as the simplest portable stop signal for a foreground watch command.
fn ctrlc_like_wait(tx: std::sync::mpsc::Sender<()>) {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf);
        let _ = tx.send(());
    });
}
