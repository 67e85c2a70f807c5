use indexgraph_core::error::StateError;
use rusqlite::Connection;
use tracing::info;

/// Current schema version. Bump when adding a migration step.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Create all tables and run any pending migrations.
pub fn create_tables(conn: &Connection) -> Result<(), StateError> {
    conn.execute_batch(SCHEMA_SQL).map_err(StateError::sqlite)?;
    migrate(conn)?;
    info!(version = CURRENT_SCHEMA_VERSION, "schema ready");
    Ok(())
}

/// Run incremental schema migrations up to `CURRENT_SCHEMA_VERSION`, tracked
/// in `schema_migrations`.
pub fn migrate(conn: &Connection) -> Result<(), StateError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(StateError::sqlite)?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(StateError::sqlite)?;

    type MigrationFn = fn(&Connection) -> Result<(), StateError>;

    // V1 is the baseline schema created by SCHEMA_SQL; no DDL needed here.
    let migrations: &[MigrationFn] = &[|_conn| Ok(())];

    for version in (current + 1)..=CURRENT_SCHEMA_VERSION {
        let idx = (version - 1) as usize;
        if idx < migrations.len() {
            migrations[idx](conn)?;
        }
        conn.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(StateError::sqlite)?;
        info!(version, "applied schema migration");
    }

    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL UNIQUE,
    default_ref TEXT NOT NULL DEFAULT 'main',
    installation_id TEXT,
    owner_kind TEXT NOT NULL,
    owner_ref TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS indexed_files (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL REFERENCES repositories(id),
    path TEXT NOT NULL,
    content TEXT NOT NULL,
    language TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(repository_id, path)
);

CREATE INDEX IF NOT EXISTS idx_indexed_files_repo
    ON indexed_files(repository_id);
CREATE INDEX IF NOT EXISTS idx_indexed_files_repo_hash
    ON indexed_files(repository_id, content_hash);

CREATE TABLE IF NOT EXISTS symbols (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES indexed_files(id),
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    signature TEXT,
    documentation TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

CREATE TABLE IF NOT EXISTS "references" (
    id TEXT PRIMARY KEY,
    source_file_id TEXT NOT NULL REFERENCES indexed_files(id),
    target_symbol_key TEXT,
    target_file_id TEXT,
    line_number INTEGER NOT NULL,
    column_number INTEGER NOT NULL,
    reference_type TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_references_source ON "references"(source_file_id);
CREATE INDEX IF NOT EXISTS idx_references_target_symbol ON "references"(target_symbol_key);

CREATE TABLE IF NOT EXISTS dependency_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_file_id TEXT,
    to_file_id TEXT,
    from_symbol_id TEXT,
    to_symbol_id TEXT,
    dependency_type TEXT NOT NULL,
    confidence TEXT NOT NULL DEFAULT 'high',
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(from_file_id, to_file_id, from_symbol_id, to_symbol_id, dependency_type)
);

CREATE INDEX IF NOT EXISTS idx_dependency_edges_from_file
    ON dependency_edges(from_file_id, dependency_type);
CREATE INDEX IF NOT EXISTS idx_dependency_edges_to_file
    ON dependency_edges(to_file_id, dependency_type);
CREATE INDEX IF NOT EXISTS idx_dependency_edges_from_symbol
    ON dependency_edges(from_symbol_id, dependency_type);
CREATE INDEX IF NOT EXISTS idx_dependency_edges_to_symbol
    ON dependency_edges(to_symbol_id, dependency_type);

CREATE TABLE IF NOT EXISTS index_jobs (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL REFERENCES repositories(id),
    "ref" TEXT NOT NULL,
    commit_sha TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    started_at TEXT,
    completed_at TEXT,
    error_message TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    files_indexed INTEGER NOT NULL DEFAULT 0,
    symbols_extracted INTEGER NOT NULL DEFAULT 0,
    references_found INTEGER NOT NULL DEFAULT 0,
    dependencies_extracted INTEGER NOT NULL DEFAULT 0,
    chunks_completed INTEGER NOT NULL DEFAULT 0,
    current_chunk INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_index_jobs_repo_status
    ON index_jobs(repository_id, status, created_at DESC);
"#;
