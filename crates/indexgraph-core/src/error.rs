use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("tree-sitter parse failed: {path}")]
    TreeSitterFailed { path: String },

    #[error("grammar not available: {language}")]
    GrammarNotAvailable { language: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("not a git repository: {path}")]
    NotGitRepo { path: String },

    #[error("git error: {0}")]
    GitError(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job transition rejected: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("corrupt deletion manifest: {0}")]
    CorruptManifest(String),

    #[error("schema migration required: current={current}, required={required}")]
    SchemaMigrationRequired { current: u32, required: u32 },
}

impl StateError {
    /// Convenience constructor for SQLite errors — use with `.map_err(StateError::sqlite)`.
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }
}

/// Canonical "not found" error used by access-controlled lookups.
///
/// `get_job` and friends must never distinguish "absent" from "no access" —
/// both surface as this single variant to avoid existence leakage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("not found: {kind} {id}")]
    NotFound { kind: String, id: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watcher backend error: {0}")]
    Backend(String),
}
