/// Current schema version for SQLite tables.
pub const SCHEMA_VERSION: u32 = 1;

/// Current parser version for tree-sitter extraction.
pub const PARSER_VERSION: u32 = 1;

/// Maximum file size to index (1MB). Larger files are skipped with a warning.
pub const MAX_FILE_SIZE: u64 = 1_048_576;

/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".indexgraph";

/// Project config file name (repo-relative).
pub const PROJECT_CONFIG_FILE: &str = ".indexgraph/config.toml";

/// Stable id hash version prefix.
pub const STABLE_ID_VERSION: &str = "stable_id:v1";

/// SQLite database file name.
pub const STATE_DB_FILE: &str = "state.db";

/// Default directory (repo-relative) that sync export/import operates under.
pub const SYNC_EXPORT_DIR: &str = ".indexgraph/export";

/// Deletion manifest file name, relative to the export directory.
pub const DELETION_MANIFEST_FILE: &str = ".deletions.jsonl";

/// Default number of files per pass-1 write chunk.
pub const DEFAULT_FILE_WRITE_CHUNK_SIZE: usize = 500;

/// Default page size when querying files back after pass 1.
pub const DEFAULT_FILE_QUERY_BATCH_SIZE: usize = 1000;

/// Default number of file ids per symbol query batch (keeps URIs bounded).
pub const DEFAULT_SYMBOL_QUERY_BATCH_SIZE: usize = 200;

/// Default debounce interval for the source watcher, in milliseconds.
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;

/// Default worker pool size.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// tsconfig-style `extends` chain depth cap.
pub const MAX_EXTENDS_DEPTH: u32 = 10;

/// Recursive subdirectory depth when scanning for a project config.
pub const CONFIG_DISCOVERY_DEPTH: u32 = 3;

/// Recognized primary project config file name (typed, e.g. tsconfig.json).
pub const PRIMARY_CONFIG_FILE_NAME: &str = "tsconfig.json";

/// Recognized secondary project config file name (untyped fallback).
pub const SECONDARY_CONFIG_FILE_NAME: &str = "jsconfig.json";

/// Extension candidates probed by the path-alias resolver, in order.
pub const RESOLVER_EXTENSION_CANDIDATES: &[&str] =
    &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Index-file fallback candidates probed by the path-alias resolver, in order.
pub const RESOLVER_INDEX_FILE_CANDIDATES: &[&str] =
    &["index.ts", "index.tsx", "index.js", "index.jsx"];

/// Default queue retry policy: max attempts.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default queue retry policy: initial backoff delay (seconds).
pub const DEFAULT_RETRY_INITIAL_DELAY_SECS: u64 = 60;

/// Default queue retry policy: backoff multiplier between attempts.
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Built-in ignored directory basenames (exact match).
pub const BUILTIN_IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "out",
    "target",
    ".cache",
    ".next",
    ".nuxt",
    ".output",
    ".parcel-cache",
    ".svelte-kit",
    ".turbo",
    ".vercel",
    ".vite",
    "coverage",
    "__pycache__",
    ".pytest_cache",
    "venv",
    ".venv",
    "env",
    "vendor",
];

/// Default watched/indexable extensions (without the leading dot).
pub const DEFAULT_WATCHED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "java", "kt", "swift", "c", "cpp",
    "h", "hpp", "cs", "rb", "php", "vue", "svelte",
];
