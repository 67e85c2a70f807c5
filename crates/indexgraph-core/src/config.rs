use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_file_write_chunk_size")]
    pub file_write_chunk_size: usize,
    #[serde(default = "default_file_query_batch_size")]
    pub file_query_batch_size: usize,
    #[serde(default = "default_symbol_query_batch_size")]
    pub symbol_query_batch_size: usize,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_tsconfig_discovery_depth")]
    pub tsconfig_discovery_depth: u32,
    #[serde(default = "default_extends_depth")]
    pub extends_depth: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            languages: default_languages(),
            file_write_chunk_size: default_file_write_chunk_size(),
            file_query_batch_size: default_file_query_batch_size(),
            symbol_query_batch_size: default_symbol_query_batch_size(),
            worker_count: default_worker_count(),
            tsconfig_discovery_depth: default_tsconfig_discovery_depth(),
            extends_depth: default_extends_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout_ms: default_busy_timeout(),
            cache_size: default_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_watched_extensions")]
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            extensions: default_watched_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_file_size() -> u64 {
    constants::MAX_FILE_SIZE
}
fn default_languages() -> Vec<String> {
    crate::languages::supported_indexable_languages()
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_file_write_chunk_size() -> usize {
    constants::DEFAULT_FILE_WRITE_CHUNK_SIZE
}
fn default_file_query_batch_size() -> usize {
    constants::DEFAULT_FILE_QUERY_BATCH_SIZE
}
fn default_symbol_query_batch_size() -> usize {
    constants::DEFAULT_SYMBOL_QUERY_BATCH_SIZE
}
fn default_worker_count() -> usize {
    constants::DEFAULT_WORKER_COUNT
}
fn default_tsconfig_discovery_depth() -> u32 {
    constants::CONFIG_DISCOVERY_DEPTH
}
fn default_extends_depth() -> u32 {
    constants::MAX_EXTENDS_DEPTH
}
fn default_data_dir() -> String {
    constants::DEFAULT_DATA_DIR.to_string()
}
fn default_busy_timeout() -> u32 {
    5000
}
fn default_cache_size() -> i32 {
    -64000
}
fn default_debounce_ms() -> u64 {
    constants::DEFAULT_WATCH_DEBOUNCE_MS
}
fn default_watched_extensions() -> Vec<String> {
    constants::DEFAULT_WATCHED_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration with three-layer precedence:
    /// 1. Explicit config file (highest priority)
    /// 2. Project config: `<repo_root>/.indexgraph/config.toml`
    /// 3. Global config: `~/.indexgraph/config.toml`
    /// 4. Built-in defaults (lowest priority)
    ///
    /// Only fields explicitly set in a higher-priority file override lower
    /// layers — achieved by merging raw TOML values before deserializing,
    /// rather than deserializing each layer independently.
    pub fn load(repo_root: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_file(repo_root, None)
    }

    pub fn load_with_file(
        repo_root: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(constants::DEFAULT_DATA_DIR).join("config.toml");
            if global_path.exists() {
                merge_toml_values(&mut merged, &load_toml_value(&global_path)?);
            }
        }

        if let Some(root) = repo_root {
            let project_path = root.join(constants::PROJECT_CONFIG_FILE);
            if project_path.exists() {
                merge_toml_values(&mut merged, &load_toml_value(&project_path)?);
            }
        }

        if let Some(cf) = config_file {
            merge_toml_values(&mut merged, &load_toml_value(cf)?);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Resolve `<data_dir>/data/<repository_id>` — the per-repository store
    /// directory under which `state.db` and export output live.
    pub fn repository_data_dir(&self, repository_id: &str) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
            .join("data")
            .join(repository_id)
    }
}

fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            match base_map.get_mut(key) {
                Some(base_val) if base_val.is_table() && overlay_val.is_table() => {
                    merge_toml_values(base_val, overlay_val);
                }
                Some(base_val) => *base_val = overlay_val.clone(),
                None => {
                    base_map.insert(key.clone(), overlay_val.clone());
                }
            }
        }
    }
}

/// Environment variable overrides: `INDEXGRAPH_<SECTION>_<KEY>`.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("INDEXGRAPH_INDEX_WORKER_COUNT")
        && let Ok(parsed) = v.parse()
    {
        config.index.worker_count = parsed;
    }
    if let Ok(v) = std::env::var("INDEXGRAPH_WATCH_DEBOUNCE_MS")
        && let Ok(parsed) = v.parse()
    {
        config.watch.debounce_ms = parsed;
    }
    if let Ok(v) = std::env::var("INDEXGRAPH_STORAGE_DATA_DIR") {
        config.storage.data_dir = v;
    }
    if let Ok(v) = std::env::var("INDEXGRAPH_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_populated_without_any_config_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.index.file_write_chunk_size, 500);
        assert_eq!(config.index.worker_count, 3);
        assert_eq!(config.watch.debounce_ms, 500);
    }

    #[test]
    fn project_config_overrides_only_its_own_fields() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".indexgraph")).unwrap();
        std::fs::write(
            dir.path().join(".indexgraph/config.toml"),
            "[index]\nworker_count = 7\n",
        )
        .unwrap();

        let config = Config::load(Some(dir.path())).unwrap();
        assert_eq!(config.index.worker_count, 7);
        // Untouched field keeps its default.
        assert_eq!(config.index.file_write_chunk_size, 500);
    }

    #[test]
    fn repository_data_dir_is_scoped_per_repository() {
        let config = Config::default();
        let dir = config.repository_data_dir("abc123");
        assert!(dir.ends_with("abc123"));
    }
}
