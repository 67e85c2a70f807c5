//! C6 path-alias resolver: turns an import string into a repo-relative path
//! that exists in the current file set, following a tsconfig-style
//! `compilerOptions.paths` table with an `extends` chain.

use indexgraph_core::constants::{
    CONFIG_DISCOVERY_DEPTH, MAX_EXTENDS_DEPTH, PRIMARY_CONFIG_FILE_NAME,
    RESOLVER_EXTENSION_CANDIDATES, RESOLVER_INDEX_FILE_CANDIDATES, SECONDARY_CONFIG_FILE_NAME,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    extends: Option<String>,
    #[serde(rename = "compilerOptions")]
    compiler_options: Option<RawCompilerOptions>,
}

#[derive(Debug, Deserialize, Default)]
struct RawCompilerOptions {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    paths: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default)]
pub struct PathMappings {
    pub base_url: String,
    pub paths: HashMap<String, Vec<String>>,
    pub tsconfig_dir: String,
}

/// Discover and resolve a project config for `repo_root`, following its
/// `extends` chain (child keys win over parent keys). Returns `None` when no
/// config exists or any config in the chain fails to parse; relative-import
/// resolution still works without mappings.
pub fn discover_mappings(repo_root: &Path) -> Option<PathMappings> {
    let config_path = find_config_file(repo_root, 0)?;
    let config_dir = config_path.parent().unwrap_or(repo_root).to_path_buf();
    let merged = load_config_chain(&config_path, 0).ok()?;

    let compiler_options = merged.compiler_options.unwrap_or_default();
    Some(PathMappings {
        base_url: compiler_options.base_url.unwrap_or_default(),
        paths: compiler_options.paths.unwrap_or_default(),
        tsconfig_dir: config_dir.to_string_lossy().replace('\\', "/"),
    })
}

fn find_config_file(dir: &Path, depth: u32) -> Option<PathBuf> {
    for name in [PRIMARY_CONFIG_FILE_NAME, SECONDARY_CONFIG_FILE_NAME] {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if depth >= CONFIG_DISCOVERY_DEPTH {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| {
            !indexgraph_core::constants::BUILTIN_IGNORE_DIRS.contains(
                &p.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            )
        })
        .collect();
    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_config_file(&subdir, depth + 1) {
            return Some(found);
        }
    }
    None
}

/// Parse `path` and recursively merge its `extends` parent, child values
/// overriding the parent's. Returns `Err` on any parse failure in the chain.
fn load_config_chain(path: &Path, depth: u32) -> Result<RawConfig, ()> {
    if depth >= MAX_EXTENDS_DEPTH {
        return Err(());
    }
    let text = std::fs::read_to_string(path).map_err(|_| ())?;
    let config: RawConfig = serde_json::from_str(&text).map_err(|_| ())?;

    let Some(extends) = config.extends.clone() else {
        return Ok(config);
    };

    let parent_path = resolve_extends_path(path, &extends);
    let parent = load_config_chain(&parent_path, depth + 1)?;
    Ok(merge_configs(parent, config))
}

fn resolve_extends_path(current: &Path, extends: &str) -> PathBuf {
    let dir = current.parent().unwrap_or(Path::new("."));
    let mut candidate = dir.join(extends);
    if candidate.extension().is_none() {
        candidate.set_extension("json");
    }
    candidate
}

fn merge_configs(parent: RawConfig, child: RawConfig) -> RawConfig {
    let parent_opts = parent.compiler_options.unwrap_or_default();
    let child_opts = child.compiler_options.unwrap_or_default();

    let base_url = child_opts.base_url.or(parent_opts.base_url);
    let mut paths = parent_opts.paths.unwrap_or_default();
    if let Some(child_paths) = child_opts.paths {
        for (pattern, candidates) in child_paths {
            paths.insert(pattern, candidates);
        }
    }

    RawConfig {
        extends: child.extends,
        compiler_options: Some(RawCompilerOptions { base_url, paths: Some(paths) }),
    }
}

enum PatternKind<'a> {
    Exact,
    Wildcard { prefix: &'a str, suffix: &'a str },
}

fn classify_pattern(pattern: &str) -> Option<PatternKind<'_>> {
    match pattern.find('*') {
        None => Some(PatternKind::Exact),
        Some(star_idx) => {
            let prefix = &pattern[..star_idx];
            let suffix = &pattern[star_idx + 1..];
            if prefix.is_empty() {
                None
            } else {
                Some(PatternKind::Wildcard { prefix, suffix })
            }
        }
    }
}

fn matched_suffix<'a>(pattern: &PatternKind<'_>, import_string: &'a str) -> Option<&'a str> {
    match pattern {
        PatternKind::Exact => Some(""),
        PatternKind::Wildcard { prefix, suffix } => {
            let rest = import_string.strip_prefix(prefix)?;
            if suffix.is_empty() {
                Some(rest)
            } else {
                rest.strip_suffix(suffix)
            }
        }
    }
}

/// Resolve `import_string` (as written in `importing_file_path`) to a
/// repo-relative path present in `file_set`, or `None` for an external
/// module or an unresolved alias.
pub fn resolve_import(
    import_string: &str,
    importing_file_path: &str,
    file_set: &HashSet<String>,
    mappings: Option<&PathMappings>,
) -> Option<String> {
    if import_string.starts_with('.') {
        let importing_dir = Path::new(importing_file_path).parent().unwrap_or(Path::new(""));
        let joined = importing_dir.join(import_string);
        return probe_candidates(&normalize(&joined), file_set);
    }

    let mappings = mappings?;
    if import_string == mappings.base_url {
        // not a real case, falls through to pattern matching below
    }

    let mut best: Option<String> = None;
    let mut sorted_patterns: Vec<&String> = mappings.paths.keys().collect();
    sorted_patterns.sort();
    for pattern in sorted_patterns {
        let Some(kind) = classify_pattern(pattern) else { continue };
        let Some(suffix) = matched_suffix(&kind, import_string) else { continue };
        let candidates = &mappings.paths[pattern];
        for candidate_template in candidates {
            let substituted = candidate_template.replace('*', suffix);
            let joined = Path::new(&mappings.tsconfig_dir).join(&mappings.base_url).join(&substituted);
            let resolved = normalize(&joined);
            if let Some(hit) = probe_candidates(&resolved, file_set) {
                best = Some(hit);
                break;
            }
        }
        if best.is_some() {
            break;
        }
    }
    best
}

fn normalize(path: &Path) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.to_string_lossy().replace('\\', "/").split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn substituted_extension_candidate(ext: &str) -> Option<&'static str> {
    match ext {
        "js" => Some("ts"),
        "jsx" => Some("tsx"),
        "mjs" => Some("mts"),
        "cjs" => Some("cts"),
        _ => None,
    }
}

fn probe_candidates(resolved: &str, file_set: &HashSet<String>) -> Option<String> {
    if file_set.contains(resolved) {
        return Some(resolved.to_string());
    }

    let path = Path::new(resolved);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if RESOLVER_EXTENSION_CANDIDATES.contains(&ext) {
            if let Some(alt_ext) = substituted_extension_candidate(ext) {
                let alt = format!("{}.{}", &resolved[..resolved.len() - ext.len() - 1], alt_ext);
                if file_set.contains(&alt) {
                    return Some(alt);
                }
            }
        }
    } else {
        for ext in RESOLVER_EXTENSION_CANDIDATES {
            let candidate = format!("{resolved}.{ext}");
            if file_set.contains(&candidate) {
                return Some(candidate);
            }
        }
    }

    for index_file in RESOLVER_INDEX_FILE_CANDIDATES {
        let candidate = if resolved.is_empty() {
            (*index_file).to_string()
        } else {
            format!("{resolved}/{index_file}")
        };
        if file_set.contains(&candidate) {
            return Some(candidate);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn exact_pattern_matches_only_identical_import() {
        let mut paths = HashMap::new();
        paths.insert("config".to_string(), vec!["src/config/index".to_string()]);
        let mappings = PathMappings { base_url: String::new(), paths, tsconfig_dir: String::new() };
        let file_set = files(&["src/config/index.ts"]);
        assert_eq!(
            resolve_import("config", "src/app.ts", &file_set, Some(&mappings)),
            Some("src/config/index.ts".to_string())
        );
        assert_eq!(resolve_import("config/x", "src/app.ts", &file_set, Some(&mappings)), None);
    }

    #[test]
    fn wildcard_pattern_substitutes_matched_suffix() {
        let mut paths = HashMap::new();
        paths.insert("@app/*".to_string(), vec!["src/*".to_string()]);
        let mappings = PathMappings { base_url: String::new(), paths, tsconfig_dir: String::new() };
        let file_set = files(&["src/utils/math.ts"]);
        assert_eq!(
            resolve_import("@app/utils/math", "src/entry.ts", &file_set, Some(&mappings)),
            Some("src/utils/math.ts".to_string())
        );
    }

    #[test]
    fn wildcard_only_pattern_is_rejected() {
        assert!(classify_pattern("*").is_none());
    }

    #[test]
    fn relative_import_resolves_against_importing_directory() {
        let file_set = files(&["src/feature/helper.ts"]);
        assert_eq!(
            resolve_import("./helper", "src/feature/index.ts", &file_set, None),
            Some("src/feature/helper.ts".to_string())
        );
    }

    #[test]
    fn relative_import_falls_back_to_index_file() {
        let file_set = files(&["src/feature/index.ts"]);
        assert_eq!(
            resolve_import("./feature", "src/index.ts", &file_set, None),
            Some("src/feature/index.ts".to_string())
        );
    }

    #[test]
    fn non_relative_unmapped_import_is_external() {
        let file_set = files(&["src/index.ts"]);
        assert_eq!(resolve_import("lodash", "src/index.ts", &file_set, None), None);
    }

    #[test]
    fn extends_chain_merges_child_over_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("base.json"),
            r#"{"compilerOptions":{"baseUrl":".","paths":{"@base/*":["shared/*"]}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"extends":"./base","compilerOptions":{"paths":{"@app/*":["src/*"]}}}"#,
        )
        .unwrap();

        let mappings = discover_mappings(dir.path()).expect("mappings discovered");
        assert!(mappings.paths.contains_key("@app/*"));
        assert!(mappings.paths.contains_key("@base/*"));
    }

    #[test]
    fn missing_config_yields_no_mappings() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_mappings(dir.path()).is_none());
    }
}
