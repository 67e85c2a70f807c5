//! C1 source walker: a deterministic, sorted listing of indexable source
//! files under a repository root.

use globset::{Glob, GlobSet, GlobSetBuilder};
use indexgraph_core::constants::{BUILTIN_IGNORE_DIRS, MAX_FILE_SIZE};
use indexgraph_core::languages::detect_language_from_extension;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

pub const IGNORE_FILE: &str = ".indexgraphignore";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub language: String,
}

fn builtin_ignore_globs() -> &'static GlobSet {
    static GLOBS: OnceLock<GlobSet> = OnceLock::new();
    GLOBS.get_or_init(|| {
        let mut builder = GlobSetBuilder::new();
        for pattern in ["*.lock", "*.min.js", "*.map"] {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
    })
}

/// Walk `repo_root`, returning every file whose extension is in
/// `extensions` (lower-cased, no leading dot) and whose size does not
/// exceed `max_file_size`. Output is sorted by relative path for a
/// deterministic, snapshot-independent result.
pub fn scan_directory_filtered(
    repo_root: &Path,
    max_file_size: u64,
    extensions: &[String],
) -> Vec<ScannedFile> {
    let mut files = Vec::new();
    let ignore_globs = builtin_ignore_globs();

    let mut walker = WalkBuilder::new(repo_root);
    walker
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .add_custom_ignore_filename(IGNORE_FILE)
        .filter_entry(|entry| {
            !entry
                .file_name()
                .to_str()
                .map(|name| BUILTIN_IGNORE_DIRS.contains(&name))
                .unwrap_or(false)
        });

    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "failed to read directory entry during scan");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        if ignore_globs.is_match(path) {
            continue;
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext_lower = ext.to_lowercase();
        if !extensions.iter().any(|allowed| allowed == &ext_lower) {
            continue;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to stat file during scan");
                continue;
            }
        };
        if metadata.len() > max_file_size {
            warn!(path = %path.display(), size = metadata.len(), "skipping oversized file");
            continue;
        }

        let Ok(relative) = path.strip_prefix(repo_root) else {
            continue;
        };
        let relative_path = relative.to_string_lossy().replace('\\', "/");
        let language = detect_language_from_extension(&ext_lower).to_string();

        files.push(ScannedFile {
            path: path.to_path_buf(),
            relative_path,
            language,
        });
    }

    files.sort_unstable_by(|a, b| a.relative_path.cmp(&b.relative_path));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        vec!["rs".to_string(), "ts".to_string()]
    }

    #[test]
    fn scan_is_sorted_and_filters_by_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("a.ts"), "const x = 1;").unwrap();
        fs::write(dir.path().join("skip.md"), "# hi").unwrap();

        let files = scan_directory_filtered(dir.path(), MAX_FILE_SIZE, &extensions());
        let names: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.ts", "b.rs"]);
    }

    #[test]
    fn scan_skips_builtin_ignored_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.ts"), "export {}").unwrap();
        fs::write(dir.path().join("keep.ts"), "export {}").unwrap();

        let files = scan_directory_filtered(dir.path(), MAX_FILE_SIZE, &extensions());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "keep.ts");
    }

    #[test]
    fn scan_skips_oversized_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.rs"), "x".repeat(100)).unwrap();

        let files = scan_directory_filtered(dir.path(), 10, &extensions());
        assert!(files.is_empty());
    }

    #[test]
    fn scan_detects_language_from_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();

        let files = scan_directory_filtered(dir.path(), MAX_FILE_SIZE, &extensions());
        assert_eq!(files[0].language, "rust");
    }
}
