//! The append-only deletion manifest (`.deletions.jsonl`). Records are
//! appended as deletions happen; import applies and then truncates them.
//! Truncation is a write-temp-then-rename so a crash leaves either the full
//! manifest or the empty one, never a half-written file.

use indexgraph_core::error::StateError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionEntry {
    pub table: String,
    pub id: String,
    pub deleted_at: String,
}

/// Append one deletion record. Safe to call even if the manifest file does
/// not exist yet.
pub fn append(manifest_path: &Path, entry: &DeletionEntry) -> Result<(), StateError> {
    if let Some(parent) = manifest_path.parent() {
        std::fs::create_dir_all(parent).map_err(StateError::Io)?;
    }
    let line = serde_json::to_string(entry).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(manifest_path)
        .map_err(StateError::Io)?;
    writeln!(file, "{line}").map_err(StateError::Io)?;
    file.sync_all().map_err(StateError::Io)
}

/// Read every entry in the manifest. Returns an empty vec if the file
/// doesn't exist. A corrupt line is reported as [`StateError::CorruptManifest`]
/// rather than silently skipped.
pub fn read_all(manifest_path: &Path) -> Result<Vec<DeletionEntry>, StateError> {
    if !manifest_path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(manifest_path).map_err(StateError::Io)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))
        })
        .collect()
}

/// Clear the manifest after a successful import. Write-temp-then-rename so a
/// crash between the two operations never leaves a partially truncated file.
pub fn truncate(manifest_path: &Path) -> Result<(), StateError> {
    if !manifest_path.exists() {
        return Ok(());
    }
    let tmp_path = manifest_path.with_extension("jsonl.tmp");
    std::fs::File::create(&tmp_path).map_err(StateError::Io)?;
    std::fs::rename(&tmp_path, manifest_path).map_err(StateError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: &str) -> DeletionEntry {
        DeletionEntry {
            table: "indexed_files".to_string(),
            id: id.to_string(),
            deleted_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn read_all_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let entries = read_all(&dir.path().join(".deletions.jsonl")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".deletions.jsonl");
        append(&path, &sample("f1")).unwrap();
        append(&path, &sample("f2")).unwrap();

        let entries = read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "f1");
        assert_eq!(entries[1].id, "f2");
    }

    #[test]
    fn truncate_clears_file_but_keeps_it_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".deletions.jsonl");
        append(&path, &sample("f1")).unwrap();

        truncate(&path).unwrap();

        assert!(path.exists());
        assert!(read_all(&path).unwrap().is_empty());
    }

    #[test]
    fn truncate_on_missing_file_is_a_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".deletions.jsonl");
        truncate(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_line_surfaces_as_corrupt_manifest_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".deletions.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let err = read_all(&path).unwrap_err();
        assert!(matches!(err, StateError::CorruptManifest(_)));
    }
}
