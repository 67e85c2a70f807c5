//! C2 file reader: UTF-8 content loading and the closed extension→language
//! mapping, shared with the walker.

use crate::walker::ScannedFile;
use indexgraph_core::types::compute_content_hash;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ReadFile {
    pub relative_path: String,
    pub content: String,
    pub size_bytes: u64,
    pub language: String,
    pub content_hash: String,
}

/// Read a scanned file's content as UTF-8. Decode failures are skipped with
/// a warning, never fatal to the surrounding pipeline.
pub fn read_file(scanned: &ScannedFile) -> Option<ReadFile> {
    let bytes = match std::fs::read(&scanned.path) {
        Ok(b) => b,
        Err(err) => {
            warn!(path = %scanned.path.display(), error = %err, "failed to read file");
            return None;
        }
    };
    let size_bytes = bytes.len() as u64;

    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => {
            warn!(path = %scanned.path.display(), "skipping file with non-UTF-8 content");
            return None;
        }
    };

    let content_hash = compute_content_hash(&content);
    Some(ReadFile {
        relative_path: scanned.relative_path.clone(),
        content,
        size_bytes,
        language: scanned.language.clone(),
        content_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn read_file_succeeds_for_utf8_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rs");
        fs::write(&path, "fn main() {}").unwrap();

        let scanned = ScannedFile {
            path: path.clone(),
            relative_path: "a.rs".to_string(),
            language: "rust".to_string(),
        };
        let read = read_file(&scanned).expect("read");
        assert_eq!(read.content, "fn main() {}");
        assert_eq!(read.size_bytes, 12);
    }

    #[test]
    fn read_file_skips_non_utf8_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bin.rs");
        fs::write(&path, [0xff, 0xfe, 0x00, 0xff]).unwrap();

        let scanned = ScannedFile {
            path,
            relative_path: "bin.rs".to_string(),
            language: "rust".to_string(),
        };
        assert!(read_file(&scanned).is_none());
    }

    #[test]
    fn read_file_skips_missing_path() {
        let scanned = ScannedFile {
            path: PathBuf::from("/nonexistent/does-not-exist.rs"),
            relative_path: "does-not-exist.rs".to_string(),
            language: "rust".to_string(),
        };
        assert!(read_file(&scanned).is_none());
    }
}
