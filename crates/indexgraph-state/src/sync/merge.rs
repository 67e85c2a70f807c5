//! Three-way merge of a single table's JSONL export file. `base` is
//! accepted for symmetry with the BASE/OURS/THEIRS framing but the
//! resolution rule is deliberately simple: THEIRS wins whenever it has the
//! id, otherwise OURS, and the result is sorted by id for a deterministic
//! diff.

use indexgraph_core::error::StateError;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Merge one table's BASE/OURS/THEIRS JSONL content and return the merged
/// JSONL text, lines sorted by id.
pub fn merge_table(base: &str, ours: &str, theirs: &str) -> Result<String, StateError> {
    // Tokenized for parity with the BASE/OURS/THEIRS framing; the
    // resolution rule below never reads ids unique to base alone.
    let _base_by_id = tokenize(base)?;
    let ours_by_id = tokenize(ours)?;
    let theirs_by_id = tokenize(theirs)?;

    let mut merged: BTreeMap<String, Value> = ours_by_id;
    for (id, value) in theirs_by_id {
        merged.insert(id, value);
    }

    let mut out = String::new();
    for value in merged.values() {
        out.push_str(&serde_json::to_string(value).map_err(|e| StateError::CorruptManifest(e.to_string()))?);
        out.push('\n');
    }
    Ok(out)
}

fn tokenize(jsonl: &str) -> Result<BTreeMap<String, Value>, StateError> {
    let mut by_id = BTreeMap::new();
    for (line_no, line) in jsonl.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).map_err(|e| StateError::CorruptManifest(e.to_string()))?;
        match value.get("id") {
            Some(id) => {
                by_id.insert(id_to_key(id), value);
            }
            None => warn!(line = line_no, "dropping record with no id field during merge"),
        }
    }
    Ok(by_id)
}

fn id_to_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theirs_wins_over_ours_for_shared_id() {
        let base = "{\"id\":\"a\",\"v\":0}\n";
        let ours = "{\"id\":\"a\",\"v\":1}\n";
        let theirs = "{\"id\":\"a\",\"v\":2}\n";

        let merged = merge_table(base, ours, theirs).unwrap();
        assert!(merged.contains("\"v\":2"));
        assert!(!merged.contains("\"v\":1"));
    }

    #[test]
    fn ids_only_in_ours_are_kept() {
        let ours = "{\"id\":\"a\",\"v\":1}\n{\"id\":\"b\",\"v\":2}\n";
        let theirs = "{\"id\":\"a\",\"v\":9}\n";

        let merged = merge_table("", ours, theirs).unwrap();
        assert!(merged.contains("\"id\":\"b\""));
        assert!(merged.contains("\"v\":9"));
    }

    #[test]
    fn output_is_sorted_by_id() {
        let ours = "{\"id\":\"c\"}\n{\"id\":\"a\"}\n{\"id\":\"b\"}\n";
        let merged = merge_table("", ours, "").unwrap();
        let ids: Vec<&str> = merged
            .lines()
            .map(|l| l.split("\"id\":\"").nth(1).unwrap().split('"').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn lines_missing_id_are_dropped() {
        let ours = "{\"v\":1}\n{\"id\":\"a\",\"v\":2}\n";
        let merged = merge_table("", ours, "").unwrap();
        assert_eq!(merged.lines().count(), 1);
        assert!(merged.contains("\"id\":\"a\""));
    }

    #[test]
    fn integer_ids_are_tokenized_correctly() {
        let ours = "{\"id\":1,\"v\":\"x\"}\n";
        let theirs = "{\"id\":1,\"v\":\"y\"}\n";
        let merged = merge_table("", ours, theirs).unwrap();
        assert!(merged.contains("\"v\":\"y\""));
    }
}
