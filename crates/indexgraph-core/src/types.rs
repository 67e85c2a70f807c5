use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tracked source tree, owned by exactly one account or organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub full_name: String,
    pub default_ref: String,
    pub installation_id: Option<String>,
    pub owner: RepositoryOwner,
}

/// Ownership of a Repository: exclusively a user or an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryOwner {
    User { user_id: String },
    Org { org_id: String },
}

/// A persisted snapshot of a file's content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub id: String,
    pub repository_id: String,
    pub path: String,
    pub content: String,
    pub language: String,
    pub size_bytes: u64,
    pub content_hash: String,
    pub indexed_at: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Symbol kinds recognized across the first-class languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Variable,
    Constant,
    Method,
    Property,
    Struct,
    Trait,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::TypeAlias => "type_alias",
            Self::Enum => "enum",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Method => "method",
            Self::Property => "property",
            Self::Struct => "struct",
            Self::Trait => "trait",
            Self::Module => "module",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "type_alias" => Some(Self::TypeAlias),
            "enum" => Some(Self::Enum),
            "variable" => Some(Self::Variable),
            "constant" => Some(Self::Constant),
            "method" => Some(Self::Method),
            "property" => Some(Self::Property),
            "struct" => Some(Self::Struct),
            "trait" => Some(Self::Trait),
            "module" => Some(Self::Module),
            _ => None,
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A definition site inside a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub file_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Use-site reference classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Import,
    Call,
    PropertyAccess,
    TypeReference,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Call => "call",
            Self::PropertyAccess => "property_access",
            Self::TypeReference => "type_reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            "call" => Some(Self::Call),
            "property_access" => Some(Self::PropertyAccess),
            "type_reference" => Some(Self::TypeReference),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A use-site pointing by name at a symbol or an import source.
///
/// At most one of `target_symbol_key`/`target_file_id` is populated once
/// resolution has run; both remain `None` for an unresolved reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub source_file_id: String,
    pub target_symbol_key: Option<String>,
    pub target_file_id: Option<String>,
    pub line_number: u32,
    pub column_number: u32,
    pub reference_type: ReferenceType,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A directed relationship between two files or two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Import,
    ReExport,
    ExportAll,
    Calls,
    ReferencesType,
    PropertyOf,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::ReExport => "re_export",
            Self::ExportAll => "export_all",
            Self::Calls => "calls",
            Self::ReferencesType => "references_type",
            Self::PropertyOf => "property_of",
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence bucket assigned to a dependency edge.
///
/// Not part of spec.md's invariants; added per SPEC_FULL.md §4's
/// supplement, grounded on the teacher's `edge_confidence` treatment of
/// resolved/heuristic/unresolved edges. Defaults to `High` for statically
/// resolved edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeConfidence {
    #[default]
    High,
    Medium,
    Low,
}

impl EdgeConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A directed file-to-file or symbol-to-symbol edge. Exactly one of the two
/// endpoint pairs is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from_file_id: Option<String>,
    pub to_file_id: Option<String>,
    pub from_symbol_id: Option<String>,
    pub to_symbol_id: Option<String>,
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub confidence: EdgeConfidence,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DependencyEdge {
    /// True iff exactly one of (file-pair, symbol-pair) is populated — P3.
    pub fn has_valid_endpoint_shape(&self) -> bool {
        let file_pair = self.from_file_id.is_some() && self.to_file_id.is_some();
        let symbol_pair = self.from_symbol_id.is_some() && self.to_symbol_id.is_some();
        file_pair ^ symbol_pair
    }
}

/// Index job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether `self -> to` is a transition §4.9 allows.
    pub fn allows_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Processing)
                | (
                    JobStatus::Processing,
                    JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
                )
                | (JobStatus::Failed, JobStatus::Processing)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counters recorded against a completed/in-progress job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub files_indexed: u64,
    pub symbols_extracted: u64,
    pub references_found: u64,
    pub dependencies_extracted: u64,
    pub chunks_completed: u64,
    pub current_chunk: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexJob {
    pub id: String,
    pub repository_id: String,
    pub r#ref: String,
    pub commit_sha: Option<String>,
    pub status: JobStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub stats: JobStats,
}

/// Compute a symbol's ref-local id: changes when the symbol moves line.
///
/// Format: `blake3("{repo}|{path}|{kind}|{line_start}|{name}")`.
pub fn compute_symbol_id(repository_id: &str, path: &str, kind: SymbolKind, line_start: u32, name: &str) -> String {
    let input = format!(
        "{}|{}|{}|{}|{}",
        repository_id,
        path,
        kind.as_str(),
        line_start,
        name
    );
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

/// Opaque tie-breaker key for symbol resolution within a file, per spec.md
/// §4.7: `path::name::line_start`.
pub fn symbol_tie_breaker_key(path: &str, name: &str, line_start: u32) -> String {
    format!("{path}::{name}::{line_start}")
}

/// Compute a deterministic, content-addressed hash for file content.
pub fn compute_content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_transitions_match_spec() {
        assert!(JobStatus::Pending.allows_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.allows_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.allows_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.allows_transition_to(JobStatus::Skipped));
        assert!(JobStatus::Failed.allows_transition_to(JobStatus::Processing));

        assert!(!JobStatus::Pending.allows_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.allows_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Skipped.allows_transition_to(JobStatus::Processing));
    }

    #[test]
    fn dependency_edge_endpoint_shape_is_exclusive() {
        let file_edge = DependencyEdge {
            from_file_id: Some("f1".into()),
            to_file_id: Some("f2".into()),
            from_symbol_id: None,
            to_symbol_id: None,
            dependency_type: DependencyType::Import,
            confidence: EdgeConfidence::High,
            metadata: HashMap::new(),
        };
        assert!(file_edge.has_valid_endpoint_shape());

        let both = DependencyEdge {
            from_symbol_id: Some("s1".into()),
            to_symbol_id: Some("s2".into()),
            ..file_edge.clone()
        };
        assert!(!both.has_valid_endpoint_shape());

        let neither = DependencyEdge {
            from_file_id: None,
            to_file_id: None,
            ..file_edge
        };
        assert!(!neither.has_valid_endpoint_shape());
    }

    #[test]
    fn symbol_id_is_deterministic_and_line_sensitive() {
        let a = compute_symbol_id("repo1", "a.ts", SymbolKind::Function, 3, "g");
        let b = compute_symbol_id("repo1", "a.ts", SymbolKind::Function, 3, "g");
        let c = compute_symbol_id("repo1", "a.ts", SymbolKind::Function, 4, "g");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
