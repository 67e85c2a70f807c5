/// Canonical list of first-class indexable source languages — the set C3
/// has a tree-sitter grammar for and C4/C5 can extract symbols/references
/// from.
pub const INDEXABLE_SOURCE_LANGUAGES: [&str; 4] = ["rust", "typescript", "python", "go"];

/// Returns true if the language has full parser/extractor support.
pub fn is_indexable_source_language(language: &str) -> bool {
    INDEXABLE_SOURCE_LANGUAGES.contains(&language)
}

/// Returns the canonical first-class source language list.
pub fn supported_indexable_languages() -> &'static [&'static str] {
    &INDEXABLE_SOURCE_LANGUAGES
}

/// Detect language from a (lower-cased, no-dot) file extension.
///
/// The returned language can be broader than the indexable set: the walker
/// (C1) uses this to decide whether a file is "supported" for content
/// storage at all, while C3 narrows further to AST-capable languages.
pub fn detect_language_from_extension(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "vue" => "vue",
        "svelte" => "svelte",
        "json" => "json",
        _ => "unknown",
    }
}
