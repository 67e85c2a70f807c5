//! Tree-sitter grammar table for the four first-class indexable languages.
//! Also carries each language's tags query pair, used by `symbols.rs`.

use indexgraph_core::languages::INDEXABLE_SOURCE_LANGUAGES;

pub const TAG_LANGUAGE_IDS: [&str; 4] = INDEXABLE_SOURCE_LANGUAGES;

pub struct TagLanguageSpec {
    pub language: tree_sitter::Language,
    pub tags_query: &'static str,
    pub locals_query: &'static str,
}

pub fn tag_language_spec(language: &str) -> Option<TagLanguageSpec> {
    match language {
        "rust" => Some(TagLanguageSpec {
            language: tree_sitter_rust::LANGUAGE.into(),
            tags_query: tree_sitter_rust::TAGS_QUERY,
            locals_query: "",
        }),
        "typescript" => Some(TagLanguageSpec {
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            tags_query: tree_sitter_typescript::TAGS_QUERY,
            locals_query: tree_sitter_typescript::LOCALS_QUERY,
        }),
        "python" => Some(TagLanguageSpec {
            language: tree_sitter_python::LANGUAGE.into(),
            tags_query: tree_sitter_python::TAGS_QUERY,
            locals_query: "",
        }),
        "go" => Some(TagLanguageSpec {
            language: tree_sitter_go::LANGUAGE.into(),
            tags_query: tree_sitter_go::TAGS_QUERY,
            locals_query: "",
        }),
        _ => None,
    }
}

pub fn parser_language(language: &str) -> Option<tree_sitter::Language> {
    tag_language_spec(language).map(|spec| spec.language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_language_ids_match_indexable_set() {
        assert_eq!(TAG_LANGUAGE_IDS, INDEXABLE_SOURCE_LANGUAGES);
    }

    #[test]
    fn unsupported_language_has_no_spec() {
        assert!(tag_language_spec("ruby").is_none());
    }
}
