//! C3 AST parser adapter: `parse(content, language) -> Option<Tree>`.
//!
//! Parse errors never abort the pipeline — a file that fails to parse still
//! has its content stored, just with no symbols or references.

use crate::language_grammars;
use indexgraph_core::error::ParseError;
use indexgraph_core::languages::is_indexable_source_language;

/// Parse `source` as `language`. Returns `Err` for grammar-less languages or
/// when tree-sitter itself fails to set the language; callers treat this as
/// "no symbols, file still stored", never as a hard failure.
pub fn parse_file(source: &str, language: &str) -> Result<tree_sitter::Tree, ParseError> {
    let ts_language =
        language_grammars::parser_language(language).ok_or_else(|| ParseError::GrammarNotAvailable {
            language: language.to_string(),
        })?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|_| ParseError::GrammarNotAvailable {
            language: language.to_string(),
        })?;

    parser
        .parse(source, None)
        .ok_or_else(|| ParseError::TreeSitterFailed {
            path: language.to_string(),
        })
}

/// Whether `language` has both a tree-sitter grammar and symbol/reference
/// extraction support (the first-class, AST-capable set).
pub fn is_supported_for_ast(language: &str) -> bool {
    is_indexable_source_language(language)
}

pub fn supported_languages() -> &'static [&'static str] {
    &language_grammars::TAG_LANGUAGE_IDS
}
