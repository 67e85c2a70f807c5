//! C4 symbol extractor: tree-sitter-tags driven definition extraction,
//! generalized across the four first-class languages by a single generic
//! kind-mapper/parent-scope walker rather than one enricher struct per
//! language (the teacher keeps a `LanguageEnricher` trait object per
//! language; folding that into one generic pass covers the same
//! constructs since none of the four languages need bespoke visibility
//! rules beyond a simple per-language convention check).

use crate::tag_registry;
use indexgraph_core::types::{Symbol, SymbolKind};
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;
use tree_sitter_tags::Tag;

#[derive(Debug, Clone)]
pub struct ExtractedSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub column_end: u32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub is_exported: bool,
    pub parent_name: Option<String>,
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolExtractionDiagnostics {
    pub had_parse_error: bool,
}

/// Extract symbols from `tree`/`source` in document order.
pub fn extract_symbols(
    tree: &tree_sitter::Tree,
    source: &str,
    language: &str,
) -> Vec<ExtractedSymbol> {
    extract_symbols_with_diagnostics(tree, source, language).0
}

pub fn extract_symbols_with_diagnostics(
    tree: &tree_sitter::Tree,
    source: &str,
    language: &str,
) -> (Vec<ExtractedSymbol>, SymbolExtractionDiagnostics) {
    let source_bytes = source.as_bytes();

    let (tags, had_parse_error): (Vec<(Tag, String)>, bool) = tag_registry::with_tags(|configs, ctx| {
        let Some(config) = configs.get(language) else {
            return (Vec::new(), false);
        };
        let Ok((iter, has_error)) = ctx.generate_tags(config, source_bytes, None) else {
            return (Vec::new(), true);
        };
        (
            iter.filter_map(|r| r.ok())
                .filter(|t| t.is_definition)
                .map(|t| {
                    let kind_name = config.syntax_type_name(t.syntax_type_id).to_string();
                    (t, kind_name)
                })
                .collect(),
            has_error,
        )
    });

    if had_parse_error {
        debug!(language, "tree-sitter-tags reported parse errors; symbols may be partial");
    }

    let mut symbols: Vec<ExtractedSymbol> = tags
        .iter()
        .filter_map(|(tag, kind_name)| map_tag_to_symbol(tag, kind_name, source, tree, language))
        .collect();
    symbols.sort_by_key(|s| (s.line_start, s.column_start));

    (symbols, SymbolExtractionDiagnostics { had_parse_error })
}

fn map_tag_to_symbol(
    tag: &Tag,
    tag_kind: &str,
    source: &str,
    tree: &tree_sitter::Tree,
    language: &str,
) -> Option<ExtractedSymbol> {
    let name = source.get(tag.name_range.clone())?.to_string();

    let node = tree
        .root_node()
        .descendant_for_byte_range(tag.range.start, tag.range.end);

    let parent_name = node.and_then(|n| find_parent_scope(n, source));
    let has_parent = parent_name.is_some();
    let node_kind = node.map(|n| n.kind());

    let kind = map_tag_kind(tag_kind, has_parent, node_kind)?;

    let separator = separator_for_language(language);
    let qualified_name = match &parent_name {
        Some(p) => format!("{p}{separator}{name}"),
        None => name.clone(),
    };

    let (line_start, line_end, column_start, column_end) = if let Some(n) = node {
        (
            n.start_position().row as u32 + 1,
            n.end_position().row as u32 + 1,
            n.start_position().column as u32,
            n.end_position().column as u32,
        )
    } else {
        (
            tag.span.start.row as u32 + 1,
            tag.span.end.row as u32 + 1,
            tag.span.start.column as u32,
            tag.span.end.column as u32,
        )
    };

    let signature = extract_signature(kind, source, tag.line_range.clone());
    let documentation = node.and_then(|n| extract_leading_doc_comment(n, source, language));
    let visibility = node.and_then(|n| extract_visibility(n, source, language));
    let is_exported = visibility.as_deref() == Some("public")
        || is_capitalized_go_export(language, &name)
        || has_explicit_export_keyword(node, source, language);

    Some(ExtractedSymbol {
        name,
        qualified_name,
        kind,
        line_start,
        line_end,
        column_start,
        column_end,
        signature,
        documentation,
        is_exported,
        parent_name,
        visibility,
    })
}

fn map_tag_kind(tag_kind: &str, has_parent: bool, node_kind: Option<&str>) -> Option<SymbolKind> {
    match tag_kind {
        "function" if has_parent => Some(SymbolKind::Method),
        "function" => Some(SymbolKind::Function),
        "method" => Some(SymbolKind::Method),
        "class" => match node_kind {
            Some("enum_item" | "enum_declaration") => Some(SymbolKind::Enum),
            Some("type_item" | "type_alias_declaration") => Some(SymbolKind::TypeAlias),
            Some("trait_item") => Some(SymbolKind::Trait),
            Some("interface_declaration") => Some(SymbolKind::Interface),
            Some("union_item" | "struct_item" | "struct_type") => Some(SymbolKind::Struct),
            _ => Some(SymbolKind::Class),
        },
        "interface" => match node_kind {
            Some("trait_item") => Some(SymbolKind::Trait),
            _ => Some(SymbolKind::Interface),
        },
        "module" => Some(SymbolKind::Module),
        "macro" => Some(SymbolKind::Function),
        "constant" => Some(SymbolKind::Constant),
        "variable" => Some(SymbolKind::Variable),
        "type" => match node_kind {
            Some("struct_type" | "struct_item") => Some(SymbolKind::Struct),
            Some("interface_type") => Some(SymbolKind::Interface),
            _ => Some(SymbolKind::TypeAlias),
        },
        _ => None,
    }
}

fn find_parent_scope(node: tree_sitter::Node, source: &str) -> Option<String> {
    if node.kind() == "method_declaration"
        && let Some(receiver) = node.child_by_field_name("receiver")
        && let Some(receiver_ty) = extract_go_receiver(receiver, source)
    {
        return Some(strip_generic_args(receiver_ty.trim().trim_start_matches('*').trim()));
    }

    let mut current = node.parent()?;
    loop {
        if is_transparent_node(current.kind()) {
            current = current.parent()?;
            continue;
        }

        if current.kind() == "impl_item" {
            let raw = current
                .child_by_field_name("type")
                .map(|n| node_text(n, source))
                .unwrap_or_default();
            let normalized = strip_generic_args(raw.trim().trim_start_matches('&').trim());
            return (!normalized.is_empty()).then_some(normalized);
        }

        if current.kind() == "method_declaration"
            && let Some(receiver) = current.child_by_field_name("receiver")
            && let Some(receiver_ty) = extract_go_receiver(receiver, source)
        {
            return Some(strip_generic_args(receiver_ty.trim().trim_start_matches('*').trim()));
        }

        if is_scope_node(current.kind())
            && let Some(name_node) = current.child_by_field_name("name")
        {
            let normalized = strip_generic_args(node_text(name_node, source));
            return (!normalized.is_empty()).then_some(normalized);
        }

        current = current.parent()?;
    }
}

fn strip_generic_args(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut angle_depth = 0usize;
    let mut bracket_depth = 0usize;
    for ch in name.chars() {
        match ch {
            '<' => angle_depth += 1,
            '>' => angle_depth = angle_depth.saturating_sub(1),
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ if angle_depth == 0 && bracket_depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn separator_for_language(language: &str) -> &'static str {
    match language {
        "rust" => "::",
        _ => ".",
    }
}

fn extract_signature(kind: SymbolKind, source: &str, line_range: Range<usize>) -> Option<String> {
    if !matches!(kind, SymbolKind::Function | SymbolKind::Method) {
        return None;
    }
    let raw = source.get(line_range)?;
    let first_line = raw.lines().next().unwrap_or("").trim();
    (!first_line.is_empty()).then(|| first_line.to_string())
}

/// Scan backward from `node`'s start line over contiguous doc-comment lines
/// (`///`, `//!`, `"""`-delimited docstrings handled by the caller as a
/// single preceding line group, `#` line comments for Python/Go convention).
fn extract_leading_doc_comment(node: tree_sitter::Node, source: &str, language: &str) -> Option<String> {
    let prefix: &str = match language {
        "rust" => "///",
        "typescript" | "go" => "//",
        "python" => "#",
        _ => return None,
    };

    let start_line = node.start_position().row;
    if start_line == 0 {
        return None;
    }

    let lines: Vec<&str> = source.lines().collect();
    let mut collected = Vec::new();
    let mut idx = start_line;
    while idx > 0 {
        idx -= 1;
        let trimmed = lines.get(idx)?.trim();
        if trimmed.starts_with(prefix) && !trimmed.starts_with("////") {
            collected.push(trimmed.trim_start_matches(prefix).trim().to_string());
        } else if trimmed.is_empty() {
            break;
        } else {
            break;
        }
    }
    if collected.is_empty() {
        None
    } else {
        collected.reverse();
        Some(collected.join("\n"))
    }
}

fn extract_visibility(node: tree_sitter::Node, source: &str, language: &str) -> Option<String> {
    match language {
        "rust" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "visibility_modifier" {
                    return Some("public".to_string());
                }
            }
            Some("private".to_string())
        }
        "typescript" => {
            let text = node_text(node, source);
            if text.trim_start().starts_with("export") {
                Some("public".to_string())
            } else {
                Some("private".to_string())
            }
        }
        "python" => {
            let name_start = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_default();
            if name_start.starts_with('_') {
                Some("private".to_string())
            } else {
                Some("public".to_string())
            }
        }
        "go" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())
                .unwrap_or_default();
            if name.chars().next().is_some_and(|c| c.is_uppercase()) {
                Some("public".to_string())
            } else {
                Some("private".to_string())
            }
        }
        _ => None,
    }
}

fn is_capitalized_go_export(language: &str, name: &str) -> bool {
    language == "go" && name.chars().next().is_some_and(|c| c.is_uppercase())
}

fn has_explicit_export_keyword(node: Option<tree_sitter::Node>, source: &str, language: &str) -> bool {
    if language != "typescript" {
        return false;
    }
    node.is_some_and(|n| node_text(n, source).trim_start().starts_with("export"))
}

fn is_scope_node(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "abstract_class_declaration"
            | "interface_declaration"
            | "class_definition"
            | "trait_item"
            | "struct_item"
            | "enum_item"
            | "mod_item"
            | "internal_module"
            | "namespace_definition"
            | "function_item"
            | "function_definition"
            | "function_declaration"
    )
}

fn is_transparent_node(kind: &str) -> bool {
    matches!(
        kind,
        "declaration_list" | "class_body" | "block" | "statement_block" | "decorated_definition" | "object_type" | "program" | "source_file"
    )
}

fn extract_go_receiver(receiver: tree_sitter::Node, source: &str) -> Option<String> {
    for i in 0..receiver.child_count() {
        let child = receiver.child(i)?;
        if child.kind() == "parameter_declaration"
            && let Some(type_node) = child.child_by_field_name("type")
        {
            return Some(node_text(type_node, source).to_string());
        }
    }
    None
}

fn node_text<'a>(node: tree_sitter::Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

/// Convert an `ExtractedSymbol` to a stored `Symbol`, folding the
/// extraction-only fields (`qualified_name`, `parent_name`, `visibility`,
/// `column_start`, `column_end`, `is_exported`) into `metadata` — the
/// stored `Symbol` shape has no dedicated columns for them, matching the
/// JSON-in-metadata pattern already used for file/reference/edge rows.
pub fn to_stored_symbol(extracted: &ExtractedSymbol, id: String, file_id: String) -> Symbol {
    let mut metadata = HashMap::new();
    metadata.insert("qualified_name".to_string(), extracted.qualified_name.clone());
    metadata.insert("column_start".to_string(), extracted.column_start.to_string());
    metadata.insert("column_end".to_string(), extracted.column_end.to_string());
    metadata.insert("is_exported".to_string(), extracted.is_exported.to_string());
    if let Some(parent) = &extracted.parent_name {
        metadata.insert("parent_name".to_string(), parent.clone());
    }
    if let Some(visibility) = &extracted.visibility {
        metadata.insert("visibility".to_string(), visibility.clone());
    }

    Symbol {
        id,
        file_id,
        name: extracted.name.clone(),
        kind: extracted.kind,
        line_start: extracted.line_start,
        line_end: extracted.line_end,
        signature: extracted.signature.clone(),
        documentation: extracted.documentation.clone(),
        metadata,
    }
}
