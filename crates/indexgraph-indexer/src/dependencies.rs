//! C7 dependency builder: turns files, symbols, and already ID-resolved
//! references into deduplicated `DependencyEdge` records.

use indexgraph_core::types::{DependencyEdge, DependencyType, IndexedFile, Reference, ReferenceType, Symbol};
use std::collections::{HashMap, HashSet};

/// Builds dependency edges from files, symbols, and already-extracted
/// references, and writes each resolved call/type/property reference's
/// `target_symbol_key` back onto the matching row in `references` (imports
/// already carry `target_file_id` by the time this runs; this is the
/// symbol-reference equivalent of that same write-back).
pub fn build_dependency_edges(
    files: &[IndexedFile],
    symbols: &[Symbol],
    references: &mut [Reference],
) -> Vec<DependencyEdge> {
    let mut edges = Vec::new();
    let mut seen: HashSet<(Option<String>, Option<String>, DependencyType)> = HashSet::new();

    for reference in references.iter().filter(|r| r.reference_type == ReferenceType::Import) {
        let Some(to_file_id) = &reference.target_file_id else { continue };
        let dependency_type = if reference.metadata.get("is_export_all").map(String::as_str) == Some("true") {
            DependencyType::ExportAll
        } else if reference.metadata.get("is_re_export").map(String::as_str) == Some("true") {
            DependencyType::ReExport
        } else {
            DependencyType::Import
        };
        push_unique(
            &mut edges,
            &mut seen,
            DependencyEdge {
                from_file_id: Some(reference.source_file_id.clone()),
                to_file_id: Some(to_file_id.clone()),
                from_symbol_id: None,
                to_symbol_id: None,
                dependency_type,
                confidence: Default::default(),
                metadata: import_source_metadata(reference),
            },
        );
    }

    let resolver = SymbolResolver::build(files, symbols);
    for reference in references.iter_mut().filter(|r| {
        matches!(r.reference_type, ReferenceType::Call | ReferenceType::TypeReference | ReferenceType::PropertyAccess)
    }) {
        let Some(target_name) = reference.metadata.get("target_name").cloned() else { continue };
        let Some(from_symbol) = resolver.enclosing_symbol(&reference.source_file_id, reference.line_number) else {
            continue;
        };
        let Some(to_symbol) = resolver.resolve_target(&reference.source_file_id, &target_name) else {
            continue;
        };
        let dependency_type = match reference.reference_type {
            ReferenceType::Call => DependencyType::Calls,
            ReferenceType::TypeReference => DependencyType::ReferencesType,
            ReferenceType::PropertyAccess => DependencyType::PropertyOf,
            ReferenceType::Import => unreachable!(),
        };

        reference.target_symbol_key = Some(resolver.tie_break_key_for(to_symbol));
        let from_symbol_id = from_symbol.id.clone();
        let to_symbol_id = to_symbol.id.clone();
        push_unique(
            &mut edges,
            &mut seen,
            DependencyEdge {
                from_file_id: None,
                to_file_id: None,
                from_symbol_id: Some(from_symbol_id),
                to_symbol_id: Some(to_symbol_id),
                dependency_type,
                confidence: Default::default(),
                metadata: HashMap::new(),
            },
        );
    }

    edges
}

fn import_source_metadata(reference: &Reference) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    if let Some(source) = reference.metadata.get("import_source") {
        metadata.insert("import_source".to_string(), source.clone());
    }
    metadata
}

fn push_unique(
    edges: &mut Vec<DependencyEdge>,
    seen: &mut HashSet<(Option<String>, Option<String>, DependencyType)>,
    edge: DependencyEdge,
) {
    let from = edge.from_file_id.clone().or_else(|| edge.from_symbol_id.clone());
    let to = edge.to_file_id.clone().or_else(|| edge.to_symbol_id.clone());
    let key = (from, to, edge.dependency_type);
    if seen.insert(key) {
        edges.push(edge);
    }
}

struct SymbolResolver<'a> {
    file_path_by_id: HashMap<&'a str, &'a str>,
    symbols_by_file: HashMap<&'a str, Vec<&'a Symbol>>,
    symbols_by_name: HashMap<&'a str, Vec<&'a Symbol>>,
}

impl<'a> SymbolResolver<'a> {
    fn build(files: &'a [IndexedFile], symbols: &'a [Symbol]) -> Self {
        let file_path_by_id = files.iter().map(|f| (f.id.as_str(), f.path.as_str())).collect();

        let mut symbols_by_file: HashMap<&str, Vec<&Symbol>> = HashMap::new();
        let mut symbols_by_name: HashMap<&str, Vec<&Symbol>> = HashMap::new();
        for symbol in symbols {
            symbols_by_file.entry(symbol.file_id.as_str()).or_default().push(symbol);
            symbols_by_name.entry(symbol.name.as_str()).or_default().push(symbol);
        }
        for list in symbols_by_file.values_mut() {
            list.sort_by_key(|s| s.line_start);
        }

        Self { file_path_by_id, symbols_by_file, symbols_by_name }
    }

    fn enclosing_symbol(&self, file_id: &str, line_number: u32) -> Option<&'a Symbol> {
        self.symbols_by_file
            .get(file_id)?
            .iter()
            .filter(|s| s.line_start <= line_number && line_number <= s.line_end)
            .max_by_key(|s| s.line_start)
            .copied()
    }

    fn resolve_target(&self, source_file_id: &str, target_name: &str) -> Option<&'a Symbol> {
        if let Some(locals) = self.symbols_by_file.get(source_file_id) {
            let matches: Vec<&&Symbol> = locals.iter().filter(|s| s.name == target_name).collect();
            if let Some(found) = self.pick(&matches) {
                return Some(found);
            }
        }

        let candidates = self.symbols_by_name.get(target_name)?;
        let refs: Vec<&&Symbol> = candidates.iter().collect();
        self.pick(&refs)
    }

    /// When a target name is ambiguous, break the tie deterministically by
    /// sorting candidates on their `path::name::line_start` key and taking
    /// the lexicographically first, per spec's opaque-tie-breaker rule.
    fn pick(&self, candidates: &[&&'a Symbol]) -> Option<&'a Symbol> {
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return Some(candidates[0]);
        }
        let mut sorted: Vec<&&Symbol> = candidates.to_vec();
        sorted.sort_by_key(|s| self.tie_break_key_for(s));
        sorted.first().copied()
    }

    fn tie_break_key_for(&self, symbol: &Symbol) -> String {
        let path = self.file_path_by_id.get(symbol.file_id.as_str()).copied().unwrap_or("");
        indexgraph_core::types::symbol_tie_breaker_key(path, &symbol.name, symbol.line_start)
    }
}
