//! Thread-local `tree-sitter-tags` configs + context, one per first-class
//! language. `TagsConfiguration` isn't `Send`/`Sync` in the tree-sitter-tags
//! version this workspace pins, so configs live in a thread local rather
//! than a shared `OnceLock`.

use crate::language_grammars;
use std::collections::HashMap;
use tree_sitter_tags::{TagsConfiguration, TagsContext};

/// Rust's upstream tags.scm omits const/static items.
const RUST_EXTRA: &str = r#"
(const_item name: (identifier) @name) @definition.constant
(static_item name: (identifier) @name) @definition.variable
"#;

/// TypeScript's upstream tags.scm only covers ambient `.d.ts`-style
/// signatures; add the concrete declaration forms real source files use.
const TYPESCRIPT_EXTRA: &str = r#"
(function_declaration name: (identifier) @name) @definition.function
(class_declaration name: (type_identifier) @name) @definition.class
(method_definition name: (property_identifier) @name) @definition.method
(enum_declaration name: (identifier) @name) @definition.class
(type_alias_declaration name: (type_identifier) @name) @definition.class
(lexical_declaration (variable_declarator name: (identifier) @name)) @definition.variable
(variable_declaration (variable_declarator name: (identifier) @name)) @definition.variable
"#;

const PYTHON_EXTRA: &str = "";

/// Go's upstream tags.scm captures const/var names without a
/// `@definition.*` tag, so tree-sitter-tags would otherwise drop them.
const GO_EXTRA: &str = r#"
(const_declaration (const_spec name: (identifier) @name) @definition.constant)
(var_declaration (var_spec name: (identifier) @name) @definition.variable)
"#;

fn custom_query_extra(language: &str) -> &'static str {
    match language {
        "rust" => RUST_EXTRA,
        "typescript" => TYPESCRIPT_EXTRA,
        "python" => PYTHON_EXTRA,
        "go" => GO_EXTRA,
        _ => "",
    }
}

fn build_configs() -> HashMap<&'static str, TagsConfiguration> {
    let mut configs = HashMap::new();
    for &language in language_grammars::TAG_LANGUAGE_IDS.iter() {
        let Some(spec) = language_grammars::tag_language_spec(language) else {
            continue;
        };
        let query = format!("{}{}", spec.tags_query, custom_query_extra(language));
        let Ok(config) = TagsConfiguration::new(spec.language, &query, spec.locals_query) else {
            continue;
        };
        configs.insert(language, config);
    }
    configs
}

thread_local! {
    static CONFIGS: std::cell::RefCell<HashMap<&'static str, TagsConfiguration>> =
        std::cell::RefCell::new(build_configs());
    static CONTEXT: std::cell::RefCell<TagsContext> =
        std::cell::RefCell::new(TagsContext::new());
}

/// Run `f` with the thread-local tag configs and a mutable tags context.
pub fn with_tags<F, R>(f: F) -> R
where
    F: FnOnce(&HashMap<&'static str, TagsConfiguration>, &mut TagsContext) -> R,
{
    CONFIGS.with(|configs| {
        CONTEXT.with(|ctx| {
            let configs = configs.borrow();
            let mut ctx = ctx.borrow_mut();
            f(&configs, &mut ctx)
        })
    })
}
