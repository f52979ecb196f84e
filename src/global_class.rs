//! Global class name lookup without analysis.
//!
//! Editor and export tooling ask for a file's `class_name`, base type and
//! icon while other scripts may be broken or missing. This lookup only
//! parses files; it never runs the analyzer and never touches the cache.

use brscript_compiler::analyzer::resolve_relative;
use brscript_core::ScriptSettings;
use brscript_parser::ast::{ClassId, ClassNode, ScriptTree};
use brscript_parser::{ScriptParser, SourceLoader};

/// Depth of `extends` chains followed before giving up.
const MAX_EXTENDS_DEPTH: usize = 64;

/// Header facts of a script file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalClassInfo {
    /// `class_name` of the file.
    pub name: Option<String>,
    /// Native or global class the file ultimately extends, when known.
    pub base_type: Option<String>,
    pub icon_path: Option<String>,
}

/// `class_name`, base type and icon of the file at `path`. `None` when the
/// file cannot be read or parsed.
pub fn get_global_class_name(
    loader: &dyn SourceLoader,
    parser: &dyn ScriptParser,
    settings: &ScriptSettings,
    path: &str,
) -> Option<GlobalClassInfo> {
    lookup(loader, parser, settings, path, 0)
}

fn lookup(
    loader: &dyn SourceLoader,
    parser: &dyn ScriptParser,
    settings: &ScriptSettings,
    path: &str,
    depth: usize,
) -> Option<GlobalClassInfo> {
    if depth > MAX_EXTENDS_DEPTH {
        return None;
    }
    let tree = parse_file(loader, parser, settings, path)?;
    let head = tree.head();
    Some(GlobalClassInfo {
        name: head.name().map(str::to_string),
        base_type: base_type(loader, parser, settings, path, &tree, head, depth),
        icon_path: head.icon_path.clone(),
    })
}

fn base_type(
    loader: &dyn SourceLoader,
    parser: &dyn ScriptParser,
    settings: &ScriptSettings,
    path: &str,
    tree: &ScriptTree,
    class: &ClassNode,
    depth: usize,
) -> Option<String> {
    let Some(extends) = &class.extends else {
        return Some(settings.default_base_class.clone());
    };
    let chain: Vec<&str> = extends.chain.iter().map(|ident| ident.name.as_str()).collect();
    match (&extends.path, chain.as_slice()) {
        (Some(base_path), []) => {
            let base_path = resolve_relative(path, base_path);
            lookup(loader, parser, settings, &base_path, depth + 1)?.base_type
        }
        (Some(base_path), chain) => {
            let base_path = resolve_relative(path, base_path);
            let base_tree = parse_file(loader, parser, settings, &base_path)?;
            let id = base_tree.find_nested(ClassId(0), chain)?;
            let base = base_tree.class(id)?;
            base_type(loader, parser, settings, &base_path, &base_tree, base, depth + 1)
        }
        (None, [name]) => Some((*name).to_string()),
        (None, [first, rest @ ..]) => {
            // `Outer.Inner` naming a class of this file.
            let outer = tree.classes.iter().find(|node| node.name() == Some(*first))?;
            let id = tree.find_nested(outer.id, rest)?;
            base_type(loader, parser, settings, path, tree, tree.class(id)?, depth + 1)
        }
        (None, []) => None,
    }
}

fn parse_file(
    loader: &dyn SourceLoader,
    parser: &dyn ScriptParser,
    settings: &ScriptSettings,
    path: &str,
) -> Option<ScriptTree> {
    let output = if settings.is_binary_path(path) {
        parser.parse_binary(path, &loader.read_binary(path).ok()?)
    } else {
        parser.parse(path, &loader.read_source(path).ok()?)
    };
    output.tree
}
