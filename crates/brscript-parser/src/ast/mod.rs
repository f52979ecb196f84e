//! Abstract Syntax Tree (AST) for BRScript.
//!
//! A parsed file is a [`ScriptTree`]: an arena of [`ClassNode`]s where index
//! 0 is the file-level (head) class and nested classes follow. Classes refer
//! to each other by [`ClassId`], never by pointer, so a tree is a plain value
//! that can be shared behind an `Arc` while the analyzer records its results
//! in side tables keyed by [`NodeId`].
//!
//! # Example
//!
//! ```
//! use brscript_parser::build::TreeBuilder;
//!
//! let b = TreeBuilder::new("res://player.br");
//! b.set_class_name("Player");
//! b.add_variable(b.head(), b.var("health").with_type(b.ty("int")).with_initializer(b.int(100)));
//! let tree = b.finish();
//!
//! assert_eq!(tree.head().name(), Some("Player"));
//! assert!(tree.head().member("health").is_some());
//! ```

pub mod decl;
pub mod expr;
pub mod ops;
pub mod stmt;

pub use decl::*;
pub use expr::*;
pub use ops::*;
pub use stmt::*;

use brscript_core::Span;
use rustc_hash::FxHashMap;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an expression, statement, pattern or declaration, unique
/// within one [`ScriptTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

/// Index of a class in its tree's class arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClassId(pub u32);

impl ClassId {
    /// The file-level class.
    pub const HEAD: ClassId = ClassId(0);

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A name with its source location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ============================================================================
// Classes
// ============================================================================

/// The base named by `extends`.
///
/// `extends "res://base.br"` sets `path`; `extends Base` or
/// `extends Outer.Inner` sets `chain`; `extends "res://a.br".Inner` sets both.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendsClause {
    pub path: Option<String>,
    pub chain: Vec<Ident>,
    pub span: Span,
}

impl ExtendsClause {
    /// Human readable form for diagnostics.
    pub fn describe(&self) -> String {
        let chain = self
            .chain
            .iter()
            .map(|ident| ident.name.as_str())
            .collect::<Vec<_>>()
            .join(".");
        match (&self.path, chain.is_empty()) {
            (Some(path), true) => format!("\"{}\"", path),
            (Some(path), false) => format!("\"{}\".{}", path, chain),
            (None, _) => chain,
        }
    }
}

/// A class block: the head class of a file or a nested `class Name:`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    pub id: ClassId,
    /// `class_name X` for the head class, the class name for nested classes.
    pub identifier: Option<Ident>,
    /// Fully qualified name: the file path, then `::Name` per nesting level.
    pub fqcn: String,
    pub extends: Option<ExtendsClause>,
    pub members: Vec<Member>,
    pub member_indices: FxHashMap<String, usize>,
    /// Enclosing class for nested classes.
    pub outer: Option<ClassId>,
    /// `@icon("...")`
    pub icon_path: Option<String>,
    pub span: Span,
}

impl ClassNode {
    pub fn name(&self) -> Option<&str> {
        self.identifier.as_ref().map(|ident| ident.name.as_str())
    }

    pub fn is_head(&self) -> bool {
        self.outer.is_none()
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.member_indices
            .get(name)
            .and_then(|&index| self.members.get(index))
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member_indices.contains_key(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.members.iter().filter_map(|member| match member {
            Member::Function(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableDecl> {
        self.members.iter().filter_map(|member| match member {
            Member::Variable(decl) => Some(decl),
            _ => None,
        })
    }

    /// Ids of the nested classes declared directly in this class.
    pub fn inner_classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.members.iter().filter_map(|member| match member {
            Member::Class { id, .. } => Some(*id),
            _ => None,
        })
    }
}

/// A parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTree {
    pub path: String,
    /// Class arena; index 0 is the head class.
    pub classes: Vec<ClassNode>,
    /// Number of node ids allocated; ids are `0..node_count`.
    pub node_count: u32,
}

impl ScriptTree {
    pub fn head(&self) -> &ClassNode {
        &self.classes[0]
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassNode> {
        self.classes.get(id.index())
    }

    pub fn class_by_fqcn(&self, fqcn: &str) -> Option<&ClassNode> {
        self.classes.iter().find(|class| class.fqcn == fqcn)
    }

    /// Walk a dotted chain of nested class names starting at `from`.
    pub fn find_nested(&self, from: ClassId, chain: &[&str]) -> Option<ClassId> {
        let mut current = from;
        for name in chain {
            let class = self.class(current)?;
            current = match class.member(name)? {
                Member::Class { id, .. } => *id,
                _ => return None,
            };
        }
        Some(current)
    }
}
