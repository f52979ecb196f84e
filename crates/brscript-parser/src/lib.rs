//! BRScript parser seam.
//!
//! Tokenizing and grammar rules live outside this workspace. This crate
//! defines what the rest of the pipeline consumes from them:
//!
//! - [`ast`]: the class tree produced by a parser
//! - [`build`]: a builder that constructs trees programmatically
//! - [`ScriptParser`]: turns source text or a pre-tokenized buffer into a tree
//! - [`SourceLoader`]: reads script files by path
//!
//! # Example
//!
//! ```
//! use brscript_parser::{ParseOutput, ScriptParser};
//! use brscript_parser::build::TreeBuilder;
//!
//! struct Fixed;
//!
//! impl ScriptParser for Fixed {
//!     fn parse(&self, path: &str, _source: &str) -> ParseOutput {
//!         let b = TreeBuilder::new(path);
//!         b.set_class_name("Fixed");
//!         ParseOutput::ok(b.finish())
//!     }
//! }
//!
//! let header = Fixed.parse_header("res://fixed.br", "");
//! assert_eq!(header.class_name.as_deref(), Some("Fixed"));
//! ```

pub mod ast;
pub mod build;
mod source;

pub use source::{FileSystemLoader, LoadError, SourceLoader};

use brscript_core::Diagnostic;

use ast::ScriptTree;

/// Everything a parser produces for one file.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// The class tree, absent when parsing failed outright.
    pub tree: Option<ScriptTree>,
    /// Syntax diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Paths referenced by load-at-compile-time expressions.
    pub dependencies: Vec<String>,
}

impl ParseOutput {
    pub fn ok(tree: ScriptTree) -> Self {
        Self {
            tree: Some(tree),
            diagnostics: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            tree: None,
            diagnostics,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn has_errors(&self) -> bool {
        self.tree.is_none() || self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Header facts readable without analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptHeader {
    pub class_name: Option<String>,
    /// The `extends` clause as written.
    pub extends: Option<String>,
    pub icon_path: Option<String>,
}

/// The external parser.
pub trait ScriptParser: Send + Sync {
    /// Parse source text.
    fn parse(&self, path: &str, source: &str) -> ParseOutput;

    /// Parse a pre-tokenized buffer (the binary extension).
    fn parse_binary(&self, path: &str, bytes: &[u8]) -> ParseOutput {
        match std::str::from_utf8(bytes) {
            Ok(source) => self.parse(path, source),
            Err(_) => ParseOutput::failed(vec![Diagnostic::syntax(
                "binary script buffer is not valid",
                brscript_core::Span::default(),
            )]),
        }
    }

    /// Read `class_name`, `extends` and `@icon` without analyzing the file.
    fn parse_header(&self, path: &str, source: &str) -> ScriptHeader {
        let output = self.parse(path, source);
        let Some(tree) = output.tree else {
            return ScriptHeader::default();
        };
        let head = tree.head();
        ScriptHeader {
            class_name: head.name().map(str::to_string),
            extends: head.extends.as_ref().map(|clause| clause.describe()),
            icon_path: head.icon_path.clone(),
        }
    }
}
