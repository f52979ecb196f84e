//! Local scope management for function analysis.
//!
//! This module provides `LocalScope` for tracking local declarations while a
//! function body is resolved. It handles:
//! - Declaration of parameters, locals, constants, loop variables and
//!   pattern bindings, identified by their declaring node
//! - Nested block scopes (if/while/for/match bodies)
//! - Shadowing with proper restoration on scope exit
//! - Lambda capture through every enclosing lambda up to the declaring scope

use brscript_core::{DataType, Span};
use brscript_parser::ast::NodeId;
use rustc_hash::FxHashMap;

use crate::analysis::LocalKind;

// ============================================================================
// Types
// ============================================================================

/// A local declaration visible in the current scope chain.
#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: String,
    pub decl: NodeId,
    pub data_type: DataType,
    pub kind: LocalKind,
    /// Scope depth where declared
    pub depth: u32,
    pub span: Span,
}

/// A local of an enclosing function used by a lambda.
#[derive(Debug, Clone)]
pub struct CapturedVar {
    pub name: String,
    pub decl: NodeId,
    pub data_type: DataType,
    /// Index in the capture list; captures become the leading parameters.
    pub capture_index: usize,
}

/// Result of a name lookup.
#[derive(Debug, Clone)]
pub enum VarLookup {
    Local(LocalVar),
    Captured(CapturedVar),
}

impl VarLookup {
    pub fn decl(&self) -> NodeId {
        match self {
            VarLookup::Local(var) => var.decl,
            VarLookup::Captured(capture) => capture.decl,
        }
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            VarLookup::Local(var) => &var.data_type,
            VarLookup::Captured(capture) => &capture.data_type,
        }
    }
}

/// Declaring the same name twice at one depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Redeclaration {
    pub name: String,
    pub original: Span,
}

// ============================================================================
// LocalScope
// ============================================================================

/// Local scope of one function or lambda.
#[derive(Debug, Default)]
pub struct LocalScope {
    variables: FxHashMap<String, LocalVar>,

    /// Current scope depth (0 = parameters)
    scope_depth: u32,

    /// Stack of shadowed variables (shadowing_depth, name, old_var)
    shadowed: Vec<(u32, String, LocalVar)>,

    captures: Vec<CapturedVar>,

    /// Scope of the enclosing function, for lambdas.
    parent: Option<Box<LocalScope>>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the scope of a lambda nested in `parent`.
    pub fn nested(parent: LocalScope) -> Self {
        Self {
            parent: Some(Box::new(parent)),
            ..Self::default()
        }
    }

    // ==========================================================================
    // Scope Management
    // ==========================================================================

    pub fn push_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Exit the current block, returning the declarations that went out of
    /// scope.
    pub fn pop_scope(&mut self) -> Vec<LocalVar> {
        let depth = self.scope_depth;
        let mut removed = Vec::new();
        self.variables.retain(|_, var| {
            if var.depth >= depth {
                removed.push(var.clone());
                false
            } else {
                true
            }
        });

        while let Some((shadowing_depth, _, _)) = self.shadowed.last() {
            if *shadowing_depth != depth {
                break;
            }
            if let Some((_, name, var)) = self.shadowed.pop() {
                self.variables.insert(name, var);
            }
        }

        self.scope_depth = depth.saturating_sub(1);
        removed.sort_by_key(|var| var.decl);
        removed
    }

    /// Everything still declared, including parameters.
    pub fn drain(&mut self) -> Vec<LocalVar> {
        let mut all: Vec<LocalVar> = self.variables.drain().map(|(_, var)| var).collect();
        all.extend(self.shadowed.drain(..).map(|(_, _, var)| var));
        all.sort_by_key(|var| var.decl);
        all
    }

    pub fn depth(&self) -> u32 {
        self.scope_depth
    }

    // ==========================================================================
    // Declaration
    // ==========================================================================

    /// Declare a local at the current depth.
    ///
    /// Shadowing a local of an outer block is allowed; redeclaring at the
    /// same depth is not.
    pub fn declare(
        &mut self,
        name: &str,
        decl: NodeId,
        data_type: DataType,
        kind: LocalKind,
        span: Span,
    ) -> Result<(), Redeclaration> {
        if let Some(existing) = self.variables.get(name) {
            if existing.depth == self.scope_depth {
                return Err(Redeclaration {
                    name: name.to_string(),
                    original: existing.span,
                });
            }
            self.shadowed
                .push((self.scope_depth, name.to_string(), existing.clone()));
        }

        self.variables.insert(
            name.to_string(),
            LocalVar {
                name: name.to_string(),
                decl,
                data_type,
                kind,
                depth: self.scope_depth,
                span,
            },
        );
        Ok(())
    }

    /// Update the type of a declaration after its initializer was reduced.
    pub fn set_type(&mut self, name: &str, data_type: DataType) {
        if let Some(var) = self.variables.get_mut(name) {
            var.data_type = data_type;
        }
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    pub fn get(&self, name: &str) -> Option<&LocalVar> {
        self.variables.get(name)
    }

    /// Look up a name, capturing it from enclosing functions when needed.
    ///
    /// A capture is recorded on every lambda between the use and the
    /// declaring scope.
    pub fn get_or_capture(&mut self, name: &str) -> Option<VarLookup> {
        if let Some(var) = self.variables.get(name) {
            return Some(VarLookup::Local(var.clone()));
        }

        if let Some(capture) = self.captures.iter().find(|c| c.name == name) {
            return Some(VarLookup::Captured(capture.clone()));
        }

        let lookup = self.parent.as_mut()?.get_or_capture(name)?;
        let capture = CapturedVar {
            name: name.to_string(),
            decl: lookup.decl(),
            data_type: lookup.data_type().clone(),
            capture_index: self.captures.len(),
        };
        self.captures.push(capture.clone());
        Some(VarLookup::Captured(capture))
    }

    /// Whether a name is visible without capturing.
    pub fn is_local(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Whether any enclosing function declares the name.
    pub fn is_visible(&self, name: &str) -> bool {
        self.variables.contains_key(name)
            || self.parent.as_ref().is_some_and(|parent| parent.is_visible(name))
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn captures(&self) -> &[CapturedVar] {
        &self.captures
    }

    pub fn has_captures(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Take the enclosing scope back after a lambda.
    pub fn take_parent(&mut self) -> Option<LocalScope> {
        self.parent.take().map(|b| *b)
    }
}

// ============================================================================
// Tests
// ============================================================================
