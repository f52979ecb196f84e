//! Statement AST nodes.

use brscript_core::Span;

use super::{ConstantDecl, Expr, Ident, NodeId, TypeSpec, VariableDecl};

/// An indented block of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Suite {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

impl Suite {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

/// The different kinds of statements.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for side effects.
    Expr(Expr),
    /// `var x: T = value`
    Var(VariableDecl),
    /// `const X = value`
    Const(ConstantDecl),
    /// `if cond: ... elif ...: ... else: ...`
    ///
    /// `elif` chains are represented as an `If` in the `else` suite.
    If {
        condition: Expr,
        then_branch: Suite,
        else_branch: Option<Suite>,
    },
    /// `while cond: ...`
    While { condition: Expr, body: Suite },
    /// `for variable: T in iterable: ...`
    ///
    /// The loop variable is declared by this statement's id.
    For {
        variable: Ident,
        ty: Option<TypeSpec>,
        iterable: Expr,
        body: Suite,
    },
    /// `match test: ...`
    Match {
        test: Expr,
        branches: Vec<MatchBranch>,
    },
    /// `return` / `return value`
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    /// `assert(cond, message)`
    Assert {
        condition: Expr,
        message: Option<Expr>,
    },
}

impl Stmt {
    /// Whether control never continues past this statement.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue
        )
    }
}

/// One branch of a `match` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchBranch {
    pub id: NodeId,
    /// Alternative patterns; the branch matches if any of them does.
    pub patterns: Vec<Pattern>,
    /// `when` guard, evaluated only after a pattern matched.
    pub guard: Option<Expr>,
    pub body: Suite,
    pub span: Span,
}

impl MatchBranch {
    /// Whether any pattern in this branch binds a variable.
    pub fn has_bindings(&self) -> bool {
        self.patterns.iter().any(Pattern::has_bindings)
    }
}

/// A match pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: NodeId,
    pub span: Span,
    pub kind: PatternKind,
}

/// The different kinds of patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// A constant literal compared by equality.
    Literal(Expr),
    /// An expression (constant or identifier) compared by equality.
    Expression(Expr),
    /// `var name`, matches anything and binds it.
    Bind(Ident),
    /// `_`
    Wildcard,
    /// `..` inside an array or dictionary pattern.
    Rest,
    /// `[p1, p2, ..]`
    Array(Vec<Pattern>),
    /// `{key: pattern, key2, ..}`. A `None` value only checks the key.
    Dictionary(Vec<(Pattern, Option<Pattern>)>),
}

impl Pattern {
    pub fn has_bindings(&self) -> bool {
        match &self.kind {
            PatternKind::Bind(_) => true,
            PatternKind::Array(elements) => elements.iter().any(Pattern::has_bindings),
            PatternKind::Dictionary(entries) => entries.iter().any(|(key, value)| {
                key.has_bindings() || value.as_ref().is_some_and(Pattern::has_bindings)
            }),
            _ => false,
        }
    }

    /// Whether this pattern ends in a `..` rest marker.
    pub fn is_open_ended(&self) -> bool {
        match &self.kind {
            PatternKind::Array(elements) => elements
                .last()
                .is_some_and(|last| matches!(last.kind, PatternKind::Rest)),
            PatternKind::Dictionary(entries) => entries
                .last()
                .is_some_and(|(key, _)| matches!(key.kind, PatternKind::Rest)),
            _ => false,
        }
    }
}
