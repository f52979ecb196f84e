//! Expression AST nodes.
//!
//! Every expression carries a [`NodeId`] unique within its file. The
//! analyzer attaches types and folded values to expressions through side
//! tables keyed by that id, so the tree itself stays immutable once built.

use brscript_core::{Span, Variant};

use super::{BinaryOp, FunctionDecl, Ident, NodeId, TypeSpec, UnaryOp};

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

/// The different kinds of expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal value (`1`, `2.5`, `"text"`, `&"name"`, `true`, `null`)
    Literal(Variant),
    /// Bare identifier (local, member, constant, class or global)
    Identifier(Ident),
    /// `self`
    SelfRef,
    /// `[a, b, c]`
    Array(Vec<Expr>),
    /// `{k: v, ...}`
    Dictionary(Vec<(Expr, Expr)>),
    /// `-x`, `not x`
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `a + b`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a if cond else b`
    Ternary {
        condition: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    /// `target = value` or `target op= value`
    Assignment {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `base.name`
    Attribute { base: Box<Expr>, name: Ident },
    /// `base[index]`
    Subscript { base: Box<Expr>, index: Box<Expr> },
    /// `f(args)`, `obj.f(args)` or `super.f(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        is_super: bool,
    },
    /// `value as Type`
    Cast { operand: Box<Expr>, ty: TypeSpec },
    /// `value is Type` / `value is not Type`
    TypeTest {
        operand: Box<Expr>,
        ty: TypeSpec,
        negated: bool,
    },
    /// `func(args): body`
    Lambda(Box<FunctionDecl>),
    /// `preload("res://path.br")`
    Preload { path: String },
    /// `await expr`
    Await(Box<Expr>),
}

impl Expr {
    /// Whether this expression can appear on the left side of an assignment.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
        )
    }

    /// The identifier name if this is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(ident) => Some(&ident.name),
            _ => None,
        }
    }

    /// Visit direct child expressions in evaluation order.
    ///
    /// Lambda bodies are not entered; they are separate functions.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Identifier(_)
            | ExprKind::SelfRef
            | ExprKind::Preload { .. }
            | ExprKind::Lambda(_) => {}
            ExprKind::Array(elements) => {
                for element in elements {
                    f(element);
                }
            }
            ExprKind::Dictionary(entries) => {
                for (key, value) in entries {
                    f(key);
                    f(value);
                }
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::TypeTest { operand, .. } => f(operand),
            ExprKind::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            ExprKind::Ternary {
                condition,
                true_expr,
                false_expr,
            } => {
                f(condition);
                f(true_expr);
                f(false_expr);
            }
            ExprKind::Assignment { target, value, .. } => {
                f(target);
                f(value);
            }
            ExprKind::Attribute { base, .. } => f(base),
            ExprKind::Subscript { base, index } => {
                f(base);
                f(index);
            }
            ExprKind::Call { callee, args, .. } => {
                f(callee);
                for arg in args {
                    f(arg);
                }
            }
            ExprKind::Await(inner) => f(inner),
        }
    }
}
