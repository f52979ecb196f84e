//! Operator definitions for BRScript expressions.
//!
//! The parser produces [`UnaryOp`] and [`BinaryOp`]; the analyzer maps them
//! onto the host [`Operator`] table, except for the short-circuit logical
//! operators and `not in`, which lower to control flow or a negated `in`.

use brscript_core::Operator;
use std::fmt;

/// Binary operators in BRScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Logical (short-circuit)
    /// `and` / `&&`
    And,
    /// `or` / `||`
    Or,

    // Containment
    /// `in`
    In,
    /// `not in`
    NotIn,

    // Comparison
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,

    // Bitwise
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,

    // Arithmetic
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinaryOp {
    /// Whether the right operand is evaluated only when needed.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Whether this is a comparison operator (always yields `bool`).
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }

    /// The host operator evaluated for this binary operator.
    ///
    /// `not in` maps to `in`; the caller negates the result.
    pub fn to_operator(&self) -> Operator {
        match self {
            BinaryOp::And => Operator::And,
            BinaryOp::Or => Operator::Or,
            BinaryOp::In | BinaryOp::NotIn => Operator::In,
            BinaryOp::Equal => Operator::Equal,
            BinaryOp::NotEqual => Operator::NotEqual,
            BinaryOp::Less => Operator::Less,
            BinaryOp::LessEqual => Operator::LessEqual,
            BinaryOp::Greater => Operator::Greater,
            BinaryOp::GreaterEqual => Operator::GreaterEqual,
            BinaryOp::BitOr => Operator::BitOr,
            BinaryOp::BitXor => Operator::BitXor,
            BinaryOp::BitAnd => Operator::BitAnd,
            BinaryOp::ShiftLeft => Operator::ShiftLeft,
            BinaryOp::ShiftRight => Operator::ShiftRight,
            BinaryOp::Add => Operator::Add,
            BinaryOp::Sub => Operator::Subtract,
            BinaryOp::Mul => Operator::Multiply,
            BinaryOp::Div => Operator::Divide,
            BinaryOp::Mod => Operator::Module,
            BinaryOp::Pow => Operator::Power,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prefix unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-`
    Negate,
    /// `+`
    Positive,
    /// `~`
    BitNot,
    /// `not` / `!`
    Not,
}

impl UnaryOp {
    pub fn to_operator(&self) -> Operator {
        match self {
            UnaryOp::Negate => Operator::Negate,
            UnaryOp::Positive => Operator::Positive,
            UnaryOp::BitNot => Operator::BitNegate,
            UnaryOp::Not => Operator::Not,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Positive => "+",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "not",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_host_operators() {
        assert_eq!(BinaryOp::Sub.to_operator(), Operator::Subtract);
        assert_eq!(BinaryOp::NotIn.to_operator(), Operator::In);
        assert_eq!(UnaryOp::BitNot.to_operator(), Operator::BitNegate);
    }

    #[test]
    fn classification() {
        assert!(BinaryOp::And.is_short_circuit());
        assert!(!BinaryOp::Add.is_short_circuit());
        assert!(BinaryOp::LessEqual.is_comparison());
        assert_eq!(BinaryOp::NotIn.to_string(), "not in");
    }
}
