//! The host operator table.
//!
//! [`Operator::result_type`] answers whether an operation is valid for a pair
//! of builtin operand types and what it produces; the analyzer uses it to
//! validate hard-typed operations. [`Operator::evaluate`] performs the
//! operation on concrete values and backs constant folding.

use std::fmt;

use crate::{Array, Variant, VariantType};

/// Unary and binary operators known to the value model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Comparison
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Positive,
    Module,
    Power,
    // Bitwise
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
    BitNegate,
    // Logic
    And,
    Or,
    Xor,
    Not,
    // Containment
    In,
}

impl Operator {
    /// Every operator, in declaration order. The position is the operator's
    /// encoding in compiled code.
    pub const ALL: &'static [Operator] = &[
        Operator::Equal,
        Operator::NotEqual,
        Operator::Less,
        Operator::LessEqual,
        Operator::Greater,
        Operator::GreaterEqual,
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::Negate,
        Operator::Positive,
        Operator::Module,
        Operator::Power,
        Operator::ShiftLeft,
        Operator::ShiftRight,
        Operator::BitAnd,
        Operator::BitOr,
        Operator::BitXor,
        Operator::BitNegate,
        Operator::And,
        Operator::Or,
        Operator::Xor,
        Operator::Not,
        Operator::In,
    ];

    pub fn index(&self) -> u32 {
        Operator::ALL
            .iter()
            .position(|op| op == self)
            .unwrap_or_default() as u32
    }

    pub fn from_index(index: u32) -> Option<Operator> {
        Operator::ALL.get(index as usize).copied()
    }

    /// Source spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Negate => "unary-",
            Operator::Positive => "unary+",
            Operator::Module => "%",
            Operator::Power => "**",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::BitNegate => "~",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Xor => "xor",
            Operator::Not => "not",
            Operator::In => "in",
        }
    }

    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::Negate | Operator::Positive | Operator::BitNegate | Operator::Not
        )
    }

    /// Result type of `a op b`, or `None` when the operation is invalid.
    /// For unary operators `b` is ignored.
    pub fn result_type(&self, a: VariantType, b: VariantType) -> Option<VariantType> {
        use VariantType as T;

        let numeric = |a: T, b: T| match (a, b) {
            (T::Int, T::Int) => Some(T::Int),
            (T::Int | T::Float, T::Int | T::Float) => Some(T::Float),
            _ => None,
        };
        let vector = |a: T, b: T| match (a, b) {
            (T::Vector2, T::Vector2) => Some(T::Vector2),
            (T::Vector3, T::Vector3) => Some(T::Vector3),
            _ => None,
        };

        match self {
            Operator::Equal | Operator::NotEqual => {
                let ok = a == b
                    || a == T::Nil
                    || b == T::Nil
                    || (a.is_numeric() && b.is_numeric())
                    || matches!((a, b), (T::String | T::StringName, T::String | T::StringName));
                ok.then_some(T::Bool)
            }
            Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => {
                let ok = (a.is_numeric() && b.is_numeric())
                    || matches!((a, b), (T::String | T::StringName, T::String | T::StringName))
                    || (a == b && matches!(a, T::Vector2 | T::Vector3 | T::Bool));
                ok.then_some(T::Bool)
            }
            Operator::Add => numeric(a, b).or_else(|| vector(a, b)).or(match (a, b) {
                (T::String, T::String) => Some(T::String),
                (T::Array, T::Array) => Some(T::Array),
                _ => None,
            }),
            Operator::Subtract => numeric(a, b).or_else(|| vector(a, b)),
            Operator::Multiply | Operator::Divide => {
                numeric(a, b).or_else(|| vector(a, b)).or(match (a, b) {
                    (T::Vector2, T::Int | T::Float) => Some(T::Vector2),
                    (T::Vector3, T::Int | T::Float) => Some(T::Vector3),
                    (T::Int | T::Float, T::Vector2) if *self == Operator::Multiply => Some(T::Vector2),
                    (T::Int | T::Float, T::Vector3) if *self == Operator::Multiply => Some(T::Vector3),
                    _ => None,
                })
            }
            Operator::Module => numeric(a, b).or(match a {
                T::String => Some(T::String),
                _ => None,
            }),
            Operator::Power => numeric(a, b),
            Operator::ShiftLeft
            | Operator::ShiftRight
            | Operator::BitAnd
            | Operator::BitOr
            | Operator::BitXor => (a == T::Int && b == T::Int).then_some(T::Int),
            Operator::Negate | Operator::Positive => {
                matches!(a, T::Int | T::Float | T::Vector2 | T::Vector3).then_some(a)
            }
            Operator::BitNegate => (a == T::Int).then_some(T::Int),
            Operator::And | Operator::Or | Operator::Xor | Operator::Not => Some(T::Bool),
            Operator::In => match b {
                T::Array | T::Dictionary | T::Object => Some(T::Bool),
                T::String | T::StringName if matches!(a, T::String | T::StringName) => {
                    Some(T::Bool)
                }
                _ => None,
            },
        }
    }

    /// Evaluate on concrete values. Returns `None` when the operation is
    /// invalid or fails at runtime (division by zero, overflow).
    pub fn evaluate(&self, a: &Variant, b: &Variant) -> Option<Variant> {
        use Variant as V;

        if self.result_type(a.get_type(), b.get_type()).is_none() {
            return None;
        }

        match self {
            Operator::Equal => Some(V::Bool(a == b)),
            Operator::NotEqual => Some(V::Bool(a != b)),
            Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => {
                let ordering = compare(a, b)?;
                let result = match self {
                    Operator::Less => ordering.is_lt(),
                    Operator::LessEqual => ordering.is_le(),
                    Operator::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Some(V::Bool(result))
            }
            Operator::Add => match (a, b) {
                (V::String(x), V::String(y)) => Some(V::String(format!("{x}{y}"))),
                (V::Array(x), V::Array(y)) => {
                    let mut items = x.to_vec();
                    items.extend(y.to_vec());
                    Some(V::Array(Array::from_vec(items)))
                }
                _ => arithmetic(a, b, i64::checked_add, |x, y| x + y),
            },
            Operator::Subtract => arithmetic(a, b, i64::checked_sub, |x, y| x - y),
            Operator::Multiply => arithmetic(a, b, i64::checked_mul, |x, y| x * y),
            Operator::Divide => match (a, b) {
                (V::Int(_), V::Int(0)) => None,
                _ => arithmetic(a, b, i64::checked_div, |x, y| x / y),
            },
            Operator::Module => match (a, b) {
                (V::Int(_), V::Int(0)) => None,
                (V::String(fmt), arg) => Some(V::String(fmt.replacen("%s", &arg.to_string(), 1))),
                _ => arithmetic(a, b, i64::checked_rem, |x, y| x % y),
            },
            Operator::Power => match (a, b) {
                (V::Int(x), V::Int(y)) if *y >= 0 => {
                    u32::try_from(*y).ok().and_then(|y| x.checked_pow(y)).map(V::Int)
                }
                _ => Some(V::Float(a.as_float()?.powf(b.as_float()?))),
            },
            Operator::ShiftLeft => shift(a, b, i64::checked_shl),
            Operator::ShiftRight => shift(a, b, i64::checked_shr),
            Operator::BitAnd => Some(V::Int(a.as_int()? & b.as_int()?)),
            Operator::BitOr => Some(V::Int(a.as_int()? | b.as_int()?)),
            Operator::BitXor => Some(V::Int(a.as_int()? ^ b.as_int()?)),
            Operator::BitNegate => Some(V::Int(!a.as_int()?)),
            Operator::Negate => match a {
                V::Int(x) => x.checked_neg().map(V::Int),
                V::Float(x) => Some(V::Float(-x)),
                V::Vector2(x, y) => Some(V::Vector2(-x, -y)),
                V::Vector3(x, y, z) => Some(V::Vector3(-x, -y, -z)),
                _ => None,
            },
            Operator::Positive => Some(a.clone()),
            Operator::And => Some(V::Bool(a.booleanize() && b.booleanize())),
            Operator::Or => Some(V::Bool(a.booleanize() || b.booleanize())),
            Operator::Xor => Some(V::Bool(a.booleanize() != b.booleanize())),
            Operator::Not => Some(V::Bool(!a.booleanize())),
            Operator::In => match b {
                V::Array(array) => Some(V::Bool(array.contains(a))),
                V::Dictionary(dict) => Some(V::Bool(dict.contains_key(a))),
                V::String(s) | V::StringName(s) => Some(V::Bool(s.contains(a.as_str()?))),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compare(a: &Variant, b: &Variant) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Variant::Int(x), Variant::Int(y)) => Some(x.cmp(y)),
        (Variant::Bool(x), Variant::Bool(y)) => Some(x.cmp(y)),
        (Variant::String(x) | Variant::StringName(x), Variant::String(y) | Variant::StringName(y)) => {
            Some(x.cmp(y))
        }
        (Variant::Vector2(x1, y1), Variant::Vector2(x2, y2)) => {
            (x1, y1).partial_cmp(&(x2, y2))
        }
        (Variant::Vector3(x1, y1, z1), Variant::Vector3(x2, y2, z2)) => {
            (x1, y1, z1).partial_cmp(&(x2, y2, z2))
        }
        _ => a.as_float()?.partial_cmp(&b.as_float()?),
    }
}

fn arithmetic(
    a: &Variant,
    b: &Variant,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<Variant> {
    use Variant as V;
    match (a, b) {
        (V::Int(x), V::Int(y)) => int_op(*x, *y).map(V::Int),
        (V::Int(_) | V::Float(_), V::Int(_) | V::Float(_)) => {
            Some(V::Float(float_op(a.as_float()?, b.as_float()?)))
        }
        (V::Vector2(x1, y1), V::Vector2(x2, y2)) => {
            Some(V::Vector2(float_op(*x1, *x2), float_op(*y1, *y2)))
        }
        (V::Vector3(x1, y1, z1), V::Vector3(x2, y2, z2)) => Some(V::Vector3(
            float_op(*x1, *x2),
            float_op(*y1, *y2),
            float_op(*z1, *z2),
        )),
        (V::Vector2(x, y), s) => {
            let s = s.as_float()?;
            Some(V::Vector2(float_op(*x, s), float_op(*y, s)))
        }
        (V::Vector3(x, y, z), s) => {
            let s = s.as_float()?;
            Some(V::Vector3(float_op(*x, s), float_op(*y, s), float_op(*z, s)))
        }
        (s, V::Vector2(x, y)) => {
            let s = s.as_float()?;
            Some(V::Vector2(float_op(s, *x), float_op(s, *y)))
        }
        (s, V::Vector3(x, y, z)) => {
            let s = s.as_float()?;
            Some(V::Vector3(float_op(s, *x), float_op(s, *y), float_op(s, *z)))
        }
        _ => None,
    }
}

fn shift(a: &Variant, b: &Variant, op: fn(i64, u32) -> Option<i64>) -> Option<Variant> {
    let amount = u32::try_from(b.as_int()?).ok()?;
    op(a.as_int()?, amount).map(Variant::Int)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_encoding_round_trips() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_index(op.index()), Some(*op));
        }
        assert_eq!(Operator::from_index(Operator::ALL.len() as u32), None);
    }

    #[test]
    fn numeric_result_types() {
        assert_eq!(
            Operator::Add.result_type(VariantType::Int, VariantType::Int),
            Some(VariantType::Int)
        );
        assert_eq!(
            Operator::Add.result_type(VariantType::Int, VariantType::Float),
            Some(VariantType::Float)
        );
        assert_eq!(
            Operator::Add.result_type(VariantType::Int, VariantType::String),
            None
        );
        assert_eq!(
            Operator::Less.result_type(VariantType::Float, VariantType::Int),
            Some(VariantType::Bool)
        );
    }

    #[test]
    fn fold_integer_arithmetic() {
        assert_eq!(
            Operator::Add.evaluate(&Variant::Int(1), &Variant::Int(2)),
            Some(Variant::Int(3))
        );
        assert_eq!(
            Operator::Divide.evaluate(&Variant::Int(7), &Variant::Int(2)),
            Some(Variant::Int(3))
        );
        assert_eq!(Operator::Divide.evaluate(&Variant::Int(1), &Variant::Int(0)), None);
        assert_eq!(
            Operator::Power.evaluate(&Variant::Int(2), &Variant::Int(10)),
            Some(Variant::Int(1024))
        );
    }

    #[test]
    fn fold_mixed_and_strings() {
        assert_eq!(
            Operator::Multiply.evaluate(&Variant::Int(2), &Variant::Float(1.5)),
            Some(Variant::Float(3.0))
        );
        assert_eq!(
            Operator::Add.evaluate(&"a".into(), &"b".into()),
            Some(Variant::String("ab".into()))
        );
        assert_eq!(
            Operator::In.evaluate(&"ell".into(), &"hello".into()),
            Some(Variant::Bool(true))
        );
    }

    #[test]
    fn overflow_is_not_folded() {
        assert_eq!(
            Operator::Add.evaluate(&Variant::Int(i64::MAX), &Variant::Int(1)),
            None
        );
    }
}
