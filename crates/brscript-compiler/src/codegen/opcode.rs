//! Instruction set of compiled BRScript functions.
//!
//! Every instruction is one opcode byte followed by 32-bit operand words.
//! Operands that name storage are encoded [`Address`]es; the others are
//! constant-pool indices, counts or absolute code offsets.

use std::fmt;

/// Operation codes.
///
/// Instructions read and write addresses directly instead of going through
/// an operand stack. `dst` is always the first operand of an instruction
/// that produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Assignment
    // =========================================================================
    /// `dst = src`
    /// Operands: dst, src
    Assign = 0,
    /// `dst = src`, converting or rejecting values that do not fit the type.
    /// Operands: dst, src, type constant
    AssignTyped,

    // =========================================================================
    // Operators
    // =========================================================================
    /// `dst = a op b`; unary operators ignore `b`.
    /// Operands: dst, a, b, operator index
    Operator,
    /// `dst = value is Type`
    /// Operands: dst, value, type constant
    TypeTest,
    /// `dst = value as Type`
    /// Operands: dst, value, type constant
    Cast,
    /// `dst = same builtin type and a == b`, used by match patterns.
    /// Operands: dst, a, b
    MatchEqual,

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// Operand: target offset
    Jump,
    /// Operands: condition, target offset
    JumpIf,
    /// Operands: condition, target offset
    JumpIfNot,
    /// Jump when the value is shared by reference (object, array,
    /// dictionary), skipping a write-back into its container.
    /// Operands: value, target offset
    JumpIfShared,
    /// Operand: value
    Return,
    /// Operands: condition, message
    Assert,

    // =========================================================================
    // Construction
    // =========================================================================
    /// Operands: dst, type constant, count, elements...
    ConstructArray,
    /// Operands: dst, type constant, count, (key, value)...
    ConstructDictionary,
    /// Builtin type constructor, `int(x)`, `Vector2(1, 2)`.
    /// Operands: dst, type constant, argc, args...
    Construct,
    /// `Class.new(args)` on a script or native class value.
    /// Operands: dst, class, argc, args...
    New,

    // =========================================================================
    // Member Access
    // =========================================================================
    /// `dst = base.name`
    /// Operands: dst, base, name constant
    GetNamed,
    /// `base.name = src`
    /// Operands: base, name constant, src
    SetNamed,
    /// `dst = base[key]`
    /// Operands: dst, base, key
    GetKeyed,
    /// `base[key] = src`
    /// Operands: base, key, src
    SetKeyed,
    /// Operands: dst, class constant, static slot
    GetStatic,
    /// Operands: class constant, static slot, src
    SetStatic,
    /// Singleton, global constant or utility function by name.
    /// Operands: dst, name constant
    GetGlobal,

    // =========================================================================
    // Calls
    // =========================================================================
    /// Dispatch by name on any value.
    /// Operands: dst, base, name constant, argc, args...
    Call,
    /// Direct call of a native method whose class and arity are known.
    /// Operands: dst, base, class constant, name constant, argc, args...
    CallMethodBind,
    /// Static native method.
    /// Operands: dst, class constant, name constant, argc, args...
    CallNativeStatic,
    /// Function of the current script chain on `self`.
    /// Operands: dst, name constant, argc, args...
    CallSelf,
    /// The base implementation of the current function (`super.f()`).
    /// Operands: dst, name constant, argc, args...
    CallSelfBase,
    /// Static function of a script class.
    /// Operands: dst, class constant, name constant, argc, args...
    CallStatic,
    /// Method of a builtin value.
    /// Operands: dst, base, name constant, argc, args...
    CallBuiltin,
    /// Operands: dst, name constant, argc, args...
    CallUtility,
    /// Invoke a callable value.
    /// Operands: dst, callable, argc, args...
    CallCallable,
    /// Suspend until the value (a signal or coroutine state) completes.
    /// Operands: dst, value
    Await,

    // =========================================================================
    // Lambdas
    // =========================================================================
    /// Operands: dst, lambda index, count, captures...
    CreateLambda,
    /// Lambda bound to `self`.
    /// Operands: dst, lambda index, count, captures...
    CreateSelfLambda,

    // =========================================================================
    // Iteration
    // =========================================================================
    /// Start iterating; jumps to `end` when the container is empty.
    /// Operands: state, container, variable, end offset
    IterBegin,
    /// Advance; jumps to `end` when exhausted.
    /// Operands: state, container, variable, end offset
    IterNext,
}

/// Layout of the operand words following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Fixed(usize),
    /// `fixed` words, the last of which counts trailing groups of `stride`
    /// words.
    Counted { fixed: usize, stride: usize },
}

impl OpCode {
    /// Convert from u8, returning None for invalid values.
    pub fn from_u8(value: u8) -> Option<Self> {
        if value <= OpCode::IterNext as u8 {
            // SAFETY: OpCode is repr(u8) with contiguous discriminants and the
            // value is in range.
            Some(unsafe { std::mem::transmute::<u8, OpCode>(value) })
        } else {
            None
        }
    }

    pub fn operand_shape(&self) -> OperandShape {
        use OperandShape::*;
        match self {
            OpCode::Jump | OpCode::Return => Fixed(1),
            OpCode::Assign
            | OpCode::JumpIf
            | OpCode::JumpIfNot
            | OpCode::JumpIfShared
            | OpCode::Assert
            | OpCode::GetGlobal
            | OpCode::Await => Fixed(2),
            OpCode::AssignTyped
            | OpCode::TypeTest
            | OpCode::Cast
            | OpCode::MatchEqual
            | OpCode::GetNamed
            | OpCode::SetNamed
            | OpCode::GetKeyed
            | OpCode::SetKeyed
            | OpCode::GetStatic
            | OpCode::SetStatic => Fixed(3),
            OpCode::Operator | OpCode::IterBegin | OpCode::IterNext => Fixed(4),
            OpCode::ConstructArray
            | OpCode::Construct
            | OpCode::New
            | OpCode::CallSelf
            | OpCode::CallSelfBase
            | OpCode::CallUtility
            | OpCode::CallCallable
            | OpCode::CreateLambda
            | OpCode::CreateSelfLambda => Counted { fixed: 3, stride: 1 },
            OpCode::ConstructDictionary => Counted { fixed: 3, stride: 2 },
            OpCode::Call | OpCode::CallNativeStatic | OpCode::CallStatic | OpCode::CallBuiltin => {
                Counted { fixed: 4, stride: 1 }
            }
            OpCode::CallMethodBind => Counted { fixed: 5, stride: 1 },
        }
    }

    /// Whether the last fixed operand is a jump target.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIf
                | OpCode::JumpIfNot
                | OpCode::JumpIfShared
                | OpCode::IterBegin
                | OpCode::IterNext
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self,
            OpCode::Call
                | OpCode::CallMethodBind
                | OpCode::CallNativeStatic
                | OpCode::CallSelf
                | OpCode::CallSelfBase
                | OpCode::CallStatic
                | OpCode::CallBuiltin
                | OpCode::CallUtility
                | OpCode::CallCallable
        )
    }

    /// Get the name of this opcode for debugging.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Assign => "ASSIGN",
            OpCode::AssignTyped => "ASSIGN_TYPED",
            OpCode::Operator => "OPERATOR",
            OpCode::TypeTest => "TYPE_TEST",
            OpCode::Cast => "CAST",
            OpCode::MatchEqual => "MATCH_EQUAL",
            OpCode::Jump => "JUMP",
            OpCode::JumpIf => "JUMP_IF",
            OpCode::JumpIfNot => "JUMP_IF_NOT",
            OpCode::JumpIfShared => "JUMP_IF_SHARED",
            OpCode::Return => "RETURN",
            OpCode::Assert => "ASSERT",
            OpCode::ConstructArray => "CONSTRUCT_ARRAY",
            OpCode::ConstructDictionary => "CONSTRUCT_DICTIONARY",
            OpCode::Construct => "CONSTRUCT",
            OpCode::New => "NEW",
            OpCode::GetNamed => "GET_NAMED",
            OpCode::SetNamed => "SET_NAMED",
            OpCode::GetKeyed => "GET_KEYED",
            OpCode::SetKeyed => "SET_KEYED",
            OpCode::GetStatic => "GET_STATIC",
            OpCode::SetStatic => "SET_STATIC",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::Call => "CALL",
            OpCode::CallMethodBind => "CALL_METHOD_BIND",
            OpCode::CallNativeStatic => "CALL_NATIVE_STATIC",
            OpCode::CallSelf => "CALL_SELF",
            OpCode::CallSelfBase => "CALL_SELF_BASE",
            OpCode::CallStatic => "CALL_STATIC",
            OpCode::CallBuiltin => "CALL_BUILTIN",
            OpCode::CallUtility => "CALL_UTILITY",
            OpCode::CallCallable => "CALL_CALLABLE",
            OpCode::Await => "AWAIT",
            OpCode::CreateLambda => "CREATE_LAMBDA",
            OpCode::CreateSelfLambda => "CREATE_SELF_LAMBDA",
            OpCode::IterBegin => "ITER_BEGIN",
            OpCode::IterNext => "ITER_NEXT",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Addresses
// =============================================================================

const ADDRESS_BITS: u32 = 29;
const ADDRESS_MASK: u32 = (1 << ADDRESS_BITS) - 1;

/// A storage location read or written by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Function stack: captures, then parameters, then locals and
    /// temporaries.
    Stack(u32),
    /// Entry of the function's constant pool.
    Constant(u32),
    /// Instance member slot of `self`.
    Member(u32),
    /// The instance, or the script itself in static functions.
    SelfRef,
    Nil,
}

impl Address {
    const STACK: u32 = 0;
    const CONSTANT: u32 = 1;
    const MEMBER: u32 = 2;
    const SELF: u32 = 3;
    const NIL: u32 = 4;

    /// Largest index an address can carry.
    pub const MAX_INDEX: u32 = ADDRESS_MASK;

    pub fn encode(&self) -> u32 {
        let (kind, index) = match *self {
            Address::Stack(index) => (Self::STACK, index),
            Address::Constant(index) => (Self::CONSTANT, index),
            Address::Member(index) => (Self::MEMBER, index),
            Address::SelfRef => (Self::SELF, 0),
            Address::Nil => (Self::NIL, 0),
        };
        (kind << ADDRESS_BITS) | (index & ADDRESS_MASK)
    }

    pub fn decode(word: u32) -> Option<Address> {
        let index = word & ADDRESS_MASK;
        match word >> ADDRESS_BITS {
            Self::STACK => Some(Address::Stack(index)),
            Self::CONSTANT => Some(Address::Constant(index)),
            Self::MEMBER => Some(Address::Member(index)),
            Self::SELF => Some(Address::SelfRef),
            Self::NIL => Some(Address::Nil),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Stack(index) => write!(f, "stack({})", index),
            Address::Constant(index) => write!(f, "const({})", index),
            Address::Member(index) => write!(f, "member({})", index),
            Address::SelfRef => f.write_str("self"),
            Address::Nil => f.write_str("nil"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_from_u8() {
        assert_eq!(OpCode::from_u8(0), Some(OpCode::Assign));
        assert_eq!(OpCode::from_u8(OpCode::IterNext as u8), Some(OpCode::IterNext));
        assert_eq!(OpCode::from_u8(OpCode::IterNext as u8 + 1), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn opcode_name() {
        assert_eq!(OpCode::AssignTyped.name(), "ASSIGN_TYPED");
        assert_eq!(OpCode::JumpIfShared.to_string(), "JUMP_IF_SHARED");
    }

    #[test]
    fn operand_shapes() {
        assert_eq!(OpCode::Return.operand_shape(), OperandShape::Fixed(1));
        assert_eq!(OpCode::Operator.operand_shape(), OperandShape::Fixed(4));
        assert_eq!(
            OpCode::ConstructDictionary.operand_shape(),
            OperandShape::Counted { fixed: 3, stride: 2 }
        );
        assert_eq!(
            OpCode::CallMethodBind.operand_shape(),
            OperandShape::Counted { fixed: 5, stride: 1 }
        );
        assert!(OpCode::IterNext.is_jump());
        assert!(OpCode::CallSelfBase.is_call());
        assert!(!OpCode::New.is_call());
    }

    #[test]
    fn addresses_encode_kind_and_index() {
        for address in [
            Address::Stack(7),
            Address::Constant(0),
            Address::Member(Address::MAX_INDEX),
            Address::SelfRef,
            Address::Nil,
        ] {
            assert_eq!(Address::decode(address.encode()), Some(address));
        }
        assert_eq!(Address::decode(7 << ADDRESS_BITS), None);
        assert_ne!(Address::Stack(1).encode(), Address::Member(1).encode());
    }
}
