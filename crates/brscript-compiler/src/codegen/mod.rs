//! Code generation primitives.
//!
//! - [`OpCode`] and [`Address`]: the instruction set and its storage operands
//! - [`BytecodeChunk`]: the instruction stream of one function
//! - [`Constant`] and [`ConstantPool`]: per-function constant storage

mod chunk;
mod constant;
mod opcode;

pub use chunk::{BytecodeChunk, Instruction};
pub use constant::{Constant, ConstantPool};
pub use opcode::{Address, OpCode, OperandShape};
