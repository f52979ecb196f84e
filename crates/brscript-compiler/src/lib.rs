//! BRScript Compiler
//!
//! Semantic analysis and bytecode generation for BRScript files.
//!
//! ## Architecture
//!
//! Every script file is a [`ScriptUnit`] that climbs a status ladder as its
//! analysis progresses:
//!
//! ```text
//! Empty -> Parsed -> InheritanceSolved -> InterfaceSolved -> FullySolved
//! ```
//!
//! Units reach other files through a [`UnitProvider`], normally the script
//! cache, so resolving one file raises its dependencies only as far as it
//! needs. A fully solved unit is lowered by the [`Compiler`] into a
//! [`CompiledScript`].
//!
//! ## Modules
//!
//! - [`unit`]: per-file analysis state and the status ladder
//! - [`analyzer`]: inheritance, interface and body resolution
//! - [`analysis`]: the facts recorded by the analyzer
//! - [`scope`]: block-structured local scopes and lambda captures
//! - [`codegen`]: instruction set, bytecode chunks and constant pools
//! - [`compiler`]: lowering of analyzed units to bytecode
//! - [`compiled`]: the compiler's output

pub mod analysis;
pub mod analyzer;
pub mod codegen;
pub mod compiled;
pub mod compiler;
pub mod scope;
pub mod unit;

pub use analysis::{
    BodyTables, CallTarget, ClassAnalysis, ExprInfo, FunctionAnalysis, FunctionSignature, IdentifierSource,
    MemberInfo, MemberKind,
};
pub use codegen::{Address, BytecodeChunk, Constant, ConstantPool, Instruction, OpCode};
pub use compiled::{CompiledBase, CompiledClass, CompiledFunction, CompiledScript, MemberSlot};
pub use compiler::{Compiler, IMPLICIT_INITIALIZER, STATIC_INITIALIZER};
pub use scope::{LocalScope, VarLookup};
pub use unit::{ScriptUnit, UnitProvider, UnitStatus};

// Re-export CompilationError from core for convenience
pub use brscript_core::CompilationError;
