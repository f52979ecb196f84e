//! The seam to the bytecode virtual machine.
//!
//! Executing instructions is the host's business. The runtime hands every
//! compiled function it needs to run (initializers, accessors, methods,
//! lambdas) to a [`FunctionExecutor`] together with the class it belongs to
//! and the instance bound as `self`.

use std::sync::Arc;

use brscript_compiler::CompiledFunction;
use brscript_core::{CallError, Variant};

use crate::{Script, ScriptInstance};

/// One invocation of a compiled function.
pub struct FunctionCall<'a> {
    pub function: &'a Arc<CompiledFunction>,
    /// Class whose constants, statics and lambdas the function addresses.
    pub script: &'a Arc<Script>,
    /// `self`; `None` for static functions and static initializers.
    pub instance: Option<&'a Arc<ScriptInstance>>,
    /// Captured values of a lambda followed by the call arguments.
    pub arguments: &'a [Variant],
    /// Nesting limit from the settings; deeper calls should fail.
    pub max_call_depth: usize,
}

impl FunctionCall<'_> {
    /// Number of arguments passed by the caller, captures excluded.
    pub fn argument_count(&self) -> usize {
        self.arguments.len().saturating_sub(self.function.capture_count)
    }

    /// Offset the function starts at for this call.
    pub fn entry_offset(&self) -> usize {
        self.function.entry_offset(self.argument_count())
    }
}

/// Runs compiled functions.
pub trait FunctionExecutor: Send + Sync {
    fn execute(&self, call: FunctionCall<'_>) -> Result<Variant, CallError>;
}

/// Executor of hosts that only analyze and compile.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExecutor;

impl FunctionExecutor for NullExecutor {
    fn execute(&self, call: FunctionCall<'_>) -> Result<Variant, CallError> {
        Err(CallError::Execution {
            method: call.function.name.clone(),
            message: "no executor is installed".to_string(),
        })
    }
}
