//! Unified error types for BRScript.
//!
//! This module provides the error hierarchy for every phase of script
//! processing after parsing: resolution, type checking, compilation, cache
//! management and runtime dispatch.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ScriptError (top-level wrapper)
//! ├── ResolutionError  - unresolved names, cyclic inheritance, member conflicts
//! ├── TypeError        - incompatible assignment/argument/return, bad operators
//! ├── CompilationError - internal invariant violations in the code generator
//! ├── CacheError       - loading and staging scripts through the cache
//! ├── ReloadError      - hot reload failures
//! └── CallError        - runtime dispatch failures (host call-error channel)
//! ```
//!
//! Resolution and type errors are accumulated as [`Diagnostic`]s by the
//! analyzer; compilation errors abort the compile pass immediately.
//!
//! [`Diagnostic`]: crate::Diagnostic

use thiserror::Error;

use crate::{Diagnostic, Span};

// ============================================================================
// Resolution Errors
// ============================================================================

/// Errors raised while resolving names, types and inheritance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// An identifier could not be found in any scope.
    #[error("at {span}: identifier \"{name}\" not declared in the current scope")]
    UnresolvedIdentifier { name: String, span: Span },

    /// A type name could not be resolved.
    #[error("at {span}: could not find type \"{name}\" in the current scope")]
    UnresolvedType { name: String, span: Span },

    /// The base class named by `extends` does not exist.
    #[error("at {span}: could not resolve base class \"{base}\" of \"{class}\"")]
    MissingBase {
        class: String,
        base: String,
        span: Span,
    },

    /// A class inherits from itself, directly or indirectly.
    #[error("at {span}: class \"{class}\" has a cyclic inheritance chain ({})", .chain.join(" -> "))]
    CyclicInheritance {
        class: String,
        chain: Vec<String>,
        span: Span,
    },

    /// Resolution re-entered a class whose base is still being resolved.
    #[error("at {span}: could not resolve class \"{class}\": cyclic reference")]
    CyclicReference { class: String, span: Span },

    /// A member reuses the name of a member declared in a base script.
    #[error("at {span}: member \"{member}\" redefined (original in base class \"{base}\")")]
    MemberConflictBase {
        member: String,
        base: String,
        span: Span,
    },

    /// A member reuses the name of a member of the native base class.
    #[error("at {span}: member \"{member}\" redefined (original in native class \"{native}\")")]
    MemberConflictNative {
        member: String,
        native: String,
        span: Span,
    },

    /// A member name appears twice in the same class.
    #[error("at {span}: member \"{member}\" is already declared in this class")]
    DuplicateMember { member: String, span: Span },

    /// A class name hides a builtin type, native class or global class.
    #[error("at {span}: class \"{name}\" hides a {kind} with the same name")]
    HidesGlobal {
        name: String,
        kind: String,
        span: Span,
    },

    /// The class was poisoned by an earlier hard error.
    #[error("at {span}: class \"{class}\" is invalid due to earlier errors")]
    InvalidClass { class: String, span: Span },

    /// A dependency script could not be loaded or resolved.
    #[error("at {span}: could not resolve script \"{path}\"")]
    DependencyFailed { path: String, span: Span },

    /// A member lookup on a known type failed.
    #[error("at {span}: cannot find member \"{member}\" in base \"{base}\"")]
    UnknownMember {
        base: String,
        member: String,
        span: Span,
    },

    /// An instance member was used from a static context.
    #[error("at {span}: cannot access instance member \"{member}\" from a static function")]
    InstanceFromStatic { member: String, span: Span },
}

impl ResolutionError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ResolutionError::UnresolvedIdentifier { span, .. }
            | ResolutionError::UnresolvedType { span, .. }
            | ResolutionError::MissingBase { span, .. }
            | ResolutionError::CyclicInheritance { span, .. }
            | ResolutionError::CyclicReference { span, .. }
            | ResolutionError::MemberConflictBase { span, .. }
            | ResolutionError::MemberConflictNative { span, .. }
            | ResolutionError::DuplicateMember { span, .. }
            | ResolutionError::HidesGlobal { span, .. }
            | ResolutionError::InvalidClass { span, .. }
            | ResolutionError::DependencyFailed { span, .. }
            | ResolutionError::UnknownMember { span, .. }
            | ResolutionError::InstanceFromStatic { span, .. } => *span,
        }
    }

    /// Whether this error must poison the class it was raised on.
    pub fn poisons_class(&self) -> bool {
        matches!(
            self,
            ResolutionError::CyclicInheritance { .. }
                | ResolutionError::CyclicReference { .. }
                | ResolutionError::MissingBase { .. }
        )
    }
}

// ============================================================================
// Type Errors
// ============================================================================

/// Errors raised while checking types of declarations and expressions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    /// A value cannot be stored in a target of the declared type.
    #[error("at {span}: cannot assign a value of type \"{found}\" as \"{expected}\"")]
    IncompatibleAssignment {
        expected: String,
        found: String,
        span: Span,
    },

    /// An argument does not match its parameter type.
    #[error("at {span}: invalid argument {index} for \"{function}\": expected \"{expected}\" but got \"{found}\"")]
    IncompatibleArgument {
        function: String,
        index: usize,
        expected: String,
        found: String,
        span: Span,
    },

    /// A returned value does not match the declared return type.
    #[error("at {span}: cannot return a value of type \"{found}\" as \"{expected}\"")]
    IncompatibleReturn {
        expected: String,
        found: String,
        span: Span,
    },

    /// The operator is not defined for the operand types.
    #[error("at {span}: invalid operands {operands} for \"{op}\" operator")]
    InvalidOperator {
        op: String,
        operands: String,
        span: Span,
    },

    /// A call site passes the wrong number of arguments.
    #[error("at {span}: \"{function}\" expects {min}..={max} arguments but {found} were given")]
    ArgumentCount {
        function: String,
        min: usize,
        max: usize,
        found: usize,
        span: Span,
    },

    /// A constant expression was required.
    #[error("at {span}: {context} must be a constant expression")]
    NotConstant { context: String, span: Span },

    /// A cast between incompatible types.
    #[error("at {span}: invalid cast from \"{from}\" to \"{to}\"")]
    InvalidCast { from: String, to: String, span: Span },

    /// The callee is not a function.
    #[error("at {span}: \"{name}\" is not a function")]
    NotCallable { name: String, span: Span },

    /// A `void` function was used as a value.
    #[error("at {span}: function \"{function}\" returns void and cannot be used as a value")]
    VoidValue { function: String, span: Span },

    /// Assignment to a constant or read-only target.
    #[error("at {span}: cannot assign a new value to read-only \"{name}\"")]
    ReadOnlyAssignment { name: String, span: Span },

    /// A function with a declared return type may finish without returning.
    #[error("at {span}: not all code paths of \"{function}\" return a value")]
    MissingReturn { function: String, span: Span },

    /// A malformed or unsupported match pattern.
    #[error("at {span}: {message}")]
    InvalidPattern { message: String, span: Span },

    /// A property accessor has the wrong shape.
    #[error("at {span}: invalid accessor for \"{member}\": {message}")]
    InvalidAccessor {
        member: String,
        message: String,
        span: Span,
    },

    /// A statement or expression is not valid in this context.
    #[error("at {span}: {message}")]
    InvalidContext { message: String, span: Span },
}

impl TypeError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            TypeError::IncompatibleAssignment { span, .. }
            | TypeError::IncompatibleArgument { span, .. }
            | TypeError::IncompatibleReturn { span, .. }
            | TypeError::InvalidOperator { span, .. }
            | TypeError::ArgumentCount { span, .. }
            | TypeError::NotConstant { span, .. }
            | TypeError::InvalidCast { span, .. }
            | TypeError::NotCallable { span, .. }
            | TypeError::VoidValue { span, .. }
            | TypeError::ReadOnlyAssignment { span, .. }
            | TypeError::MissingReturn { span, .. }
            | TypeError::InvalidPattern { span, .. }
            | TypeError::InvalidAccessor { span, .. }
            | TypeError::InvalidContext { span, .. } => *span,
        }
    }
}

// ============================================================================
// Compilation Errors
// ============================================================================

/// Errors raised by the code generator.
///
/// Every variant is a defect in the pipeline, never a user error; user errors
/// are reported by the analyzer before compilation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    /// An invariant of the analyzed tree did not hold.
    #[error("internal compiler error at {span}: {message}")]
    Internal { message: String, span: Span },

    /// The compiler was handed a script that is not fully analyzed.
    #[error("script \"{path}\" is not fully analyzed")]
    InvalidAnalysis { path: String },
}

impl CompilationError {
    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        CompilationError::Internal {
            message: message.into(),
            span,
        }
    }
}

// ============================================================================
// Cache Errors
// ============================================================================

/// Errors raised while staging scripts through the cache.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// No file exists at the path.
    #[error("script file not found: {path}")]
    FileNotFound { path: String },

    /// The file exists but could not be read.
    #[error("cannot read script file {path}: {reason}")]
    CantRead { path: String, reason: String },

    /// The parser reported syntax errors.
    #[error("failed to parse {path} ({} diagnostics)", .diagnostics.len())]
    ParseFailed {
        path: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// The analyzer reported errors.
    #[error("failed to analyze {path} ({} diagnostics)", .diagnostics.len())]
    AnalysisFailed {
        path: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// Code generation failed.
    #[error("failed to compile {path}: {source}")]
    CompilationFailed {
        path: String,
        #[source]
        source: CompilationError,
    },

    /// The script exists but is not valid.
    #[error("script {path} is invalid")]
    InvalidScript { path: String },
}

impl CacheError {
    /// Diagnostics attached to the error, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CacheError::ParseFailed { diagnostics, .. }
            | CacheError::AnalysisFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

// ============================================================================
// Reload Errors
// ============================================================================

/// Errors raised by a hot reload.
#[derive(Debug, Clone, Error)]
pub enum ReloadError {
    /// Instances are alive and the reload did not ask to keep state.
    #[error("cannot reload {path}: {count} live instance(s) and keep_state is off")]
    InUse { path: String, count: usize },

    /// The pipeline failed; the previous version stays live.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The base script's layout no longer matches the compiled class.
    #[error("cannot link {path}: base script {base} changed, recompile required")]
    Link { path: String, base: String },
}

// ============================================================================
// Call Errors
// ============================================================================

/// Runtime dispatch failures, reported through the host call-error channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// No method with this name exists on the object.
    #[error("invalid method \"{method}\"")]
    InvalidMethod { method: String },

    /// More arguments than the method accepts.
    #[error("too many arguments for \"{method}\": expected at most {expected}, got {found}")]
    TooManyArguments {
        method: String,
        expected: usize,
        found: usize,
    },

    /// Fewer arguments than the method requires.
    #[error("too few arguments for \"{method}\": expected at least {expected}, got {found}")]
    TooFewArguments {
        method: String,
        expected: usize,
        found: usize,
    },

    /// An argument could not be converted to the parameter type.
    #[error("invalid argument {index} for \"{method}\": expected {expected}")]
    InvalidArgument {
        method: String,
        index: usize,
        expected: String,
    },

    /// The receiver was null or already freed.
    #[error("instance is null")]
    InstanceIsNull,

    /// The executor reported a failure while running the function.
    #[error("error executing \"{method}\": {message}")]
    Execution { method: String, message: String },
}

// ============================================================================
// Top-level
// ============================================================================

/// Top-level error type wrapping every phase.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Reload(#[from] ReloadError),
    #[error(transparent)]
    Call(#[from] CallError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_inheritance_names_chain() {
        let err = ResolutionError::CyclicInheritance {
            class: "A".into(),
            chain: vec!["A".into(), "B".into(), "A".into()],
            span: Span::new(1, 1, 7),
        };
        let text = err.to_string();
        assert!(text.contains("\"A\""));
        assert!(text.contains("A -> B -> A"));
        assert!(err.poisons_class());
    }

    #[test]
    fn span_accessors() {
        let span = Span::new(4, 2, 3);
        let err = TypeError::NotConstant {
            context: "constant initializer".into(),
            span,
        };
        assert_eq!(err.span(), span);
        assert!(err.to_string().starts_with("at 4:2"));
    }

    #[test]
    fn wrapping_into_script_error() {
        let err: ScriptError = CallError::InvalidMethod {
            method: "foo".into(),
        }
        .into();
        assert!(matches!(err, ScriptError::Call(_)));
    }
}
