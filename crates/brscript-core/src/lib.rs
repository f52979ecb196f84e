//! Core types shared by the BRScript crates.
//!
//! This crate is the foundation of the pipeline: source spans, diagnostics,
//! the error hierarchy, the tagged value model, the host operator table, the
//! Type Descriptor and the reflective descriptors exchanged with the host.
//!
//! ## Modules
//!
//! - [`span`]: line/column tracking
//! - [`diagnostics`]: accumulated analyzer diagnostics and warning codes
//! - [`error`]: error enums for every phase
//! - [`variant`]: the universal tagged value
//! - [`object`]: host object handles
//! - [`operator`]: operator validity, result types and evaluation
//! - [`data_type`]: the Type Descriptor
//! - [`info`]: method/property descriptors and capability flags
//! - [`settings`]: configuration passed to every stage

pub mod data_type;
pub mod diagnostics;
pub mod error;
pub mod info;
pub mod object;
pub mod operator;
pub mod settings;
pub mod span;
pub mod variant;

pub use data_type::{ClassKey, DataType, EnumValues, TypeKind, TypeSource};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity, WarningCode, WarningLevel};
pub use error::{
    CacheError, CallError, CompilationError, ReloadError, ResolutionError, ScriptError, TypeError,
};
pub use info::{ClassCapabilities, MethodFlags, MethodInfo, PropertyInfo, PropertyUsage};
pub use object::{AttachedInstance, HostObject, ObjectId, ObjectRef};
pub use operator::Operator;
pub use settings::{ScriptProperty, ScriptSettings};
pub use span::Span;
pub use variant::{Array, Callable, CustomCallable, Dictionary, SignalRef, Variant, VariantType};
