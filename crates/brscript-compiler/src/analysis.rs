//! Analysis results attached to a parsed tree.
//!
//! The analyzer never mutates the AST. It records what it learns in side
//! tables keyed by [`ClassId`] and [`NodeId`]:
//!
//! - [`ClassAnalysis`]: per-class inheritance state, resolved members and
//!   capability flags, readable by other scripts while resolution is still
//!   in progress
//! - [`ExprInfo`]: the type, folded value and resolution of each expression
//! - [`DeclInfo`]: the type of each local declaration
//! - [`FunctionAnalysis`]: signatures, captures and `self` usage of
//!   functions and lambdas

use std::collections::BTreeSet;

use brscript_core::{
    ClassCapabilities, ClassKey, DataType, MethodFlags, MethodInfo, PropertyInfo, Span, Variant,
    VariantType,
};
use brscript_parser::ast::NodeId;
use rustc_hash::FxHashMap;

// ============================================================================
// Classes
// ============================================================================

/// Progress of base type resolution for one class.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InheritanceState {
    #[default]
    Unresolved,
    /// The cycle sentinel: the base is being resolved right now.
    Resolving,
    Resolved,
    /// Poisoned by a hard error; later stages refuse the class.
    Invalid,
}

/// Per-class stage beyond inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ClassStage {
    #[default]
    Inheritance,
    InterfaceResolving,
    InterfaceSolved,
    BodyResolving,
    BodySolved,
}

/// What the analyzer knows about one class.
#[derive(Debug, Clone)]
pub struct ClassAnalysis {
    pub key: ClassKey,
    pub inheritance: InheritanceState,
    /// Native or script class type of the base; `Resolving` while the
    /// inheritance stage runs.
    pub base: DataType,
    /// Root native class of the inheritance chain.
    pub native_base: Option<String>,
    pub stage: ClassStage,
    pub members: FxHashMap<String, MemberInfo>,
    pub capabilities: ClassCapabilities,
}

impl ClassAnalysis {
    pub fn new(key: ClassKey) -> Self {
        Self {
            key,
            inheritance: InheritanceState::Unresolved,
            base: DataType::unresolved(),
            native_base: None,
            stage: ClassStage::Inheritance,
            members: FxHashMap::default(),
            capabilities: ClassCapabilities::empty(),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.inheritance == InheritanceState::Invalid
    }

    /// The meta type referring to this class.
    pub fn meta_type(&self) -> DataType {
        DataType::class(self.key.clone()).meta()
    }
}

// ============================================================================
// Members
// ============================================================================

/// The role of a resolved class member.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Variable {
        is_static: bool,
        getter: Option<String>,
        setter: Option<String>,
        exported: bool,
    },
    Constant,
    Signal,
    Enum,
    EnumValue,
    Function,
    Class,
}

/// A resolved class member.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub name: String,
    pub kind: MemberKind,
    pub data_type: DataType,
    /// Folded value of constants, enums and enum values.
    pub value: Option<Variant>,
    /// Signature of functions and signals.
    pub signature: Option<FunctionSignature>,
    /// Index into the class node's member list.
    pub member_index: usize,
    pub span: Span,
}

impl MemberInfo {
    pub fn is_instance_variable(&self) -> bool {
        matches!(
            self.kind,
            MemberKind::Variable {
                is_static: false,
                ..
            }
        )
    }

    pub fn is_static_variable(&self) -> bool {
        matches!(self.kind, MemberKind::Variable { is_static: true, .. })
    }

    /// Whether the member is usable without an instance.
    pub fn is_static(&self) -> bool {
        match &self.kind {
            MemberKind::Variable { is_static, .. } => *is_static,
            MemberKind::Function => self.signature.as_ref().is_some_and(|sig| sig.is_static),
            MemberKind::Signal => false,
            _ => true,
        }
    }
}

/// A resolved function or signal signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<(String, DataType)>,
    pub default_count: usize,
    pub return_type: DataType,
    pub is_static: bool,
    pub is_coroutine: bool,
    pub is_vararg: bool,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            default_count: 0,
            return_type: DataType::variant(),
            is_static: false,
            is_coroutine: false,
            is_vararg: false,
        }
    }

    pub fn min_arguments(&self) -> usize {
        self.params.len().saturating_sub(self.default_count)
    }

    /// Build a signature from a host method descriptor.
    pub fn from_method_info(info: &MethodInfo) -> Self {
        Self {
            name: info.name.clone(),
            params: info
                .arguments
                .iter()
                .map(|arg| (arg.name.clone(), property_data_type(arg)))
                .collect(),
            default_count: info.default_argument_count,
            return_type: property_data_type(&info.return_value),
            is_static: info.is_static(),
            is_coroutine: info.flags.contains(MethodFlags::COROUTINE),
            is_vararg: info.is_vararg(),
        }
    }

    /// The host descriptor for this signature.
    pub fn to_method_info(&self) -> MethodInfo {
        let mut flags = MethodFlags::NORMAL;
        if self.is_static {
            flags |= MethodFlags::STATIC;
        }
        if self.is_coroutine {
            flags |= MethodFlags::COROUTINE;
        }
        if self.is_vararg {
            flags |= MethodFlags::VARARG;
        }
        let mut info = MethodInfo::new(self.name.clone())
            .with_return(PropertyInfo::from_data_type("", &self.return_type))
            .with_defaults(self.default_count)
            .with_flags(flags);
        for (name, ty) in &self.params {
            info = info.with_argument(PropertyInfo::from_data_type(name.clone(), ty));
        }
        info
    }
}

/// Type descriptor for a host property descriptor.
pub fn property_data_type(info: &PropertyInfo) -> DataType {
    match info.ty {
        VariantType::Nil if info.class_name.is_empty() => DataType::variant(),
        VariantType::Object if !info.class_name.is_empty() => DataType::native(info.class_name.clone()),
        VariantType::Object => DataType::variant(),
        ty => DataType::builtin(ty),
    }
}

// ============================================================================
// Expressions and declarations
// ============================================================================

/// What an identifier or attribute resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierSource {
    /// A parameter, local variable, local constant, loop variable or
    /// pattern binding, identified by its declaration.
    Local { decl: NodeId, kind: LocalKind },
    MemberVariable { owner: ClassKey, name: String },
    StaticVariable { owner: ClassKey, name: String },
    /// Constants, enums, enum values and nested classes.
    MemberConstant { owner: ClassKey, name: String },
    MemberFunction { owner: ClassKey, name: String, is_static: bool },
    MemberSignal { owner: ClassKey, name: String },
    NativeProperty { class: String },
    NativeMethod { class: String },
    NativeSignal { class: String },
    NativeConstant { class: String },
    ScriptClass(ClassKey),
    NativeClass(String),
    BuiltinType(VariantType),
    Singleton(String),
    GlobalConstant,
    UtilityFunction,
}

impl IdentifierSource {
    /// Whether reading this requires an instance.
    pub fn needs_instance(&self) -> bool {
        matches!(
            self,
            IdentifierSource::MemberVariable { .. }
                | IdentifierSource::MemberFunction {
                    is_static: false,
                    ..
                }
                | IdentifierSource::MemberSignal { .. }
                | IdentifierSource::NativeProperty { .. }
                | IdentifierSource::NativeMethod { .. }
                | IdentifierSource::NativeSignal { .. }
        )
    }
}

/// Kinds of local declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Parameter(usize),
    Variable,
    Constant,
    ForVariable,
    PatternBind,
}

/// How a call expression dispatches.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// A function of the current script chain called on `self` (or the
    /// script itself for static functions).
    SelfFunction { name: String, is_static: bool },
    /// `super.name()`: the base implementation.
    Super { name: String },
    /// A script method on another object of known script type.
    ScriptMethod {
        name: String,
        is_static: bool,
        on_instance: bool,
    },
    /// A host method. `exact` is set when the receiver's native class and the
    /// arity are statically known, enabling a direct method bind.
    NativeMethod { class: String, name: String, exact: bool },
    /// A method of a builtin value type.
    BuiltinMethod { ty: VariantType, name: String },
    Utility { name: String },
    /// `int(x)`, `Array()`, ...
    BuiltinConstructor(VariantType),
    /// `Class.new()`
    Constructor,
    /// Calling a callable value (`callable.call(...)` or a lambda variable).
    CallableValue,
    /// The receiver type is unknown; dispatch by name at runtime.
    Dynamic { name: String },
}

/// Everything recorded for one expression or pattern node.
#[derive(Debug, Clone, Default)]
pub struct ExprInfo {
    pub data_type: DataType,
    /// The folded value when the expression is constant.
    pub value: Option<Variant>,
    pub source: Option<IdentifierSource>,
    pub call: Option<CallTarget>,
    /// Set when a statically typed check had to be deferred to runtime.
    pub is_unsafe: bool,
}

impl ExprInfo {
    pub fn typed(data_type: DataType) -> Self {
        Self {
            data_type,
            ..Default::default()
        }
    }

    pub fn constant(data_type: DataType, value: Variant) -> Self {
        Self {
            data_type,
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn is_constant(&self) -> bool {
        self.value.is_some()
    }
}

/// A local declaration's resolved type.
#[derive(Debug, Clone)]
pub struct DeclInfo {
    pub name: String,
    pub data_type: DataType,
    pub kind: LocalKind,
    /// Folded value of local constants.
    pub value: Option<Variant>,
    pub usages: u32,
    pub span: Span,
}

/// A variable captured by a lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub decl: NodeId,
    pub data_type: DataType,
}

/// Per-function facts discovered during body resolution.
#[derive(Debug, Clone)]
pub struct FunctionAnalysis {
    pub signature: FunctionSignature,
    /// Locals of enclosing functions used by this lambda, in first-use order.
    pub captures: Vec<Capture>,
    /// Whether the body (or a nested lambda) touches the instance.
    pub uses_self: bool,
    pub is_lambda: bool,
}

/// The per-unit side tables filled by the body stage.
#[derive(Debug, Default)]
pub struct BodyTables {
    pub exprs: FxHashMap<NodeId, ExprInfo>,
    pub decls: FxHashMap<NodeId, DeclInfo>,
    pub functions: FxHashMap<NodeId, FunctionAnalysis>,
    /// Tested type of each `is` expression.
    pub type_tests: FxHashMap<NodeId, DataType>,
    /// Lines of statements that contain unsafe operations.
    pub unsafe_lines: BTreeSet<u32>,
}

impl BodyTables {
    pub fn expr(&self, id: NodeId) -> Option<&ExprInfo> {
        self.exprs.get(&id)
    }

    pub fn expr_type(&self, id: NodeId) -> DataType {
        self.exprs
            .get(&id)
            .map(|info| info.data_type.clone())
            .unwrap_or_else(DataType::variant)
    }

    pub fn decl(&self, id: NodeId) -> Option<&DeclInfo> {
        self.decls.get(&id)
    }

    pub fn function(&self, id: NodeId) -> Option<&FunctionAnalysis> {
        self.functions.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips_through_method_info() {
        let mut signature = FunctionSignature::new("heal");
        signature
            .params
            .push(("amount".to_string(), DataType::builtin(VariantType::Int)));
        signature.return_type = DataType::builtin(VariantType::Bool);
        signature.is_static = true;
        let info = signature.to_method_info();
        assert!(info.is_static());
        assert_eq!(info.arguments[0].ty, VariantType::Int);
        assert_eq!(FunctionSignature::from_method_info(&info), signature);
    }

    #[test]
    fn static_members() {
        let member = MemberInfo {
            name: "count".to_string(),
            kind: MemberKind::Variable {
                is_static: true,
                getter: None,
                setter: None,
                exported: false,
            },
            data_type: DataType::builtin(VariantType::Int),
            value: None,
            signature: None,
            member_index: 0,
            span: Span::default(),
        };
        assert!(member.is_static());
        assert!(member.is_static_variable());
        assert!(!member.is_instance_variable());
    }
}
