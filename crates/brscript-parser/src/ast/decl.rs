//! Declaration AST nodes: class members and their parts.
//!
//! Declarations carry builder-style helpers so trees can be assembled
//! fluently, e.g. `builder.var("hp").with_type(builder.ty("int"))`.

use brscript_core::Span;

use super::{ClassId, Expr, Ident, NodeId, Suite};

// ============================================================================
// Types
// ============================================================================

/// A type annotation as written: a dotted chain with optional container
/// element types (`Array[int]`, `Dictionary[String, Node]`, `Outer.Inner`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub chain: Vec<Ident>,
    pub elements: Vec<TypeSpec>,
    pub span: Span,
}

impl TypeSpec {
    /// The first name in the chain.
    pub fn head(&self) -> &str {
        self.chain.first().map(|ident| ident.name.as_str()).unwrap_or("")
    }

    pub fn is_void(&self) -> bool {
        self.chain.len() == 1 && self.head() == "void"
    }

    /// The dotted name, without element types.
    pub fn dotted(&self) -> String {
        self.chain
            .iter()
            .map(|ident| ident.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

// ============================================================================
// Class-level declarations
// ============================================================================

/// A class member, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Variable(VariableDecl),
    Constant(ConstantDecl),
    Signal(SignalDecl),
    /// A named enum.
    Enum(EnumDecl),
    /// A value of an unnamed enum, visible as a class constant.
    EnumValue(EnumValueDecl),
    Function(FunctionDecl),
    /// A nested class, stored in the tree's class arena.
    Class { id: ClassId, name: Ident },
    /// An export group annotation.
    Group(Ident),
}

impl Member {
    /// The name the member is looked up by. Unnamed enums and groups have none.
    pub fn name(&self) -> Option<&str> {
        match self {
            Member::Variable(decl) => Some(&decl.name.name),
            Member::Constant(decl) => Some(&decl.name.name),
            Member::Signal(decl) => Some(&decl.name.name),
            Member::Enum(decl) => decl.name.as_ref().map(|name| name.name.as_str()),
            Member::EnumValue(decl) => Some(&decl.name.name),
            Member::Function(decl) => Some(&decl.name.name),
            Member::Class { name, .. } => Some(&name.name),
            Member::Group(_) => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Member::Variable(decl) => decl.span,
            Member::Constant(decl) => decl.span,
            Member::Signal(decl) => decl.span,
            Member::Enum(decl) => decl.span,
            Member::EnumValue(decl) => decl.span,
            Member::Function(decl) => decl.span,
            Member::Class { name, .. } => name.span,
            Member::Group(name) => name.span,
        }
    }

    /// A short description used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Member::Variable(_) => "variable",
            Member::Constant(_) => "constant",
            Member::Signal(_) => "signal",
            Member::Enum(_) => "enum",
            Member::EnumValue(_) => "enum value",
            Member::Function(_) => "function",
            Member::Class { .. } => "class",
            Member::Group(_) => "group",
        }
    }
}

/// Property accessors of a variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Accessors {
    #[default]
    None,
    /// `get: return x` / `set(value): x = value` bodies.
    Inline {
        getter: Option<Box<FunctionDecl>>,
        setter: Option<Box<FunctionDecl>>,
    },
    /// `get = get_hp, set = set_hp`
    Named {
        getter: Option<Ident>,
        setter: Option<Ident>,
    },
}

impl Accessors {
    pub fn is_none(&self) -> bool {
        matches!(self, Accessors::None)
    }
}

/// `var name: T = value` as a class member or local.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub id: NodeId,
    pub name: Ident,
    pub ty: Option<TypeSpec>,
    /// `:=` infers a hard type from the initializer.
    pub infer: bool,
    pub initializer: Option<Expr>,
    pub is_static: bool,
    pub accessors: Accessors,
    pub exported: bool,
    pub span: Span,
}

impl VariableDecl {
    pub fn with_type(mut self, ty: TypeSpec) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_initializer(mut self, value: Expr) -> Self {
        self.initializer = Some(value);
        self
    }

    /// `var x := value`
    pub fn inferred(mut self, value: Expr) -> Self {
        self.infer = true;
        self.initializer = Some(value);
        self
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    pub fn with_accessors(mut self, accessors: Accessors) -> Self {
        self.accessors = accessors;
        self
    }
}

/// `const NAME: T = value`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDecl {
    pub id: NodeId,
    pub name: Ident,
    pub ty: Option<TypeSpec>,
    pub initializer: Expr,
    pub span: Span,
}

impl ConstantDecl {
    pub fn with_type(mut self, ty: TypeSpec) -> Self {
        self.ty = Some(ty);
        self
    }
}

/// `signal name(a: int, b)`
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecl {
    pub id: NodeId,
    pub name: Ident,
    pub params: Vec<ParameterDecl>,
    pub span: Span,
}

/// `enum Name { A, B = 3 }`; the name is absent for unnamed enums.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub id: NodeId,
    pub name: Option<Ident>,
    pub values: Vec<EnumValueDecl>,
    pub span: Span,
}

/// One enum value. Without an explicit value it is the previous value + 1.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    pub id: NodeId,
    pub name: Ident,
    pub value: Option<Expr>,
    /// Member index of the preceding value of an unnamed enum.
    pub previous: Option<usize>,
    pub span: Span,
}

/// A function, method, accessor body or lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub name: Ident,
    pub params: Vec<ParameterDecl>,
    pub return_type: Option<TypeSpec>,
    pub body: Suite,
    pub is_static: bool,
    pub span: Span,
}

impl FunctionDecl {
    pub fn returns(mut self, ty: TypeSpec) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Number of trailing parameters with default values.
    pub fn default_count(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_some()).count()
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDecl {
    pub id: NodeId,
    pub name: Ident,
    pub ty: Option<TypeSpec>,
    /// `name := default`
    pub infer: bool,
    pub default: Option<Expr>,
    pub span: Span,
}

impl ParameterDecl {
    pub fn with_type(mut self, ty: TypeSpec) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_default(mut self, value: Expr) -> Self {
        self.default = Some(value);
        self
    }

    pub fn inferred(mut self, value: Expr) -> Self {
        self.infer = true;
        self.default = Some(value);
        self
    }
}
