//! The Type Descriptor attached to declarations and expressions.
//!
//! A [`DataType`] is a tagged union over the kinds of static types the
//! analyzer understands, plus the transient markers it uses while resolving:
//!
//! - [`TypeKind::Variant`]: dynamic "any"
//! - [`TypeKind::Builtin`]: a builtin value type, with optional container
//!   element types (`Array[int]`, `Dictionary[String, int]`)
//! - [`TypeKind::Native`]: a host class from the registry
//! - [`TypeKind::Class`]: a script class, possibly nested or in another file
//! - [`TypeKind::Enum`]: an enum with its ordered values and owner tag
//! - [`TypeKind::Unresolved`]: nothing is known yet
//! - [`TypeKind::Resolving`]: the cycle sentinel; never a final type
//!
//! Orthogonal flags record whether the type is enforced (hard) or only
//! inferred, whether it denotes the type itself (meta) and whether values
//! of this type are read-only.

use std::fmt;
use std::sync::Arc;

use crate::{Array, Dictionary, Variant, VariantType};

/// Identity of a script class: the file it lives in and its fully qualified
/// name inside that file.
#[derive(Clone)]
pub struct ClassKey {
    /// Path of the owning script file.
    pub path: Arc<str>,
    /// Fully qualified class name (`path` for the head, `path::Inner` for nested).
    pub fqcn: Arc<str>,
    /// Display name (`class_name` or the nested class identifier).
    pub name: Arc<str>,
    /// Index of the class in its file's class arena.
    pub index: u32,
}

impl ClassKey {
    pub fn new(path: &str, fqcn: &str, name: &str, index: u32) -> Self {
        Self {
            path: Arc::from(path),
            fqcn: Arc::from(fqcn),
            name: Arc::from(name),
            index,
        }
    }

    /// Whether this is the head (file-level) class of its script.
    pub fn is_head(&self) -> bool {
        self.index == 0
    }
}

impl PartialEq for ClassKey {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.fqcn == other.fqcn
    }
}

impl Eq for ClassKey {}

impl std::hash::Hash for ClassKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.fqcn.hash(state);
    }
}

impl fmt::Debug for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqcn)
    }
}

/// Values of an enum, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumValues(pub Vec<(String, i64)>);

impl EnumValues {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn contains_value(&self, value: i64) -> bool {
        self.0.iter().any(|(_, v)| *v == value)
    }

    /// The enum as a constant dictionary of name to value.
    pub fn to_dictionary(&self) -> Dictionary {
        let dict = Dictionary::new();
        for (name, value) in &self.0 {
            dict.insert(Variant::String(name.clone()), Variant::Int(*value));
        }
        dict.make_read_only();
        dict
    }
}

/// The kind of a Type Descriptor.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Variant,
    Builtin {
        ty: VariantType,
        elements: Vec<DataType>,
    },
    Native {
        class: String,
    },
    Class(ClassKey),
    Enum {
        name: String,
        /// Native class name or class FQCN the enum belongs to.
        owner: String,
        values: Arc<EnumValues>,
    },
    Unresolved,
    Resolving,
}

/// How the type was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TypeSource {
    /// Nothing is known about where the type came from.
    #[default]
    Undetected,
    /// Inferred from usage, not enforced.
    Inferred,
    /// Inferred from a hard-typed initializer with `:=`.
    AnnotatedInferred,
    /// Written in source.
    AnnotatedExplicit,
}

/// A resolved or partially resolved static type.
#[derive(Debug, Clone)]
pub struct DataType {
    pub kind: TypeKind,
    pub source: TypeSource,
    /// Denotes the type itself rather than an instance of it.
    pub is_meta: bool,
    pub is_read_only: bool,
}

impl Default for DataType {
    fn default() -> Self {
        Self::unresolved()
    }
}

impl DataType {
    fn with_kind(kind: TypeKind) -> Self {
        Self {
            kind,
            source: TypeSource::Undetected,
            is_meta: false,
            is_read_only: false,
        }
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    /// Dynamic "any", inferred.
    pub fn variant() -> Self {
        Self::with_kind(TypeKind::Variant)
    }

    pub fn unresolved() -> Self {
        Self::with_kind(TypeKind::Unresolved)
    }

    /// The cycle sentinel.
    pub fn resolving() -> Self {
        Self::with_kind(TypeKind::Resolving)
    }

    /// A builtin type. Hard by default since builtins come from annotations
    /// or literals.
    pub fn builtin(ty: VariantType) -> Self {
        Self::with_kind(TypeKind::Builtin {
            ty,
            elements: Vec::new(),
        })
        .hard()
    }

    pub fn typed_array(element: DataType) -> Self {
        Self::with_kind(TypeKind::Builtin {
            ty: VariantType::Array,
            elements: vec![element],
        })
        .hard()
    }

    pub fn typed_dictionary(key: DataType, value: DataType) -> Self {
        Self::with_kind(TypeKind::Builtin {
            ty: VariantType::Dictionary,
            elements: vec![key, value],
        })
        .hard()
    }

    pub fn native(class: impl Into<String>) -> Self {
        Self::with_kind(TypeKind::Native {
            class: class.into(),
        })
        .hard()
    }

    pub fn class(key: ClassKey) -> Self {
        Self::with_kind(TypeKind::Class(key)).hard()
    }

    pub fn enumeration(name: impl Into<String>, owner: impl Into<String>, values: Arc<EnumValues>) -> Self {
        Self::with_kind(TypeKind::Enum {
            name: name.into(),
            owner: owner.into(),
            values,
        })
        .hard()
    }

    /// Nil literal type.
    pub fn nil() -> Self {
        Self::builtin(VariantType::Nil)
    }

    // ========================================================================
    // Flag Builders
    // ========================================================================

    pub fn hard(mut self) -> Self {
        self.source = TypeSource::AnnotatedExplicit;
        self
    }

    pub fn inferred(mut self) -> Self {
        self.source = TypeSource::Inferred;
        self
    }

    pub fn with_source(mut self, source: TypeSource) -> Self {
        self.source = source;
        self
    }

    pub fn meta(mut self) -> Self {
        self.is_meta = true;
        self
    }

    /// The instance type of a meta type.
    pub fn instance(mut self) -> Self {
        self.is_meta = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether the type is enforced at compile time.
    pub fn is_hard(&self) -> bool {
        self.source > TypeSource::Inferred && self.is_set()
    }

    /// Whether a concrete type is known (not unresolved/resolving).
    pub fn is_set(&self) -> bool {
        !matches!(self.kind, TypeKind::Unresolved | TypeKind::Resolving)
    }

    pub fn is_variant(&self) -> bool {
        matches!(self.kind, TypeKind::Variant)
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self.kind, TypeKind::Resolving)
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.kind, TypeKind::Unresolved)
    }

    /// Whether the type is `void` (builtin nil used as a return type).
    pub fn is_void(&self) -> bool {
        self.builtin_type() == Some(VariantType::Nil) && self.is_hard()
    }

    pub fn builtin_type(&self) -> Option<VariantType> {
        match &self.kind {
            TypeKind::Builtin { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    pub fn is_builtin(&self, ty: VariantType) -> bool {
        self.builtin_type() == Some(ty) && !self.is_meta
    }

    pub fn element_type(&self, index: usize) -> Option<&DataType> {
        match &self.kind {
            TypeKind::Builtin { elements, .. } => elements.get(index),
            _ => None,
        }
    }

    pub fn has_element_type(&self, index: usize) -> bool {
        self.element_type(index).is_some()
    }

    pub fn class_key(&self) -> Option<&ClassKey> {
        match &self.kind {
            TypeKind::Class(key) => Some(key),
            _ => None,
        }
    }

    pub fn native_class(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Native { class } => Some(class),
            _ => None,
        }
    }

    pub fn enum_values(&self) -> Option<&EnumValues> {
        match &self.kind {
            TypeKind::Enum { values, .. } => Some(values),
            _ => None,
        }
    }

    /// Whether values of this type are objects.
    pub fn is_object_type(&self) -> bool {
        matches!(self.kind, TypeKind::Native { .. } | TypeKind::Class(_)) && !self.is_meta
    }

    /// Whether values of this type are shared by reference. `None` when the
    /// type is not statically known.
    pub fn is_shared(&self) -> Option<bool> {
        if self.is_meta {
            return Some(true);
        }
        match &self.kind {
            TypeKind::Builtin { ty, .. } => Some(ty.is_shared()),
            TypeKind::Native { .. } | TypeKind::Class(_) => Some(true),
            TypeKind::Enum { .. } => Some(false),
            TypeKind::Variant | TypeKind::Unresolved | TypeKind::Resolving => None,
        }
    }

    /// The runtime tag values of this type carry.
    pub fn variant_type(&self) -> Option<VariantType> {
        if self.is_meta {
            return Some(VariantType::Object);
        }
        match &self.kind {
            TypeKind::Builtin { ty, .. } => Some(*ty),
            TypeKind::Native { .. } | TypeKind::Class(_) => Some(VariantType::Object),
            TypeKind::Enum { .. } => Some(VariantType::Int),
            _ => None,
        }
    }

    /// Default value for a typed variable without initializer.
    pub fn default_value(&self) -> Variant {
        if self.is_meta {
            return Variant::Nil;
        }
        match &self.kind {
            TypeKind::Builtin {
                ty: VariantType::Array,
                elements,
            } => match elements.first() {
                Some(element) => Variant::Array(Array::typed(element.clone(), Vec::new())),
                None => Variant::Array(Array::new()),
            },
            TypeKind::Builtin {
                ty: VariantType::Dictionary,
                elements,
            } if !elements.is_empty() => Variant::Dictionary(Dictionary::typed(
                elements.first().cloned(),
                elements.get(1).cloned(),
            )),
            TypeKind::Builtin { ty, .. } => Variant::default_of(*ty),
            TypeKind::Enum { .. } => Variant::Int(0),
            _ => Variant::Nil,
        }
    }

    /// Whether a concrete value fits a builtin or enum type. Object types
    /// are checked by the runtime, which knows class hierarchies.
    pub fn accepts_builtin_value(&self, value: &Variant) -> bool {
        match &self.kind {
            TypeKind::Variant => true,
            TypeKind::Builtin { ty, elements } => {
                let value_ty = value.get_type();
                if value_ty != *ty && !value_ty.converts_implicitly_to(*ty) {
                    return false;
                }
                match (value, elements.first()) {
                    (Variant::Array(array), Some(element)) => array
                        .element_type()
                        .is_some_and(|existing| existing == *element),
                    _ => true,
                }
            }
            TypeKind::Enum { .. } => matches!(value, Variant::Int(_)),
            TypeKind::Native { .. } | TypeKind::Class(_) => {
                matches!(value, Variant::Object(_) | Variant::Nil)
            }
            TypeKind::Unresolved | TypeKind::Resolving => false,
        }
    }
}

impl PartialEq for DataType {
    /// Two descriptors are equal when they denote the same type; the hard
    /// vs inferred source does not participate.
    fn eq(&self, other: &Self) -> bool {
        if self.is_meta != other.is_meta {
            return false;
        }
        match (&self.kind, &other.kind) {
            (TypeKind::Variant, TypeKind::Variant)
            | (TypeKind::Unresolved, TypeKind::Unresolved)
            | (TypeKind::Resolving, TypeKind::Resolving) => true,
            (
                TypeKind::Builtin { ty, elements },
                TypeKind::Builtin {
                    ty: ty2,
                    elements: elements2,
                },
            ) => ty == ty2 && elements == elements2,
            (TypeKind::Native { class }, TypeKind::Native { class: class2 }) => class == class2,
            (TypeKind::Class(a), TypeKind::Class(b)) => a == b,
            (
                TypeKind::Enum { name, owner, .. },
                TypeKind::Enum {
                    name: name2,
                    owner: owner2,
                    ..
                },
            ) => name == name2 && owner == owner2,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Variant => write!(f, "Variant"),
            TypeKind::Builtin { ty, elements } => {
                if *ty == VariantType::Nil && self.is_hard() {
                    return write!(f, "void");
                }
                write!(f, "{}", ty)?;
                if !elements.is_empty() {
                    write!(f, "[")?;
                    for (i, element) in elements.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", element)?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            TypeKind::Native { class } => write!(f, "{}", class),
            TypeKind::Class(key) => write!(f, "{}", key.name),
            TypeKind::Enum { name, .. } => write!(f, "{}", name),
            TypeKind::Unresolved => write!(f, "<unresolved type>"),
            TypeKind::Resolving => write!(f, "<resolving type>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_and_inferred() {
        assert!(DataType::builtin(VariantType::Int).is_hard());
        assert!(!DataType::builtin(VariantType::Int).inferred().is_hard());
        assert!(!DataType::variant().is_hard());
        assert!(!DataType::resolving().hard().is_hard());
    }

    #[test]
    fn equality_ignores_source_but_not_meta() {
        let hard = DataType::native("Node");
        let soft = DataType::native("Node").inferred();
        assert_eq!(hard, soft);
        assert_ne!(hard, DataType::native("Node").meta());
    }

    #[test]
    fn display_containers() {
        let ty = DataType::typed_array(DataType::builtin(VariantType::Int));
        assert_eq!(ty.to_string(), "Array[int]");
        let dict = DataType::typed_dictionary(
            DataType::builtin(VariantType::String),
            DataType::native("Node"),
        );
        assert_eq!(dict.to_string(), "Dictionary[String, Node]");
    }

    #[test]
    fn shared_by_reference() {
        assert_eq!(DataType::builtin(VariantType::Array).is_shared(), Some(true));
        assert_eq!(DataType::builtin(VariantType::Vector2).is_shared(), Some(false));
        assert_eq!(DataType::variant().is_shared(), None);
    }

    #[test]
    fn typed_defaults() {
        let ty = DataType::typed_array(DataType::builtin(VariantType::Int));
        match ty.default_value() {
            Variant::Array(array) => {
                assert_eq!(array.element_type(), Some(DataType::builtin(VariantType::Int)))
            }
            other => panic!("expected array, got {:?}", other),
        }
        assert_eq!(DataType::builtin(VariantType::Float).default_value(), Variant::Float(0.0));
    }

    #[test]
    fn class_key_identity() {
        let a = ClassKey::new("res://a.br", "res://a.br::Inner", "Inner", 1);
        let b = ClassKey::new("res://a.br", "res://a.br::Inner", "Other", 3);
        assert_eq!(a, b);
        assert!(!a.is_head());
    }
}
