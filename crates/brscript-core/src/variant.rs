//! The universal tagged value.
//!
//! [`Variant`] is the dynamic value every script expression evaluates to.
//! Arrays, dictionaries, objects and callables are shared by reference;
//! every other variant is a plain value and is copied on assignment.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{CallError, DataType, ObjectRef};

// ============================================================================
// Variant Types
// ============================================================================

/// Tag of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariantType {
    Nil,
    Bool,
    Int,
    Float,
    String,
    StringName,
    Vector2,
    Vector3,
    Array,
    Dictionary,
    Object,
    Callable,
    Signal,
}

impl VariantType {
    /// All builtin types, in tag order.
    pub const ALL: &'static [VariantType] = &[
        VariantType::Nil,
        VariantType::Bool,
        VariantType::Int,
        VariantType::Float,
        VariantType::String,
        VariantType::StringName,
        VariantType::Vector2,
        VariantType::Vector3,
        VariantType::Array,
        VariantType::Dictionary,
        VariantType::Object,
        VariantType::Callable,
        VariantType::Signal,
    ];

    /// Name used in type annotations.
    pub fn name(&self) -> &'static str {
        match self {
            VariantType::Nil => "null",
            VariantType::Bool => "bool",
            VariantType::Int => "int",
            VariantType::Float => "float",
            VariantType::String => "String",
            VariantType::StringName => "StringName",
            VariantType::Vector2 => "Vector2",
            VariantType::Vector3 => "Vector3",
            VariantType::Array => "Array",
            VariantType::Dictionary => "Dictionary",
            VariantType::Object => "Object",
            VariantType::Callable => "Callable",
            VariantType::Signal => "Signal",
        }
    }

    /// Look up a builtin type by annotation name. `Object` is not a builtin
    /// annotation; it names the native root class.
    pub fn from_name(name: &str) -> Option<VariantType> {
        Self::ALL
            .iter()
            .copied()
            .filter(|ty| *ty != VariantType::Object && *ty != VariantType::Nil)
            .find(|ty| ty.name() == name)
    }

    /// Whether values of this type are shared by reference.
    pub fn is_shared(&self) -> bool {
        matches!(
            self,
            VariantType::Array
                | VariantType::Dictionary
                | VariantType::Object
                | VariantType::Callable
                | VariantType::Signal
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, VariantType::Int | VariantType::Float)
    }

    /// Whether a value of `self` converts to `to` without an explicit cast.
    ///
    /// Only widening conversions qualify; `float` to `int` needs a cast.
    pub fn converts_implicitly_to(&self, to: VariantType) -> bool {
        matches!(
            (self, to),
            (VariantType::Int, VariantType::Float)
                | (VariantType::String, VariantType::StringName)
                | (VariantType::StringName, VariantType::String)
        )
    }

    /// Whether an explicit `as` cast from `self` to `to` is defined.
    pub fn can_cast_to(&self, to: VariantType) -> bool {
        if *self == to || self.converts_implicitly_to(to) {
            return true;
        }
        matches!(
            (self, to),
            (VariantType::Float, VariantType::Int)
                | (VariantType::Int, VariantType::Bool)
                | (VariantType::Float, VariantType::Bool)
                | (VariantType::Bool, VariantType::Int)
                | (VariantType::Bool, VariantType::Float)
                | (_, VariantType::String)
        )
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Containers
// ============================================================================

#[derive(Debug, Default)]
struct ArrayData {
    elements: Vec<Variant>,
    element_type: Option<DataType>,
    read_only: bool,
}

/// Reference-shared array, optionally typed and optionally read-only.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<ArrayData>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(elements: Vec<Variant>) -> Self {
        Array(Arc::new(RwLock::new(ArrayData {
            elements,
            element_type: None,
            read_only: false,
        })))
    }

    /// A typed array. Elements are not validated here; the analyzer or the
    /// runtime checks them before construction.
    pub fn typed(element_type: DataType, elements: Vec<Variant>) -> Self {
        Array(Arc::new(RwLock::new(ArrayData {
            elements,
            element_type: Some(element_type),
            read_only: false,
        })))
    }

    pub fn len(&self) -> usize {
        self.0.read().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Variant> {
        self.0.read().elements.get(index).cloned()
    }

    /// Store at `index`. Fails when out of range or read-only.
    pub fn set(&self, index: usize, value: Variant) -> bool {
        let mut data = self.0.write();
        if data.read_only {
            return false;
        }
        match data.elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&self, value: Variant) -> bool {
        let mut data = self.0.write();
        if data.read_only {
            return false;
        }
        data.elements.push(value);
        true
    }

    pub fn to_vec(&self) -> Vec<Variant> {
        self.0.read().elements.clone()
    }

    pub fn element_type(&self) -> Option<DataType> {
        self.0.read().element_type.clone()
    }

    pub fn is_typed(&self) -> bool {
        self.0.read().element_type.is_some()
    }

    pub fn make_read_only(&self) {
        self.0.write().read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.0.read().read_only
    }

    pub fn contains(&self, value: &Variant) -> bool {
        self.0.read().elements.iter().any(|e| e == value)
    }

    /// Copy the elements into a new, writable array with the same type.
    pub fn duplicate(&self) -> Array {
        let data = self.0.read();
        Array(Arc::new(RwLock::new(ArrayData {
            elements: data.elements.clone(),
            element_type: data.element_type.clone(),
            read_only: false,
        })))
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.read().elements == other.0.read().elements
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.read().elements.iter()).finish()
    }
}

#[derive(Debug, Default)]
struct DictionaryData {
    entries: Vec<(Variant, Variant)>,
    key_type: Option<DataType>,
    value_type: Option<DataType>,
    read_only: bool,
}

/// Reference-shared insertion-ordered map.
#[derive(Clone, Default)]
pub struct Dictionary(Arc<RwLock<DictionaryData>>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(Variant, Variant)>) -> Self {
        let dict = Self::new();
        for (key, value) in entries {
            dict.insert(key, value);
        }
        dict
    }

    pub fn typed(key_type: Option<DataType>, value_type: Option<DataType>) -> Self {
        Dictionary(Arc::new(RwLock::new(DictionaryData {
            entries: Vec::new(),
            key_type,
            value_type,
            read_only: false,
        })))
    }

    pub fn len(&self) -> usize {
        self.0.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().entries.is_empty()
    }

    pub fn get(&self, key: &Variant) -> Option<Variant> {
        self.0
            .read()
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &Variant) -> bool {
        self.0.read().entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace. Fails when read-only.
    pub fn insert(&self, key: Variant, value: Variant) -> bool {
        let mut data = self.0.write();
        if data.read_only {
            return false;
        }
        match data.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => data.entries.push((key, value)),
        }
        true
    }

    pub fn keys(&self) -> Vec<Variant> {
        self.0.read().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(Variant, Variant)> {
        self.0.read().entries.clone()
    }

    pub fn key_type(&self) -> Option<DataType> {
        self.0.read().key_type.clone()
    }

    pub fn value_type(&self) -> Option<DataType> {
        self.0.read().value_type.clone()
    }

    pub fn make_read_only(&self) {
        self.0.write().read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.0.read().read_only
    }

    pub fn ptr_eq(&self, other: &Dictionary) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let a = self.0.read();
        let b = other.0.read();
        a.entries.len() == b.entries.len()
            && a.entries
                .iter()
                .all(|(k, v)| b.entries.iter().any(|(k2, v2)| k == k2 && v == v2))
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.read().entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

// ============================================================================
// Callables and signals
// ============================================================================

/// A callable implemented outside the object model, such as a script lambda.
pub trait CustomCallable: Send + Sync {
    fn call(&self, args: &[Variant]) -> Result<Variant, CallError>;

    /// Display name.
    fn name(&self) -> String;

    /// Whether the callable still points at a live function.
    fn is_valid(&self) -> bool;
}

/// A first-class function value.
#[derive(Clone)]
pub enum Callable {
    /// A method bound to an object.
    Method { object: ObjectRef, method: String },
    /// A custom callable.
    Custom(Arc<dyn CustomCallable>),
}

impl Callable {
    pub fn call(&self, args: &[Variant]) -> Result<Variant, CallError> {
        match self {
            Callable::Method { object, method } => object.call(method, args),
            Callable::Custom(custom) => custom.call(args),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Callable::Method { object, method } => object.has_method(method),
            Callable::Custom(custom) => custom.is_valid(),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Callable::Method { object, method },
                Callable::Method {
                    object: o2,
                    method: m2,
                },
            ) => object == o2 && method == m2,
            (Callable::Custom(a), Callable::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Method { object, method } => write!(f, "{:?}::{}", object, method),
            Callable::Custom(custom) => write!(f, "{}", custom.name()),
        }
    }
}

/// A signal of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRef {
    pub object: ObjectRef,
    pub name: String,
}

// ============================================================================
// Variant
// ============================================================================

/// The universal tagged value.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringName(String),
    Vector2(f64, f64),
    Vector3(f64, f64, f64),
    Array(Array),
    Dictionary(Dictionary),
    Object(ObjectRef),
    Callable(Callable),
    Signal(SignalRef),
}

impl Variant {
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Float(_) => VariantType::Float,
            Variant::String(_) => VariantType::String,
            Variant::StringName(_) => VariantType::StringName,
            Variant::Vector2(..) => VariantType::Vector2,
            Variant::Vector3(..) => VariantType::Vector3,
            Variant::Array(_) => VariantType::Array,
            Variant::Dictionary(_) => VariantType::Dictionary,
            Variant::Object(_) => VariantType::Object,
            Variant::Callable(_) => VariantType::Callable,
            Variant::Signal(_) => VariantType::Signal,
        }
    }

    /// Default value of a builtin type.
    pub fn default_of(ty: VariantType) -> Variant {
        match ty {
            VariantType::Nil | VariantType::Object => Variant::Nil,
            VariantType::Bool => Variant::Bool(false),
            VariantType::Int => Variant::Int(0),
            VariantType::Float => Variant::Float(0.0),
            VariantType::String => Variant::String(String::new()),
            VariantType::StringName => Variant::StringName(String::new()),
            VariantType::Vector2 => Variant::Vector2(0.0, 0.0),
            VariantType::Vector3 => Variant::Vector3(0.0, 0.0, 0.0),
            VariantType::Array => Variant::Array(Array::new()),
            VariantType::Dictionary => Variant::Dictionary(Dictionary::new()),
            VariantType::Callable | VariantType::Signal => Variant::Nil,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    pub fn is_shared(&self) -> bool {
        self.get_type().is_shared()
    }

    /// Truthiness used by conditions.
    pub fn booleanize(&self) -> bool {
        match self {
            Variant::Nil => false,
            Variant::Bool(b) => *b,
            Variant::Int(i) => *i != 0,
            Variant::Float(f) => *f != 0.0,
            Variant::String(s) | Variant::StringName(s) => !s.is_empty(),
            Variant::Vector2(x, y) => *x != 0.0 || *y != 0.0,
            Variant::Vector3(x, y, z) => *x != 0.0 || *y != 0.0 || *z != 0.0,
            Variant::Array(a) => !a.is_empty(),
            Variant::Dictionary(d) => !d.is_empty(),
            Variant::Object(_) => true,
            Variant::Callable(c) => c.is_valid(),
            Variant::Signal(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(f) => Some(*f),
            Variant::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) | Variant::StringName(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Variant::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Variant::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Variant::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Convert to another builtin type, following the cast table.
    pub fn convert(&self, to: VariantType) -> Option<Variant> {
        if self.get_type() == to {
            return Some(self.clone());
        }
        match (self, to) {
            (Variant::Int(i), VariantType::Float) => Some(Variant::Float(*i as f64)),
            (Variant::Float(f), VariantType::Int) => Some(Variant::Int(*f as i64)),
            (Variant::Bool(b), VariantType::Int) => Some(Variant::Int(*b as i64)),
            (Variant::Bool(b), VariantType::Float) => Some(Variant::Float(*b as i64 as f64)),
            (Variant::Int(i), VariantType::Bool) => Some(Variant::Bool(*i != 0)),
            (Variant::Float(f), VariantType::Bool) => Some(Variant::Bool(*f != 0.0)),
            (Variant::String(s), VariantType::StringName) => Some(Variant::StringName(s.clone())),
            (Variant::StringName(s), VariantType::String) => Some(Variant::String(s.clone())),
            (_, VariantType::String) => Some(Variant::String(self.to_string())),
            (Variant::Nil, VariantType::Object) => Some(Variant::Nil),
            _ => None,
        }
    }

    /// Deep copy of containers; other values are cloned.
    pub fn duplicate(&self) -> Variant {
        match self {
            Variant::Array(a) => Variant::Array(a.duplicate()),
            Variant::Dictionary(d) => Variant::Dictionary(Dictionary::from_entries(d.entries())),
            other => other.clone(),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Nil, Variant::Nil) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a == b,
            (Variant::Int(a), Variant::Float(b)) | (Variant::Float(b), Variant::Int(a)) => {
                (*a as f64) == *b
            }
            (Variant::String(a) | Variant::StringName(a), Variant::String(b) | Variant::StringName(b)) => {
                a == b
            }
            (Variant::Vector2(a, b), Variant::Vector2(c, d)) => a == c && b == d,
            (Variant::Vector3(a, b, c), Variant::Vector3(d, e, g)) => a == d && b == e && c == g,
            (Variant::Array(a), Variant::Array(b)) => a == b,
            (Variant::Dictionary(a), Variant::Dictionary(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => a == b,
            (Variant::Callable(a), Variant::Callable(b)) => a == b,
            (Variant::Signal(a), Variant::Signal(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => write!(f, "<null>"),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::Int(i) => write!(f, "{}", i),
            Variant::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Variant::String(s) | Variant::StringName(s) => f.write_str(s),
            Variant::Vector2(x, y) => write!(f, "({}, {})", x, y),
            Variant::Vector3(x, y, z) => write!(f, "({}, {}, {})", x, y, z),
            Variant::Array(a) => {
                write!(f, "[")?;
                for (i, e) in a.to_vec().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            Variant::Dictionary(d) => {
                write!(f, "{{")?;
                for (i, (k, v)) in d.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Variant::Object(o) => write!(f, "<{}{}>", o.class_name(), o.id()),
            Variant::Callable(c) => write!(f, "{:?}", c),
            Variant::Signal(s) => write!(f, "{}::{}", s.object.id(), s.name),
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_containers_alias() {
        let array = Array::from_vec(vec![Variant::Int(1)]);
        let alias = Variant::Array(array.clone());
        array.push(Variant::Int(2));
        assert_eq!(alias.as_array().map(|a| a.len()), Some(2));
        assert!(alias.is_shared());
        assert!(!Variant::Vector2(1.0, 2.0).is_shared());
    }

    #[test]
    fn read_only_array_rejects_writes() {
        let array = Array::typed(DataType::builtin(VariantType::Int), vec![Variant::Int(1)]);
        array.make_read_only();
        assert!(!array.push(Variant::Int(2)));
        assert!(!array.set(0, Variant::Int(5)));
        assert_eq!(array.get(0), Some(Variant::Int(1)));
        assert!(!array.duplicate().is_read_only());
    }

    #[test]
    fn implicit_conversions_widen_only() {
        assert!(VariantType::Int.converts_implicitly_to(VariantType::Float));
        assert!(!VariantType::Float.converts_implicitly_to(VariantType::Int));
        assert!(VariantType::Float.can_cast_to(VariantType::Int));
    }

    #[test]
    fn numeric_equality_crosses_int_float() {
        assert_eq!(Variant::Int(2), Variant::Float(2.0));
        assert_ne!(Variant::Int(2), Variant::String("2".into()));
    }

    #[test]
    fn dictionary_preserves_insertion_order() {
        let dict = Dictionary::new();
        dict.insert("b".into(), Variant::Int(1));
        dict.insert("a".into(), Variant::Int(2));
        dict.insert("b".into(), Variant::Int(3));
        assert_eq!(dict.keys(), vec![Variant::from("b"), Variant::from("a")]);
        assert_eq!(dict.get(&"b".into()), Some(Variant::Int(3)));
    }

    #[test]
    fn convert_follows_cast_table() {
        assert_eq!(Variant::Float(2.7).convert(VariantType::Int), Some(Variant::Int(2)));
        assert_eq!(
            Variant::Int(3).convert(VariantType::String),
            Some(Variant::String("3".into()))
        );
        assert_eq!(Variant::String("x".into()).convert(VariantType::Int), None);
    }
}
