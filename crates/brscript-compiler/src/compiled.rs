//! Output of the compiler: compiled functions and class tables.
//!
//! A [`CompiledScript`] mirrors the class arena of its parsed file: index 0
//! is the head class and nested classes follow. Everything here is
//! immutable once built; the runtime shares it behind `Arc`s.

use std::sync::Arc;

use brscript_core::{
    ClassCapabilities, ClassKey, DataType, MethodFlags, MethodInfo, PropertyInfo, PropertyUsage,
    Variant,
};
use rustc_hash::FxHashMap;

use crate::codegen::{BytecodeChunk, ConstantPool};

// ============================================================================
// Functions
// ============================================================================

/// One function's lowered instruction stream plus metadata.
#[derive(Debug, Clone, Default)]
pub struct CompiledFunction {
    pub name: String,
    pub chunk: BytecodeChunk,
    pub constants: ConstantPool,
    /// Leading stack slots holding captured values of a lambda.
    pub capture_count: usize,
    pub argument_count: usize,
    pub default_argument_count: usize,
    /// Entry offsets when trailing arguments are omitted: entry `i` starts
    /// by computing the default of argument `argument_count -
    /// default_argument_count + i`; the last entry is the body.
    pub default_entries: Vec<usize>,
    /// Stack slots needed: captures, arguments, locals and temporaries.
    pub stack_size: u32,
    pub argument_names: Vec<String>,
    pub argument_types: Vec<DataType>,
    pub return_type: DataType,
    pub is_static: bool,
    pub is_coroutine: bool,
    /// Whether a lambda needs the instance bound.
    pub uses_self: bool,
    /// Lambdas created by this function, as indices into the class's list.
    pub lambdas: Vec<u32>,
    pub line: u32,
}

impl CompiledFunction {
    /// Offset execution starts at when `argc` arguments are passed.
    pub fn entry_offset(&self, argc: usize) -> usize {
        if self.default_entries.is_empty() {
            return 0;
        }
        let min = self.argument_count - self.default_argument_count;
        let index = argc.saturating_sub(min).min(self.default_entries.len() - 1);
        self.default_entries[index]
    }

    pub fn min_arguments(&self) -> usize {
        self.argument_count - self.default_argument_count
    }

    /// Source line of the instruction at `offset`.
    pub fn line_at(&self, offset: usize) -> u32 {
        self.chunk.line_at(offset).unwrap_or(self.line)
    }

    pub fn method_info(&self) -> MethodInfo {
        let mut flags = MethodFlags::NORMAL;
        if self.is_static {
            flags |= MethodFlags::STATIC;
        }
        if self.is_coroutine {
            flags |= MethodFlags::COROUTINE;
        }
        let mut info = MethodInfo::new(self.name.clone())
            .with_return(PropertyInfo::from_data_type("", &self.return_type))
            .with_defaults(self.default_argument_count)
            .with_flags(flags);
        for (name, ty) in self.argument_names.iter().zip(&self.argument_types) {
            info = info.with_argument(PropertyInfo::from_data_type(name.clone(), ty));
        }
        info
    }
}

// ============================================================================
// Classes
// ============================================================================

/// Storage of one instance or static variable.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSlot {
    pub name: String,
    /// Instance slots continue after the base script's; static slots are
    /// per class.
    pub index: u32,
    pub data_type: DataType,
    pub getter: Option<String>,
    pub setter: Option<String>,
    pub exported: bool,
    pub line: u32,
}

impl MemberSlot {
    pub fn property_info(&self) -> PropertyInfo {
        let mut usage = PropertyUsage::SCRIPT_VARIABLE;
        if self.exported {
            usage |= PropertyUsage::DEFAULT;
        }
        PropertyInfo::from_data_type(self.name.clone(), &self.data_type).with_usage(usage)
    }
}

/// The base of a compiled class.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledBase {
    Native(String),
    Script(ClassKey),
}

#[derive(Debug, Clone)]
pub struct CompiledClass {
    pub key: ClassKey,
    /// `class_name` of a head class.
    pub global_name: Option<String>,
    pub base: CompiledBase,
    /// Native class at the root of the chain.
    pub native_base: String,
    /// Instance variables declared by this class.
    pub members: FxHashMap<String, MemberSlot>,
    /// Instance slots used by the base scripts; checked when linking.
    pub base_member_count: u32,
    pub static_variables: FxHashMap<String, MemberSlot>,
    pub constants: FxHashMap<String, Variant>,
    /// Nested classes by name, as indices into the script's classes.
    pub inner_classes: FxHashMap<String, u32>,
    pub signals: FxHashMap<String, MethodInfo>,
    pub functions: FxHashMap<String, Arc<CompiledFunction>>,
    pub lambdas: Vec<Arc<CompiledFunction>>,
    pub implicit_initializer: Option<Arc<CompiledFunction>>,
    pub static_initializer: Option<Arc<CompiledFunction>>,
    pub capabilities: ClassCapabilities,
    pub member_lines: FxHashMap<String, u32>,
    pub outer: Option<u32>,
    pub icon_path: Option<String>,
}

impl CompiledClass {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Instance slots including the base scripts'.
    pub fn member_count(&self) -> u32 {
        self.base_member_count + self.members.len() as u32
    }

    /// Own instance members in slot order.
    pub fn members_in_order(&self) -> Vec<&MemberSlot> {
        let mut members: Vec<&MemberSlot> = self.members.values().collect();
        members.sort_by_key(|slot| slot.index);
        members
    }

    pub fn statics_in_order(&self) -> Vec<&MemberSlot> {
        let mut members: Vec<&MemberSlot> = self.static_variables.values().collect();
        members.sort_by_key(|slot| slot.index);
        members
    }

    pub fn function(&self, name: &str) -> Option<&Arc<CompiledFunction>> {
        self.functions.get(name)
    }
}

/// The compiled form of one script file.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub path: String,
    pub source_hash: u64,
    pub classes: Vec<CompiledClass>,
    pub dependencies: Vec<String>,
}

impl CompiledScript {
    pub fn head(&self) -> Option<&CompiledClass> {
        self.classes.first()
    }

    pub fn class(&self, index: u32) -> Option<&CompiledClass> {
        self.classes.get(index as usize)
    }

    pub fn class_by_key(&self, key: &ClassKey) -> Option<&CompiledClass> {
        self.classes.iter().find(|class| class.key == *key)
    }

    /// Walk a dotted chain of nested class names from the head class.
    pub fn find_class(&self, qualified: &str) -> Option<u32> {
        let mut current = 0u32;
        if qualified.is_empty() {
            return self.head().map(|_| 0);
        }
        for name in qualified.split('.') {
            current = *self.class(current)?.inner_classes.get(name)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brscript_core::VariantType;

    fn function(argument_count: usize, defaults: usize) -> CompiledFunction {
        CompiledFunction {
            name: "f".to_string(),
            argument_count,
            default_argument_count: defaults,
            default_entries: if defaults > 0 {
                (0..=defaults).map(|i| i * 10).collect()
            } else {
                Vec::new()
            },
            ..Default::default()
        }
    }

    #[test]
    fn entry_offset_skips_provided_defaults() {
        let f = function(3, 2);
        assert_eq!(f.min_arguments(), 1);
        assert_eq!(f.entry_offset(1), 0);
        assert_eq!(f.entry_offset(2), 10);
        assert_eq!(f.entry_offset(3), 20);
        assert_eq!(function(2, 0).entry_offset(2), 0);
    }

    #[test]
    fn method_info_carries_flags() {
        let mut f = function(1, 0);
        f.argument_names = vec!["x".to_string()];
        f.argument_types = vec![DataType::builtin(VariantType::Int)];
        f.is_static = true;
        let info = f.method_info();
        assert!(info.is_static());
        assert_eq!(info.arguments[0].ty, VariantType::Int);
    }
}
