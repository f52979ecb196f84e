//! Type annotations and assignment checks.

use brscript_core::{
    ClassKey, DataType, ResolutionError, Span, TypeError, TypeKind, VariantType, WarningCode,
};
use brscript_parser::ast::{ClassId, Member, TypeSpec};

use super::{
    Analyzer, BaseState, Compatibility, ResolvingBase, ScriptParent, TypeHierarchy, is_type_compatible,
};
use crate::analysis::MemberKind;
use crate::unit::UnitStatus;

/// Where a value is being stored, for the error reported on mismatch.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AssignContext<'c> {
    Assignment,
    Argument { function: &'c str, index: usize },
    Return,
}

impl TypeHierarchy for Analyzer<'_> {
    fn is_native_parent(&mut self, class: &str, ancestor: &str) -> bool {
        class == ancestor || self.registry().is_parent_class(class, ancestor)
    }

    fn script_parent(&mut self, key: &ClassKey) -> ScriptParent {
        match self.base_of(key) {
            BaseState::Script(base) => ScriptParent::Script(base),
            BaseState::Native(native) => ScriptParent::Native(native),
            BaseState::Resolving => ScriptParent::Resolving,
            BaseState::Invalid | BaseState::Unknown => ScriptParent::Unknown,
        }
    }
}

impl Analyzer<'_> {
    // ========================================================================
    // Annotations
    // ========================================================================

    /// Resolve an annotation, reporting failures and falling back to Variant.
    pub(crate) fn resolve_type_spec(&mut self, spec: &TypeSpec) -> DataType {
        match self.try_resolve_type(spec) {
            Ok(ty) => ty,
            Err(err) => {
                self.error(err);
                DataType::variant()
            }
        }
    }

    fn try_resolve_type(&mut self, spec: &TypeSpec) -> Result<DataType, ResolutionError> {
        let unresolved = || ResolutionError::UnresolvedType {
            name: spec.dotted(),
            span: spec.span,
        };
        let head = spec.head();

        if spec.chain.len() == 1 {
            match head {
                "void" => return Ok(DataType::nil()),
                "Variant" => return Ok(DataType::variant().hard()),
                _ => {}
            }
            if let Some(ty) = VariantType::from_name(head) {
                return match (ty, spec.elements.as_slice()) {
                    (VariantType::Array, [element]) => {
                        Ok(DataType::typed_array(self.try_resolve_type(element)?))
                    }
                    (VariantType::Dictionary, [key, value]) => Ok(DataType::typed_dictionary(
                        self.try_resolve_type(key)?,
                        self.try_resolve_type(value)?,
                    )),
                    (_, []) => Ok(DataType::builtin(ty)),
                    _ => Err(unresolved()),
                };
            }
        }

        let first = spec.chain.first().ok_or_else(unresolved)?;
        let mut current = self
            .resolve_type_head(&first.name, first.span)?
            .ok_or_else(unresolved)?;
        for ident in spec.chain.iter().skip(1) {
            current = self
                .resolve_type_member(&current, &ident.name, ident.span)?
                .ok_or_else(unresolved)?;
        }
        Ok(current)
    }

    /// First name of an annotation: visible nested classes and enums, native
    /// classes, then global script classes.
    fn resolve_type_head(&mut self, name: &str, span: Span) -> Result<Option<DataType>, ResolutionError> {
        if let Some(ty) = self.find_type_in_enclosing(self.class, name) {
            return Ok(Some(ty));
        }

        let key = self.current_key();
        for base in self.script_chain(&key).into_iter().skip(1) {
            if !self.declares_member(&base, name) {
                continue;
            }
            if let Some(member) = self.class_member(&base, name) {
                if matches!(member.kind, MemberKind::Class | MemberKind::Enum) {
                    return Ok(Some(member.data_type.instance()));
                }
            }
        }

        if self.registry().class_exists(name) {
            return Ok(Some(DataType::native(name)));
        }

        if let Some(global) = self.registry().global_class(name) {
            let unit = self.load_unit(&global.path, UnitStatus::InheritanceSolved, span)?;
            return Ok(unit.head_key().map(DataType::class));
        }
        Ok(None)
    }

    /// Nested classes and named enums of `id` and its enclosing classes,
    /// then the head class by its global name.
    fn find_type_in_enclosing(&mut self, id: ClassId, name: &str) -> Option<DataType> {
        let tree = self.tree.clone();
        let mut current = Some(id);
        while let Some(class_id) = current {
            let node = tree.class(class_id)?;
            match node.member(name) {
                Some(Member::Class { id: nested, .. }) => {
                    return Some(DataType::class(self.key_of(*nested)));
                }
                Some(Member::Enum(_)) => {
                    let key = self.key_of(class_id);
                    return self.class_member(&key, name).map(|member| member.data_type.instance());
                }
                _ => {}
            }
            current = node.outer;
        }
        (tree.head().name() == Some(name)).then(|| DataType::class(self.key_of(ClassId::HEAD)))
    }

    /// `Outer.Inner` or `Class.Enum` in an annotation.
    fn resolve_type_member(
        &mut self,
        current: &DataType,
        name: &str,
        span: Span,
    ) -> Result<Option<DataType>, ResolutionError> {
        match &current.kind {
            TypeKind::Native { class } => Ok(self
                .registry()
                .enum_values(class, name)
                .map(|values| DataType::enumeration(name, class.clone(), values))),
            TypeKind::Class(key) => {
                if let Some(nested) = self.nested_class_of(key, name, span)? {
                    return Ok(Some(DataType::class(nested)));
                }
                Ok(self
                    .lookup_member(key, name)
                    .filter(|(_, member)| member.kind == MemberKind::Enum)
                    .map(|(_, member)| member.data_type.instance()))
            }
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Assignment checks
    // ========================================================================

    /// Check that a `source` value may be stored where `target` is expected.
    ///
    /// Returns false when an error was reported. Accepted-but-unchecked
    /// stores mark the current statement unsafe.
    pub(crate) fn check_assignment(
        &mut self,
        target: &DataType,
        source: &DataType,
        span: Span,
        context: AssignContext<'_>,
    ) -> bool {
        if !target.is_hard() || target.is_variant() {
            return true;
        }
        if source.is_resolving() {
            self.cyclic_reference(span);
            return false;
        }
        if !source.is_hard() {
            self.mark_unsafe();
            if let AssignContext::Argument { function, index } = context {
                self.warn(
                    WarningCode::UnsafeCallArgument,
                    format!(
                        "argument {} of \"{}\" is Variant but the parameter is \"{}\"",
                        index + 1,
                        function,
                        target
                    ),
                    span,
                );
            }
            return true;
        }

        match is_type_compatible(target, source, self) {
            Err(ResolvingBase(key)) => {
                let class = key.map_or_else(|| self.class_name(self.class), |key| key.name.to_string());
                self.error(ResolutionError::CyclicReference { class, span });
                false
            }
            Ok(Compatibility::Compatible) => {
                if matches!(target.kind, TypeKind::Enum { .. }) && source.is_builtin(VariantType::Int) {
                    self.warn(
                        WarningCode::IntAsEnumWithoutCast,
                        format!("integer used as enum \"{}\" without a cast", target),
                        span,
                    );
                }
                true
            }
            Ok(Compatibility::Unsafe) => {
                self.mark_unsafe();
                true
            }
            Ok(Compatibility::Incompatible) => {
                let reverse = is_type_compatible(source, target, self);
                if let Ok(verdict) = reverse {
                    if verdict.is_compatible() && !Self::is_meta_mismatch(target, source) {
                        self.mark_unsafe();
                        let numeric = target.builtin_type().is_some_and(|ty| ty.is_numeric())
                            && source.builtin_type().is_some_and(|ty| ty.is_numeric());
                        if numeric {
                            self.warn(
                                WarningCode::NarrowingConversion,
                                format!("narrowing conversion from \"{}\" to \"{}\"", source, target),
                                span,
                            );
                        }
                        return true;
                    }
                }
                self.report_incompatible(target, source, span, context);
                false
            }
        }
    }

    fn is_meta_mismatch(target: &DataType, source: &DataType) -> bool {
        target.is_meta != source.is_meta
    }

    fn report_incompatible(
        &mut self,
        target: &DataType,
        source: &DataType,
        span: Span,
        context: AssignContext<'_>,
    ) {
        let expected = target.to_string();
        let found = source.to_string();
        let error = match context {
            AssignContext::Assignment => TypeError::IncompatibleAssignment {
                expected,
                found,
                span,
            },
            AssignContext::Argument { function, index } => TypeError::IncompatibleArgument {
                function: function.to_string(),
                index: index + 1,
                expected,
                found,
                span,
            },
            AssignContext::Return => TypeError::IncompatibleReturn {
                expected,
                found,
                span,
            },
        };
        self.error(error);
    }
}
