//! Match patterns.

use brscript_core::{DataType, Span, TypeError, VariantType};
use brscript_parser::ast::{ExprKind, MatchBranch, Pattern, PatternKind};

use super::Analyzer;
use crate::analysis::{ExprInfo, IdentifierSource, LocalKind};

fn invalid(message: &str, span: Span) -> TypeError {
    TypeError::InvalidPattern {
        message: message.to_string(),
        span,
    }
}

impl Analyzer<'_> {
    /// Resolve the patterns and guard of a branch. Bindings are declared in
    /// the current block, which the caller opens for the branch.
    pub(super) fn resolve_branch_patterns(&mut self, branch: &MatchBranch, test: &DataType) {
        if branch.patterns.len() > 1 && branch.has_bindings() {
            self.error(invalid(
                "cannot use a variable binding in a branch with several patterns",
                branch.span,
            ));
        }
        for pattern in &branch.patterns {
            if matches!(pattern.kind, PatternKind::Rest) {
                self.error(invalid("\"..\" is only allowed inside array and dictionary patterns", pattern.span));
                continue;
            }
            self.resolve_pattern(pattern, test);
        }
        if let Some(guard) = &branch.guard {
            self.reduce_value(guard);
        }
    }

    fn resolve_pattern(&mut self, pattern: &Pattern, test: &DataType) {
        match &pattern.kind {
            PatternKind::Literal(expr) => {
                let info = self.reduce_value(expr);
                self.record(pattern.id, info);
            }
            PatternKind::Expression(expr) => {
                let info = self.reduce_value(expr);
                let is_name = matches!(
                    expr.kind,
                    ExprKind::Identifier(_) | ExprKind::Attribute { .. }
                );
                if !info.is_constant() && !is_name {
                    self.error(invalid(
                        "expression patterns must be constants or variables",
                        expr.span,
                    ));
                }
                self.record(pattern.id, info);
            }
            PatternKind::Bind(ident) => {
                let data_type = if test.is_hard() {
                    test.clone()
                } else {
                    DataType::variant()
                };
                self.declare_local(
                    &ident.name,
                    pattern.id,
                    data_type.clone(),
                    LocalKind::PatternBind,
                    ident.span,
                    None,
                );
                self.record(
                    pattern.id,
                    ExprInfo {
                        data_type,
                        source: Some(IdentifierSource::Local {
                            decl: pattern.id,
                            kind: LocalKind::PatternBind,
                        }),
                        ..Default::default()
                    },
                );
            }
            PatternKind::Wildcard => {}
            PatternKind::Rest => {
                self.error(invalid("\"..\" must be the last element of the pattern", pattern.span));
            }
            PatternKind::Array(elements) => {
                if test.is_hard() && !test.is_variant() && test.builtin_type() != Some(VariantType::Array) {
                    self.error(invalid("array pattern cannot match this value", pattern.span));
                }
                let element_type = test.element_type(0).cloned().unwrap_or_else(DataType::variant);
                let last = elements.len().saturating_sub(1);
                for (index, element) in elements.iter().enumerate() {
                    if matches!(element.kind, PatternKind::Rest) && index == last {
                        continue;
                    }
                    self.resolve_pattern(element, &element_type);
                }
            }
            PatternKind::Dictionary(entries) => {
                if test.is_hard() && !test.is_variant() && test.builtin_type() != Some(VariantType::Dictionary) {
                    self.error(invalid("dictionary pattern cannot match this value", pattern.span));
                }
                let value_type = test.element_type(1).cloned().unwrap_or_else(DataType::variant);
                let last = entries.len().saturating_sub(1);
                for (index, (key, value)) in entries.iter().enumerate() {
                    match &key.kind {
                        PatternKind::Rest if index == last && value.is_none() => continue,
                        PatternKind::Literal(_) | PatternKind::Expression(_) => {
                            self.resolve_pattern(key, &DataType::variant());
                            let constant = self.reduced(key.id).is_some_and(|info| info.is_constant());
                            if !constant {
                                self.error(invalid("dictionary pattern keys must be constant", key.span));
                            }
                        }
                        _ => {
                            self.error(invalid("dictionary pattern keys must be constant", key.span));
                            continue;
                        }
                    }
                    if let Some(value) = value {
                        self.resolve_pattern(value, &value_type);
                    }
                }
            }
        }
    }
}
