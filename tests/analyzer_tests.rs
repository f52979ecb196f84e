//! Analyzer diagnostics, warnings and the unit status ladder.

mod common;

use brscript_compiler::UnitStatus;
use brscript_core::{
    Diagnostic, ResolutionError, ScriptProperty, ScriptSettings, TypeError, Variant, WarningCode, WarningLevel,
};
use brscript_parser::ast::{BinaryOp, ClassId};
use brscript_parser::build::TreeBuilder;
use common::{Project, analysis_errors};

fn errors(project: &Project, path: &str) -> Vec<Diagnostic> {
    analysis_errors(project.unit(path))
}

fn has_resolution(diagnostics: &[Diagnostic], f: impl Fn(&ResolutionError) -> bool) -> bool {
    diagnostics.iter().filter_map(Diagnostic::as_resolution).any(f)
}

fn has_type_error(diagnostics: &[Diagnostic], f: impl Fn(&TypeError) -> bool) -> bool {
    diagnostics.iter().filter_map(Diagnostic::as_type_error).any(f)
}

/// A single function `run` with the given body.
fn with_run(project: &Project, path: &str, body: impl Fn(&TreeBuilder) -> Vec<brscript_parser::ast::Stmt> + Send + Sync + 'static) {
    project.file(path, move |b| {
        let statements = body(b);
        b.add_function(b.head(), b.func("run", vec![], statements));
    });
}

// =============================================================================
// Status ladder
// =============================================================================

#[test]
fn units_climb_the_status_ladder() {
    let project = Project::new();
    project.file("res://ladder.br", |b| {
        b.add_variable(b.head(), b.var("value").with_type(b.ty("int")));
    });
    let cache = project.language.cache();

    let unit = cache.get_unit("res://ladder.br", UnitStatus::Parsed).unwrap();
    assert_eq!(unit.status(), UnitStatus::Parsed);
    assert!(unit.member(ClassId::HEAD, "value").is_none());

    cache.get_unit("res://ladder.br", UnitStatus::InheritanceSolved).unwrap();
    assert_eq!(unit.status().name(), "INHERITANCE_SOLVED");
    assert_eq!(
        unit.with_class(ClassId::HEAD, |class| class.native_base.clone()).flatten().as_deref(),
        Some("RefCounted")
    );

    cache.get_unit("res://ladder.br", UnitStatus::InterfaceSolved).unwrap();
    let member = unit.member(ClassId::HEAD, "value").unwrap();
    assert_eq!(member.data_type.to_string(), "int");

    let solved = project.solved("res://ladder.br");
    assert_eq!(solved.status(), UnitStatus::FullySolved);
    assert!(solved.errors().is_empty());
}

#[test]
fn native_base_follows_the_extends_chain() {
    let project = Project::new();
    project.file("res://base.br", |b| b.extends_name(b.head(), &["Node"]));
    project.file("res://derived.br", |b| b.extends_path(b.head(), "res://base.br", &[]));

    let unit = project.solved("res://derived.br");
    let native = unit.with_class(ClassId::HEAD, |class| class.native_base.clone()).flatten();
    assert_eq!(native.as_deref(), Some("Node"));
    assert!(unit.dependencies().contains(&"res://base.br".to_string()));
}

#[test]
fn nested_classes_extend_siblings_by_name() {
    let project = Project::new();
    project.file("res://nested.br", |b| {
        let head = b.head();
        let shape = b.inner_class(head, "Shape");
        b.add_variable(shape, b.var("sides").with_initializer(b.int(0)));
        let square = b.inner_class(head, "Square");
        b.extends_name(square, &["Shape"]);
    });

    let unit = project.solved("res://nested.br");
    let base = unit
        .with_class(ClassId(2), |class| class.base.class_key().map(|key| key.fqcn.to_string()))
        .flatten();
    assert_eq!(base.as_deref(), Some("res://nested.br::Shape"));
}

// =============================================================================
// Resolution errors
// =============================================================================

#[test]
fn unknown_names_are_reported() {
    let project = Project::new();
    project.file("res://unknown_type.br", |b| {
        b.add_variable(b.head(), b.var("item").with_type(b.ty("Missing")));
    });
    with_run(&project, "res://unknown_name.br", |b| vec![b.return_stmt(Some(b.ident("ghost")))]);

    let diagnostics = errors(&project, "res://unknown_type.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::UnresolvedType { name, .. } if name == "Missing"
    )));
    let diagnostics = errors(&project, "res://unknown_name.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::UnresolvedIdentifier { name, .. } if name == "ghost"
    )));
}

#[test]
fn missing_bases_fail_inheritance() {
    let project = Project::new();
    project.file("res://orphan.br", |b| b.extends_name(b.head(), &["Nowhere"]));

    let result = project
        .language
        .cache()
        .get_unit("res://orphan.br", UnitStatus::InheritanceSolved);
    let diagnostics = analysis_errors(result);
    assert!(has_resolution(&diagnostics, |e| matches!(e, ResolutionError::MissingBase { .. })));
}

#[test]
fn duplicate_members_are_reported() {
    let project = Project::new();
    project.file("res://twice.br", |b| {
        b.add_variable(b.head(), b.var("speed"));
        b.add_variable(b.head(), b.var("speed"));
    });

    let diagnostics = errors(&project, "res://twice.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::DuplicateMember { member, .. } if member == "speed"
    )));
}

#[test]
fn members_may_not_redefine_native_members() {
    let project = Project::new();
    project.file("res://named.br", |b| {
        b.extends_name(b.head(), &["Node"]);
        b.add_variable(b.head(), b.var("name"));
    });

    let diagnostics = errors(&project, "res://named.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::MemberConflictNative { member, native, .. } if member == "name" && native == "Node"
    )));
}

#[test]
fn members_may_not_redefine_base_variables() {
    let project = Project::new();
    project.file("res://base.br", |b| {
        b.add_variable(b.head(), b.var("armor"));
        b.add_function(b.head(), b.func("describe", vec![], vec![b.pass_stmt()]));
    });
    project.file("res://derived.br", |b| {
        b.extends_path(b.head(), "res://base.br", &[]);
        b.add_variable(b.head(), b.var("armor"));
        b.add_function(b.head(), b.func("describe", vec![], vec![b.pass_stmt()]));
    });

    let diagnostics = errors(&project, "res://derived.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::MemberConflictBase { member, .. } if member == "armor"
    )));
    // Overriding a function is allowed.
    assert!(!has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::MemberConflictBase { member, .. } if member == "describe"
    )));
}

#[test]
fn class_names_may_not_hide_native_classes() {
    let project = Project::new();
    project.file("res://fake_node.br", |b| b.set_class_name("Node"));

    let diagnostics = errors(&project, "res://fake_node.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::HidesGlobal { name, kind, .. } if name == "Node" && kind == "native class"
    )));
}

#[test]
fn constants_referring_to_each_other_are_cyclic() {
    let project = Project::new();
    project.file("res://loop.br", |b| {
        b.add_constant(b.head(), b.constant("A", b.ident("B")));
        b.add_constant(b.head(), b.constant("B", b.ident("A")));
    });

    let diagnostics = errors(&project, "res://loop.br");
    assert!(has_resolution(&diagnostics, |e| matches!(e, ResolutionError::CyclicReference { .. })));
}

#[test]
fn static_functions_cannot_read_instance_members() {
    let project = Project::new();
    project.file("res://static.br", |b| {
        b.add_variable(b.head(), b.var("value"));
        b.add_function(
            b.head(),
            b.func("read", vec![], vec![b.return_stmt(Some(b.ident("value")))]).with_static(),
        );
        b.add_function(
            b.head(),
            b.func("me", vec![], vec![b.return_stmt(Some(b.self_ref()))]).with_static(),
        );
    });

    let diagnostics = errors(&project, "res://static.br");
    assert!(has_resolution(&diagnostics, |e| matches!(
        e,
        ResolutionError::InstanceFromStatic { member, .. } if member == "value"
    )));
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::InvalidContext { message, .. } if message.contains("self")
    )));
}

// =============================================================================
// Type errors
// =============================================================================

#[test]
fn incompatible_initializers_are_reported() {
    let project = Project::new();
    project.file("res://typed.br", |b| {
        b.add_variable(b.head(), b.var("hp").with_type(b.ty("int")).with_initializer(b.string("full")));
    });

    let diagnostics = errors(&project, "res://typed.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::IncompatibleAssignment { expected, found, .. } if expected == "int" && found == "String"
    )));
}

#[test]
fn int_constants_widen_to_float() {
    let project = Project::new();
    project.file("res://widen.br", |b| {
        b.add_variable(b.head(), b.var("speed").with_type(b.ty("float")).with_initializer(b.int(2)));
    });

    let unit = project.solved("res://widen.br");
    assert!(unit.errors().is_empty());
}

fn adder(b: &TreeBuilder) {
    b.add_function(
        b.head(),
        b.func(
            "add",
            vec![b.param("a").with_type(b.ty("int")), b.param("b").with_type(b.ty("int"))],
            vec![b.return_stmt(Some(b.binary(BinaryOp::Add, b.ident("a"), b.ident("b"))))],
        )
        .returns(b.ty("int")),
    );
}

#[test]
fn call_arguments_are_checked() {
    let project = Project::new();
    project.file("res://calls.br", |b| {
        adder(b);
        b.add_function(
            b.head(),
            b.func(
                "run",
                vec![],
                vec![
                    b.var_stmt(b.var("one").with_initializer(b.call("add", vec![b.int(1)]))),
                    b.var_stmt(b.var("two").with_initializer(b.call("add", vec![b.int(1), b.string("x")]))),
                    b.return_stmt(Some(b.binary(BinaryOp::Add, b.ident("one"), b.ident("two")))),
                ],
            ),
        );
    });

    let diagnostics = errors(&project, "res://calls.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::ArgumentCount { function, min: 2, max: 2, found: 1, .. } if function == "add"
    )));
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::IncompatibleArgument { index: 2, expected, .. } if expected == "int"
    )));
}

#[test]
fn typed_functions_must_return_on_every_path() {
    let project = Project::new();
    project.file("res://returns.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "maybe",
                vec![b.param("flag").with_type(b.ty("bool"))],
                vec![b.if_stmt(b.ident("flag"), vec![b.return_stmt(Some(b.int(1)))], None)],
            )
            .returns(b.ty("int")),
        );
        b.add_function(
            b.head(),
            b.func("bare", vec![], vec![b.return_stmt(None)]).returns(b.ty("int")),
        );
        b.add_function(
            b.head(),
            b.func(
                "both",
                vec![b.param("flag").with_type(b.ty("bool"))],
                vec![b.if_stmt(
                    b.ident("flag"),
                    vec![b.return_stmt(Some(b.int(1)))],
                    Some(vec![b.return_stmt(Some(b.int(2)))]),
                )],
            )
            .returns(b.ty("int")),
        );
    });

    let diagnostics = errors(&project, "res://returns.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::MissingReturn { function, .. } if function == "maybe"
    )));
    assert!(!has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::MissingReturn { function, .. } if function == "both"
    )));
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::IncompatibleReturn { found, .. } if found == "void"
    )));
}

#[test]
fn void_results_cannot_be_used() {
    let project = Project::new();
    project.file("res://void.br", |b| {
        b.add_function(
            b.head(),
            b.func("nothing", vec![], vec![b.pass_stmt()]).returns(b.ty("void")),
        );
        b.add_function(
            b.head(),
            b.func("run", vec![], vec![b.return_stmt(Some(b.call("nothing", vec![])))]),
        );
    });

    let diagnostics = errors(&project, "res://void.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::VoidValue { function, .. } if function == "nothing"
    )));
}

#[test]
fn constants_are_read_only() {
    let project = Project::new();
    project.file("res://readonly.br", |b| {
        b.add_constant(b.head(), b.constant("MAX", b.int(3)));
        b.add_function(
            b.head(),
            b.func("run", vec![], vec![b.expr_stmt(b.assign(b.ident("MAX"), b.int(4)))]),
        );
    });

    let diagnostics = errors(&project, "res://readonly.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::ReadOnlyAssignment { name, .. } if name == "MAX"
    )));
}

#[test]
fn constant_initializers_must_fold() {
    let project = Project::new();
    project.file("res://fold.br", |b| {
        b.add_function(
            b.head(),
            b.func("helper", vec![], vec![b.return_stmt(Some(b.int(1)))]).with_static(),
        );
        b.add_constant(b.head(), b.constant("VALUE", b.call("helper", vec![])));
    });

    let diagnostics = errors(&project, "res://fold.br");
    assert!(has_type_error(&diagnostics, |e| matches!(e, TypeError::NotConstant { .. })));
}

#[test]
fn invalid_operands_are_reported() {
    let project = Project::new();
    with_run(&project, "res://ops.br", |b| {
        vec![b.return_stmt(Some(b.binary(BinaryOp::Add, b.int(1), b.string("a"))))]
    });

    let diagnostics = errors(&project, "res://ops.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::InvalidOperator { op, .. } if op == "+"
    )));
}

#[test]
fn statements_must_fit_their_context() {
    let project = Project::new();
    with_run(&project, "res://context.br", |b| {
        vec![
            b.break_stmt(),
            b.var_stmt(b.var("twice").with_initializer(b.int(1))),
            b.var_stmt(b.var("twice").with_initializer(b.int(2))),
            b.return_stmt(Some(b.ident("twice"))),
        ]
    });

    let diagnostics = errors(&project, "res://context.br");
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::InvalidContext { message, .. } if message.contains("break")
    )));
    assert!(has_type_error(&diagnostics, |e| matches!(
        e,
        TypeError::InvalidContext { message, .. } if message.contains("already declared")
    )));
}

// =============================================================================
// Constants
// =============================================================================

#[test]
fn constants_fold_in_any_declaration_order() {
    let project = Project::new();
    project.file("res://consts.br", |b| {
        b.add_constant(b.head(), b.constant("DOUBLE", b.binary(BinaryOp::Mul, b.ident("BASE"), b.int(2))));
        b.add_constant(b.head(), b.constant("BASE", b.binary(BinaryOp::Add, b.int(2), b.int(3))));
    });

    let unit = project.solved("res://consts.br");
    assert_eq!(unit.member(ClassId::HEAD, "BASE").unwrap().value, Some(Variant::Int(5)));
    assert_eq!(unit.member(ClassId::HEAD, "DOUBLE").unwrap().value, Some(Variant::Int(10)));
    assert_eq!(unit.member(ClassId::HEAD, "DOUBLE").unwrap().data_type.to_string(), "int");
}

#[test]
fn enum_values_count_up_from_the_previous_value() {
    let project = Project::new();
    project.file("res://enums.br", |b| {
        b.add_enum(
            b.head(),
            b.enumeration(None, vec![("LOW", None), ("MID", Some(b.int(5))), ("HIGH", None)]),
        );
        b.add_enum(
            b.head(),
            b.enumeration(Some("Color"), vec![("RED", None), ("GREEN", None)]),
        );
    });

    let unit = project.solved("res://enums.br");
    assert_eq!(unit.member(ClassId::HEAD, "LOW").unwrap().value, Some(Variant::Int(0)));
    assert_eq!(unit.member(ClassId::HEAD, "HIGH").unwrap().value, Some(Variant::Int(6)));
    let Some(Variant::Dictionary(color)) = unit.member(ClassId::HEAD, "Color").unwrap().value else {
        panic!("expected a dictionary for a named enum");
    };
    assert_eq!(color.get(&Variant::String("GREEN".to_string())), Some(Variant::Int(1)));
}

#[test]
fn inferred_members_take_the_initializer_type() {
    let project = Project::new();
    project.file("res://infer.br", |b| {
        b.add_variable(b.head(), b.var("speed").inferred(b.float(2.5)));
        b.add_variable(b.head(), b.var("anything").inferred(b.null()));
    });

    let unit = project.solved("res://infer.br");
    assert_eq!(unit.member(ClassId::HEAD, "speed").unwrap().data_type.to_string(), "float");
    assert_eq!(unit.warnings_with(WarningCode::InferenceOnVariant).len(), 1);
}

// =============================================================================
// Warnings
// =============================================================================

#[test]
fn unused_locals_and_parameters_warn() {
    let project = Project::new();
    project.file("res://unused.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "run",
                vec![b.param("unused"), b.param("_ignored")],
                vec![
                    b.var_stmt(b.var("temp").with_initializer(b.int(1))),
                    b.const_stmt(b.constant("LIMIT", b.int(2))),
                    b.var_stmt(b.var("_scratch").with_initializer(b.int(3))),
                ],
            ),
        );
    });

    let unit = project.solved("res://unused.br");
    assert_eq!(unit.warnings_with(WarningCode::UnusedParameter).len(), 1);
    assert_eq!(unit.warnings_with(WarningCode::UnusedVariable).len(), 1);
    assert_eq!(unit.warnings_with(WarningCode::UnusedLocalConstant).len(), 1);
}

#[test]
fn shadowing_members_warns() {
    let project = Project::new();
    project.file("res://shadow.br", |b| {
        b.extends_name(b.head(), &["Node"]);
        b.add_variable(b.head(), b.var("speed"));
        b.add_function(
            b.head(),
            b.func(
                "run",
                vec![],
                vec![
                    b.var_stmt(b.var("speed").with_initializer(b.int(1))),
                    b.var_stmt(b.var("name").with_initializer(b.string("local"))),
                    b.return_stmt(Some(b.array(vec![b.ident("speed"), b.ident("name")]))),
                ],
            ),
        );
    });

    let unit = project.solved("res://shadow.br");
    assert_eq!(unit.warnings_with(WarningCode::ShadowedVariable).len(), 1);
    assert_eq!(unit.warnings_with(WarningCode::ShadowedVariableBaseClass).len(), 1);
}

#[test]
fn code_after_return_is_unreachable_once() {
    let project = Project::new();
    with_run(&project, "res://unreachable.br", |b| {
        vec![b.return_stmt(None), b.pass_stmt(), b.pass_stmt()]
    });

    let unit = project.solved("res://unreachable.br");
    assert_eq!(unit.warnings_with(WarningCode::UnreachableCode).len(), 1);
}

#[test]
fn expression_statements_without_effect_warn() {
    let project = Project::new();
    project.file("res://standalone.br", |b| {
        adder(b);
        b.add_function(
            b.head(),
            b.func(
                "run",
                vec![],
                vec![
                    b.expr_stmt(b.binary(BinaryOp::Add, b.int(1), b.int(2))),
                    b.expr_stmt(b.call("add", vec![b.int(1), b.int(2)])),
                ],
            ),
        );
    });

    let unit = project.solved("res://standalone.br");
    assert_eq!(unit.warnings_with(WarningCode::StandaloneExpression).len(), 1);
    // Discarded return values are ignored by default.
    assert!(unit.warnings_with(WarningCode::ReturnValueDiscarded).is_empty());
}

#[test]
fn integer_division_warns() {
    let project = Project::new();
    project.file("res://divide.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "half",
                vec![b.param("value").with_type(b.ty("int"))],
                vec![b.return_stmt(Some(b.binary(BinaryOp::Div, b.ident("value"), b.int(2))))],
            ),
        );
    });

    let unit = project.solved("res://divide.br");
    assert_eq!(unit.warnings_with(WarningCode::IntegerDivision).len(), 1);
}

#[test]
fn warning_levels_can_be_overridden() {
    let mut settings = ScriptSettings::default();
    settings
        .set_warning_level(WarningCode::UnusedParameter, WarningLevel::Ignore)
        .set_warning_level(WarningCode::ReturnValueDiscarded, WarningLevel::Warn);
    let project = Project::with_settings(settings);
    project.file("res://levels.br", |b| {
        adder(b);
        b.add_function(
            b.head(),
            b.func(
                "run",
                vec![b.param("unused")],
                vec![b.expr_stmt(b.call("add", vec![b.int(1), b.int(2)]))],
            ),
        );
    });

    let unit = project.solved("res://levels.br");
    assert!(unit.warnings_with(WarningCode::UnusedParameter).is_empty());
    assert_eq!(unit.warnings_with(WarningCode::ReturnValueDiscarded).len(), 1);
}

#[test]
fn warnings_can_fail_the_analysis() {
    let mut settings = ScriptSettings::default();
    settings.set_property(ScriptProperty::WarningsAsErrors, 1);
    let project = Project::with_settings(settings);
    with_run(&project, "res://strict.br", |b| {
        vec![b.var_stmt(b.var("temp").with_initializer(b.int(1)))]
    });

    let diagnostics = errors(&project, "res://strict.br");
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.warning_code() == Some(WarningCode::UnusedVariable))
    );
}

#[test]
fn disabled_warnings_are_not_reported() {
    let mut settings = ScriptSettings::default();
    settings.set_property(ScriptProperty::WarningsEnabled, 0);
    let project = Project::with_settings(settings);
    with_run(&project, "res://quiet.br", |b| {
        vec![b.var_stmt(b.var("temp").with_initializer(b.int(1))), b.expr_stmt(b.int(3))]
    });

    let unit = project.solved("res://quiet.br");
    assert!(unit.warnings().is_empty());
}

#[test]
fn static_functions_called_through_an_instance_warn() {
    let project = Project::new();
    project.file("res://advisory.br", |b| {
        b.add_function(b.head(), b.func("helper", vec![], vec![b.pass_stmt()]).with_static());
        b.add_function(
            b.head(),
            b.func(
                "run",
                vec![],
                vec![
                    b.expr_stmt(b.method(b.self_ref(), "helper", vec![])),
                    b.expr_stmt(b.call("helper", vec![])),
                ],
            ),
        );
    });

    let unit = project.solved("res://advisory.br");
    let warnings = unit.warnings_with(WarningCode::StaticCalledOnInstance);
    assert_eq!(warnings.len(), 1);
    assert!(!warnings[0].is_error());
}

#[test]
fn repeated_requests_do_not_repeat_diagnostics() {
    let project = Project::new();
    project.file("res://base.br", |b| {
        b.add_function(
            b.head(),
            b.func("run", vec![], vec![b.var_stmt(b.var("temp").with_initializer(b.int(1)))]),
        );
    });
    project.file("res://derived.br", |b| b.extends_path(b.head(), "res://base.br", &[]));
    with_run(&project, "res://broken.br", |b| vec![b.return_stmt(Some(b.ident("ghost")))]);
    let cache = project.language.cache();

    // The base is first raised on behalf of the derived script.
    project.solved("res://derived.br");
    let base = project.solved("res://base.br");
    cache.get_unit("res://base.br", UnitStatus::InterfaceSolved).unwrap();
    project.solved("res://base.br");
    assert_eq!(base.warnings_with(WarningCode::UnusedVariable).len(), 1);

    let unresolved = |diagnostics: &[Diagnostic]| {
        diagnostics
            .iter()
            .filter_map(Diagnostic::as_resolution)
            .filter(|e| matches!(e, ResolutionError::UnresolvedIdentifier { .. }))
            .count()
    };
    let first = errors(&project, "res://broken.br");
    let second = errors(&project, "res://broken.br");
    assert_eq!(unresolved(&first), 1);
    assert_eq!(unresolved(&second), 1);
    assert_eq!(first.len(), second.len());
}
