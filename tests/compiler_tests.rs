//! Lowering of analyzed units: instruction sequences, slots and class tables.

mod common;

use brscript_compiler::analyzer::inline_getter_name;
use brscript_compiler::{Address, CompiledBase, IMPLICIT_INITIALIZER, OpCode, STATIC_INITIALIZER};
use brscript_core::Variant;
use brscript_parser::ast::{Accessors, BinaryOp};
use common::Project;

// =============================================================================
// Functions
// =============================================================================

#[test]
fn binary_operators_write_a_temporary() {
    let project = Project::new();
    project.file("res://math.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "add",
                vec![b.param("a").with_type(b.ty("int")), b.param("b").with_type(b.ty("int"))],
                vec![b.return_stmt(Some(b.binary(BinaryOp::Add, b.ident("a"), b.ident("b"))))],
            )
            .returns(b.ty("int")),
        );
    });

    let compiled = project.compile("res://math.br");
    let add = compiled.head().unwrap().function("add").unwrap();
    add.chunk.assert_opcodes(&[OpCode::Operator, OpCode::Return, OpCode::Return]);

    let instructions = add.chunk.instructions();
    assert_eq!(instructions[0].address(0), Some(Address::Stack(2)));
    assert_eq!(instructions[0].address(1), Some(Address::Stack(0)));
    assert_eq!(instructions[0].address(2), Some(Address::Stack(1)));
    assert_eq!(instructions[1].address(0), Some(Address::Stack(2)));
    assert_eq!(instructions[2].address(0), Some(Address::Nil));
    assert_eq!(add.argument_count, 2);
    assert_eq!(add.stack_size, 3);
    assert_eq!(add.argument_names, ["a", "b"]);
}

#[test]
fn constant_expressions_are_folded() {
    let project = Project::new();
    project.file("res://folded.br", |b| {
        b.add_constant(b.head(), b.constant("MAX", b.binary(BinaryOp::Add, b.int(1), b.int(2))));
        b.add_function(
            b.head(),
            b.func(
                "twice",
                vec![],
                vec![b.return_stmt(Some(b.binary(BinaryOp::Mul, b.ident("MAX"), b.int(2))))],
            ),
        );
    });

    let compiled = project.compile("res://folded.br");
    let head = compiled.head().unwrap();
    assert_eq!(head.constants.get("MAX"), Some(&Variant::Int(3)));

    let twice = head.function("twice").unwrap();
    twice.chunk.assert_opcodes(&[OpCode::Return, OpCode::Return]);
    let Some(Address::Constant(index)) = twice.chunk.instructions()[0].address(0) else {
        panic!("expected a constant operand");
    };
    assert_eq!(
        twice.constants.get(index).and_then(|constant| constant.as_value()),
        Some(&Variant::Int(6))
    );
}

#[test]
fn branches_jump_to_their_ends() {
    let project = Project::new();
    project.file("res://branch.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "pick",
                vec![b.param("flag").with_type(b.ty("bool"))],
                vec![b.if_stmt(
                    b.ident("flag"),
                    vec![b.return_stmt(Some(b.int(1)))],
                    Some(vec![b.return_stmt(Some(b.int(2)))]),
                )],
            ),
        );
    });

    let compiled = project.compile("res://branch.br");
    let pick = compiled.head().unwrap().function("pick").unwrap();
    pick.chunk.assert_opcodes(&[
        OpCode::JumpIfNot,
        OpCode::Return,
        OpCode::Jump,
        OpCode::Return,
        OpCode::Return,
    ]);

    let instructions = pick.chunk.instructions();
    // The false branch starts at the second return, both paths meet at the
    // trailing one.
    assert_eq!(instructions[0].word(1), Some(instructions[3].offset as u32));
    assert_eq!(instructions[2].word(0), Some(instructions[4].offset as u32));
}

#[test]
fn defaults_get_one_entry_per_omitted_argument() {
    let project = Project::new();
    project.file("res://defaults.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "score",
                vec![
                    b.param("base").with_default(b.int(10)),
                    b.param("bonus").with_default(b.int(5)),
                ],
                vec![b.return_stmt(Some(b.binary(BinaryOp::Add, b.ident("base"), b.ident("bonus"))))],
            ),
        );
    });

    let compiled = project.compile("res://defaults.br");
    let score = compiled.head().unwrap().function("score").unwrap();
    assert_eq!(score.argument_count, 2);
    assert_eq!(score.default_argument_count, 2);
    assert_eq!(score.min_arguments(), 0);
    assert_eq!(score.default_entries.len(), 3);
    assert_eq!(score.entry_offset(0), 0);
    assert_eq!(score.entry_offset(2), *score.default_entries.last().unwrap());
    assert_eq!(score.method_info().default_argument_count, 2);
}

// =============================================================================
// Members
// =============================================================================

#[test]
fn members_are_read_from_their_slots() {
    let project = Project::new();
    project.file("res://slots.br", |b| {
        b.add_variable(b.head(), b.var("hp").with_type(b.ty("int")).with_initializer(b.int(10)));
        b.add_variable(b.head(), b.var("mana").with_type(b.ty("int")));
        b.add_function(
            b.head(),
            b.func("read", vec![], vec![b.return_stmt(Some(b.ident("mana")))]),
        );
    });

    let compiled = project.compile("res://slots.br");
    let head = compiled.head().unwrap();
    assert_eq!(head.members["hp"].index, 0);
    assert_eq!(head.members["mana"].index, 1);
    assert_eq!(head.member_count(), 2);

    let read = head.function("read").unwrap();
    read.chunk.assert_opcodes(&[OpCode::Return, OpCode::Return]);
    assert_eq!(read.chunk.instructions()[0].address(0), Some(Address::Member(1)));

    let initializer = head.implicit_initializer.as_ref().unwrap();
    assert_eq!(initializer.name, IMPLICIT_INITIALIZER);
    assert_eq!(initializer.chunk.opcodes().last(), Some(&OpCode::Return));
    assert!(head.static_initializer.is_none());
}

#[test]
fn derived_slots_follow_the_base_slots() {
    let project = Project::new();
    project.file("res://base.br", |b| {
        b.extends_name(b.head(), &["Node"]);
        b.add_variable(b.head(), b.var("armor"));
    });
    project.file("res://derived.br", |b| {
        b.extends_path(b.head(), "res://base.br", &[]);
        b.add_variable(b.head(), b.var("speed"));
    });

    let compiled = project.compile("res://derived.br");
    let head = compiled.head().unwrap();
    assert_eq!(head.base_member_count, 1);
    assert_eq!(head.members["speed"].index, 1);
    assert_eq!(head.native_base, "Node");
    assert!(matches!(&head.base, CompiledBase::Script(key) if &*key.path == "res://base.br"));
    assert!(head.implicit_initializer.is_none());
    assert_eq!(compiled.dependencies, ["res://base.br"]);
}

#[test]
fn statics_use_class_slots() {
    let project = Project::new();
    project.file("res://statics.br", |b| {
        b.add_variable(b.head(), b.var("count").with_initializer(b.int(0)).with_static());
        b.add_function(
            b.head(),
            b.func("read", vec![], vec![b.return_stmt(Some(b.ident("count")))]).with_static(),
        );
    });

    let compiled = project.compile("res://statics.br");
    let head = compiled.head().unwrap();
    assert_eq!(head.static_variables["count"].index, 0);
    assert!(head.members.is_empty());

    let read = head.function("read").unwrap();
    assert!(read.is_static);
    read.chunk.assert_opcodes(&[OpCode::GetStatic, OpCode::Return, OpCode::Return]);

    let initializer = head.static_initializer.as_ref().unwrap();
    assert_eq!(initializer.name, STATIC_INITIALIZER);
    initializer.chunk.assert_contains_opcodes(&[OpCode::SetStatic, OpCode::Return]);
}

#[test]
fn getters_are_called_outside_their_own_body() {
    let project = Project::new();
    project.file("res://getter.br", |b| {
        let getter = b.getter("hp", vec![b.return_stmt(Some(b.ident("hp")))]);
        b.add_variable(
            b.head(),
            b.var("hp").with_accessors(Accessors::Inline {
                getter: Some(Box::new(getter)),
                setter: None,
            }),
        );
        b.add_function(
            b.head(),
            b.func("read", vec![], vec![b.return_stmt(Some(b.ident("hp")))]),
        );
    });

    let compiled = project.compile("res://getter.br");
    let head = compiled.head().unwrap();
    let getter = head.function(&inline_getter_name("hp")).unwrap();
    getter.chunk.assert_opcodes(&[OpCode::Return, OpCode::Return]);
    assert_eq!(getter.chunk.instructions()[0].address(0), Some(Address::Member(0)));

    let read = head.function("read").unwrap();
    read.chunk.assert_opcodes(&[OpCode::CallSelf, OpCode::Return, OpCode::Return]);
    assert_eq!(head.members["hp"].getter.as_deref(), Some("@hp_getter"));
}

// =============================================================================
// Assignment chains
// =============================================================================

fn count(chunk: &brscript_compiler::BytecodeChunk, op: OpCode) -> usize {
    chunk.opcodes().iter().filter(|candidate| **candidate == op).count()
}

#[test]
fn chained_assignments_write_value_containers_back() {
    let project = Project::new();
    project.file("res://chain.br", |b| {
        // items[0].x = 1.0 on an array of vectors: the vector is a copy.
        b.add_function(
            b.head(),
            b.func(
                "values",
                vec![b.param("items").with_type(b.array_of(b.ty("Vector2")))],
                vec![b.expr_stmt(b.assign(b.attr(b.subscript(b.ident("items"), b.int(0)), "x"), b.float(1.0)))],
            ),
        );
        // grid[0][1] = 5 on an array of arrays: the inner array is shared.
        b.add_function(
            b.head(),
            b.func(
                "shared",
                vec![b.param("grid").with_type(b.array_of(b.ty("Array")))],
                vec![b.expr_stmt(b.assign(b.subscript(b.subscript(b.ident("grid"), b.int(0)), b.int(1)), b.int(5)))],
            ),
        );
    });

    let compiled = project.compile("res://chain.br");
    let head = compiled.head().unwrap();

    let values = head.function("values").unwrap();
    values
        .chunk
        .assert_contains_opcodes(&[OpCode::GetKeyed, OpCode::SetNamed, OpCode::SetKeyed, OpCode::Return]);
    assert_eq!(count(&values.chunk, OpCode::SetKeyed), 1);
    assert_eq!(count(&values.chunk, OpCode::JumpIfShared), 0);

    let shared = head.function("shared").unwrap();
    shared.chunk.assert_contains_opcodes(&[OpCode::GetKeyed, OpCode::SetKeyed, OpCode::Return]);
    assert_eq!(count(&shared.chunk, OpCode::SetKeyed), 1);
    assert_eq!(count(&shared.chunk, OpCode::JumpIfShared), 0);
}

#[test]
fn untyped_containers_are_written_back_unless_shared() {
    let project = Project::new();
    project.file("res://loose.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "loose",
                vec![b.param("items").with_type(b.ty("Array"))],
                vec![b.expr_stmt(b.assign(b.attr(b.subscript(b.ident("items"), b.int(0)), "x"), b.float(1.0)))],
            ),
        );
    });

    let compiled = project.compile("res://loose.br");
    let loose = compiled.head().unwrap().function("loose").unwrap();
    loose.chunk.assert_contains_opcodes(&[
        OpCode::GetKeyed,
        OpCode::SetNamed,
        OpCode::JumpIfShared,
        OpCode::SetKeyed,
        OpCode::Return,
    ]);

    // A shared element skips the write-back store.
    let instructions = loose.chunk.instructions();
    let jump = instructions.iter().position(|i| i.op == OpCode::JumpIfShared).unwrap();
    assert_eq!(instructions[jump + 1].op, OpCode::SetKeyed);
    assert_eq!(instructions[jump].word(1), Some(instructions[jump + 2].offset as u32));
}

// =============================================================================
// Match
// =============================================================================

#[test]
fn match_alternatives_share_the_guard_and_body() {
    let project = Project::new();
    project.file("res://match.br", |b| {
        b.add_function(
            b.head(),
            b.func(
                "pick",
                vec![b.param("value").with_type(b.ty("int")), b.param("flag").with_type(b.ty("bool"))],
                vec![b.match_stmt(
                    b.ident("value"),
                    vec![
                        b.branch(
                            vec![b.pat_literal(b.int(1)), b.pat_literal(b.int(2))],
                            Some(b.ident("flag")),
                            vec![b.return_stmt(Some(b.int(10)))],
                        ),
                        b.branch(vec![b.pat_wildcard()], None, vec![b.return_stmt(Some(b.int(20)))]),
                    ],
                )],
            ),
        );
    });

    let compiled = project.compile("res://match.br");
    let pick = compiled.head().unwrap().function("pick").unwrap();
    pick.chunk.assert_opcodes(&[
        OpCode::Assign,
        // 1
        OpCode::MatchEqual,
        OpCode::JumpIfNot,
        OpCode::Jump,
        // 2
        OpCode::MatchEqual,
        OpCode::JumpIfNot,
        OpCode::Jump,
        OpCode::Jump,
        // guard
        OpCode::JumpIfNot,
        OpCode::Return,
        OpCode::Jump,
        // _
        OpCode::Jump,
        OpCode::Jump,
        OpCode::Return,
        OpCode::Jump,
        OpCode::Return,
    ]);

    let instructions = pick.chunk.instructions();
    let at = |index: usize| Some(instructions[index].offset as u32);
    // A failed alternative tries the next one.
    assert_eq!(instructions[2].word(1), at(4));
    // Either alternative reaches the guard.
    assert_eq!(instructions[3].word(0), at(8));
    assert_eq!(instructions[6].word(0), at(8));
    // No alternative, or a false guard, moves on to the next branch.
    assert_eq!(instructions[5].word(1), at(7));
    assert_eq!(instructions[7].word(0), at(11));
    assert_eq!(instructions[8].word(1), at(11));
    // Finished branches leave the match.
    assert_eq!(instructions[10].word(0), at(15));
    assert_eq!(instructions[14].word(0), at(15));
}

// =============================================================================
// Class tables
// =============================================================================

#[test]
fn class_tables_list_every_member_kind() {
    let project = Project::new();
    project.file("res://table.br", |b| {
        b.set_class_name("Table");
        b.add_signal(b.head(), b.signal("changed", vec![b.param("value")]));
        b.add_enum(b.head(), b.enumeration(None, vec![("LOW", None), ("HIGH", None)]));
        let inner = b.inner_class(b.head(), "Leg");
        b.add_variable(inner, b.var("height"));
    });

    let compiled = project.compile("res://table.br");
    let head = compiled.head().unwrap();
    assert_eq!(head.global_name.as_deref(), Some("Table"));
    assert_eq!(head.signals["changed"].arguments.len(), 1);
    assert_eq!(head.constants.get("HIGH"), Some(&Variant::Int(1)));
    assert_eq!(head.inner_classes.get("Leg"), Some(&1));
    assert_eq!(compiled.find_class("Leg"), Some(1));

    let leg = compiled.class(1).unwrap();
    assert_eq!(leg.outer, Some(0));
    assert_eq!(leg.global_name, None);
    assert_eq!(&*leg.key.fqcn, "res://table.br::Leg");
    assert_eq!(leg.members["height"].index, 0);
}

#[test]
fn lambdas_are_listed_on_their_class() {
    let project = Project::new();
    project.file("res://lambda.br", |b| {
        let lambda = b.func("", vec![b.param("x")], vec![b.return_stmt(Some(b.ident("x")))]);
        b.add_function(
            b.head(),
            b.func("make", vec![], vec![b.return_stmt(Some(b.lambda(lambda)))]),
        );
    });

    let compiled = project.compile("res://lambda.br");
    let head = compiled.head().unwrap();
    assert_eq!(head.lambdas.len(), 1);
    assert_eq!(head.lambdas[0].argument_count, 1);
    assert_eq!(head.lambdas[0].capture_count, 0);
    assert!(!head.lambdas[0].uses_self);

    let make = head.function("make").unwrap();
    assert_eq!(make.lambdas, [0]);
    make.chunk.assert_opcodes(&[OpCode::CreateLambda, OpCode::Return, OpCode::Return]);
}

#[test]
fn lambdas_capture_enclosing_locals() {
    let project = Project::new();
    project.file("res://capture.br", |b| {
        let lambda = b.func(
            "",
            vec![b.param("x")],
            vec![b.return_stmt(Some(b.binary(BinaryOp::Add, b.ident("x"), b.ident("offset"))))],
        );
        b.add_function(
            b.head(),
            b.func(
                "make",
                vec![b.param("offset")],
                vec![b.return_stmt(Some(b.lambda(lambda)))],
            ),
        );
    });

    let compiled = project.compile("res://capture.br");
    let head = compiled.head().unwrap();
    let lambda = &head.lambdas[0];
    assert_eq!(lambda.capture_count, 1);
    // Captures come before the arguments.
    assert_eq!(lambda.chunk.instructions()[0].address(1), Some(Address::Stack(1)));
    assert_eq!(lambda.chunk.instructions()[0].address(2), Some(Address::Stack(0)));

    let make = head.function("make").unwrap();
    let create = &make.chunk.instructions()[0];
    assert_eq!(create.op, OpCode::CreateLambda);
    assert_eq!(create.trailing(), [Address::Stack(0).encode()]);
}
