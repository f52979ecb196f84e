//! Performance benchmarks for the BRScript load pipeline.
//!
//! - Analysis: inheritance chains and wide classes climbing the status ladder
//! - Compilation: lowering of an already solved unit
//! - Runtime: construction, member dispatch and hot reload
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect phase timings:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

#![allow(clippy::collapsible_if)]

#[path = "../tests/common/mod.rs"]
mod common;

use brscript_compiler::Compiler;
use brscript_core::Variant;
use brscript_parser::ast::BinaryOp;
use brscript_parser::build::TreeBuilder;
use common::Project;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

/// Print the number of frames recorded so far.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    let Some(frame_view) = FRAME_VIEW.get() else {
        println!("Profiler not initialized");
        return;
    };
    let view = frame_view.lock();
    println!("\n=== Profiling: {} frames recorded ===\n", view.recent_frames().count());
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

// =============================================================================
// Fixtures
// =============================================================================

/// `count` members, each with a typed initializer and a function reading it.
fn wide_class(b: &TreeBuilder, count: usize) {
    let head = b.head();
    b.extends_name(head, &["Node"]);
    for i in 0..count {
        let member = format!("value_{i}");
        b.add_variable(
            head,
            b.var(&member).with_type(b.ty("int")).with_initializer(b.int(i as i64)),
        );
        b.add_function(
            head,
            b.func(
                &format!("scaled_{i}"),
                vec![b.param("factor").with_type(b.ty("int"))],
                vec![b.return_stmt(Some(b.binary(BinaryOp::Mul, b.ident(&member), b.ident("factor"))))],
            )
            .returns(b.ty("int")),
        );
    }
}

/// `depth` files, each extending the previous one.
fn chain(project: &Project, depth: usize) -> String {
    project.file("res://chain_0.br", |b| {
        b.extends_name(b.head(), &["Node"]);
        b.add_variable(b.head(), b.var("level_0").with_initializer(b.int(0)));
    });
    for i in 1..depth {
        let base = format!("res://chain_{}.br", i - 1);
        project.file(&format!("res://chain_{i}.br"), move |b| {
            b.extends_path(b.head(), &base, &[]);
            b.add_variable(b.head(), b.var(&format!("level_{i}")).with_initializer(b.int(i as i64)));
        });
    }
    format!("res://chain_{}.br", depth - 1)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn analysis_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("analysis");

    for depth in [1, 8, 32] {
        group.bench_function(format!("chain_{depth}"), |b| {
            b.iter_batched(
                || {
                    let project = Project::new();
                    let leaf = chain(&project, depth);
                    (project, leaf)
                },
                |(project, leaf)| {
                    black_box(project.load(&leaf));
                    end_profiling_frame();
                },
                BatchSize::SmallInput,
            );
        });
    }

    for width in [10, 100] {
        group.bench_function(format!("wide_{width}"), |b| {
            b.iter_batched(
                || {
                    let project = Project::new();
                    project.file("res://wide.br", move |b| wide_class(b, width));
                    project
                },
                |project| {
                    black_box(project.solved("res://wide.br"));
                    end_profiling_frame();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
    print_profiling_stats();
}

fn compile_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("compile");

    for width in [10, 100] {
        let project = Project::new();
        project.file("res://wide.br", move |b| wide_class(b, width));
        let unit = project.solved("res://wide.br");
        let cache = project.language.cache();
        group.bench_function(format!("wide_{width}"), |b| {
            b.iter(|| {
                let compiled = Compiler::compile(black_box(&unit), cache.as_ref());
                end_profiling_frame();
                black_box(compiled)
            });
        });
    }

    group.finish();
    print_profiling_stats();
}

fn runtime_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("runtime");

    let project = Project::new();
    project.file("res://wide.br", |b| wide_class(b, 10));
    let script = project.load("res://wide.br");

    group.bench_function("instance_create", |b| {
        b.iter_batched(
            || project.node(),
            |node| black_box(script.instance_create(&node, &[])),
            BatchSize::SmallInput,
        );
    });

    let (_node, instance) = project.spawn(&script, &[]);
    group.bench_function("member_get", |b| {
        b.iter(|| black_box(instance.get(black_box("value_5"))));
    });
    group.bench_function("method_call", |b| {
        b.iter(|| {
            let result = instance.call(black_box("scaled_5"), &[Variant::Int(3)]);
            project.executor.clear();
            black_box(result)
        });
    });

    group.bench_function("reload_keep_state", |b| {
        b.iter(|| black_box(script.reload(true)));
    });

    group.finish();
}

criterion_group!(benches, analysis_benchmarks, compile_benchmarks, runtime_benchmarks);
criterion_main!(benches);
