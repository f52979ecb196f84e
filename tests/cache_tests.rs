//! Script cache: units, shallow and full scripts, dependencies and
//! invalidation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brscript_compiler::UnitStatus;
use brscript_core::{CacheError, ReloadError, ResolutionError, ScriptError};
use brscript_parser::ast::ClassId;
use brscript_parser::build::TreeBuilder;
use brscript_registry::ClassRegistry;
use common::{Project, analysis_errors};

fn simple(b: &TreeBuilder) {
    b.add_variable(b.head(), b.var("value").with_initializer(b.int(1)));
}

fn base_and_derived(project: &Project) {
    project.file("res://base.br", |b| {
        b.extends_name(b.head(), &["Node"]);
        b.add_variable(b.head(), b.var("armor").with_initializer(b.int(5)));
    });
    project.file("res://derived.br", |b| {
        b.extends_path(b.head(), "res://base.br", &[]);
    });
}

// =============================================================================
// Scripts
// =============================================================================

#[test]
fn shallow_scripts_become_full_in_place() {
    let project = Project::new();
    project.file("res://simple.br", simple);
    let cache = project.language.cache();

    let shallow = cache.get_shallow_script("res://simple.br", None).unwrap();
    assert!(!shallow.is_valid());
    assert_eq!(cache.get_unit("res://simple.br", UnitStatus::Parsed).unwrap().status(), UnitStatus::Parsed);

    let full = cache.get_full_script("res://simple.br", false).unwrap();
    assert!(Arc::ptr_eq(&shallow, &full));
    assert!(full.is_valid());
}

#[test]
fn repeated_loads_share_one_script() {
    let project = Project::new();
    project.file("res://simple.br", simple);

    let first = project.load("res://simple.br");
    let second = project.load("res://simple.br");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(project.parser.parse_count(), 1);
    assert_eq!(project.language.cache().scripts().len(), 1);
}

#[test]
fn missing_files_are_not_cached() {
    let project = Project::new();

    let result = project.try_load("res://missing.br");
    assert!(matches!(
        result,
        Err(ScriptError::Cache(CacheError::FileNotFound { ref path })) if path == "res://missing.br"
    ));
    assert!(!project.language.cache().has_unit("res://missing.br"));
}

#[test]
fn parse_failures_keep_the_failed_unit() {
    let project = Project::new();
    project.broken_file("res://broken.br");
    let cache = project.language.cache();

    let result = project.try_load("res://broken.br");
    let Err(ScriptError::Cache(CacheError::ParseFailed { diagnostics, .. })) = result else {
        panic!("expected a parse failure");
    };
    assert_eq!(diagnostics.len(), 1);
    assert!(cache.has_unit("res://broken.br"));

    // The failed unit answers again without another parse.
    let parses = project.parser.parse_count();
    assert!(matches!(
        cache.get_unit("res://broken.br", UnitStatus::FullySolved),
        Err(CacheError::ParseFailed { .. })
    ));
    assert_eq!(project.parser.parse_count(), parses);
}

#[test]
fn analysis_failures_surface_through_the_reload() {
    let project = Project::new();
    project.file("res://bad.br", |b| {
        b.add_function(
            b.head(),
            b.func("run", vec![], vec![b.return_stmt(Some(b.ident("nowhere")))]),
        );
    });

    let result = project.try_load("res://bad.br");
    let Err(ScriptError::Reload(ReloadError::Cache(CacheError::AnalysisFailed { diagnostics, .. }))) = result else {
        panic!("expected an analysis failure");
    };
    assert!(diagnostics.iter().any(|d| matches!(
        d.as_resolution(),
        Some(ResolutionError::UnresolvedIdentifier { name, .. }) if name == "nowhere"
    )));

    let script = project.language.cache().get_cached_script("res://bad.br").unwrap();
    assert!(!script.is_valid());
    assert!(matches!(
        project.language.cache().add_static_script(&script),
        Err(CacheError::InvalidScript { .. })
    ));
}

#[test]
fn static_scripts_are_kept_by_fqcn() {
    let project = Project::new();
    project.file("res://simple.br", simple);
    let cache = project.language.cache();
    let script = project.load("res://simple.br");

    cache.add_static_script(&script).unwrap();
    cache.clear();
    assert!(cache.get_cached_script("res://simple.br").is_none());
    // `clear` drops static scripts too.
    assert!(cache.remove_static_script("res://simple.br").is_none());

    let script = project.load("res://simple.br");
    cache.add_static_script(&script).unwrap();
    let kept = cache.remove_static_script("res://simple.br").unwrap();
    assert!(Arc::ptr_eq(&kept, &script));
}

// =============================================================================
// Freshness
// =============================================================================

#[test]
fn unchanged_sources_are_not_parsed_again() {
    let project = Project::new();
    project.file("res://simple.br", simple);
    let script = project.load("res://simple.br");
    let parses = project.parser.parse_count();
    let hash = project.language.cache().get_source_hash("res://simple.br");
    assert!(hash.is_some());

    let again = project.language.cache().get_full_script("res://simple.br", true).unwrap();
    assert!(Arc::ptr_eq(&script, &again));
    assert_eq!(project.parser.parse_count(), parses);
    assert_eq!(project.language.cache().get_source_hash("res://simple.br"), hash);
}

#[test]
fn changed_sources_are_recompiled_on_update() {
    let project = Project::new();
    project.file("res://simple.br", simple);
    let script = project.load("res://simple.br");
    assert!(script.get_members().contains(&"value".to_string()));

    project.file("res://simple.br", |b| {
        b.add_variable(b.head(), b.var("renamed"));
    });
    let again = project.language.cache().get_full_script("res://simple.br", true).unwrap();
    assert!(Arc::ptr_eq(&script, &again));
    assert_eq!(script.get_members(), ["renamed"]);
}

// =============================================================================
// Dependencies
// =============================================================================

#[test]
fn loading_records_dependents() {
    let project = Project::new();
    base_and_derived(&project);
    let derived = project.load("res://derived.br");
    let cache = project.language.cache();

    assert!(derived.is_valid());
    assert_eq!(cache.dependents("res://base.br"), ["res://derived.br"]);
    assert!(cache.get_cached_script("res://base.br").unwrap().is_valid());
    assert!(
        cache
            .get_unit("res://derived.br", UnitStatus::FullySolved)
            .unwrap()
            .dependencies()
            .contains(&"res://base.br".to_string())
    );
}

#[test]
fn removing_a_unit_drops_its_dependents() {
    let project = Project::new();
    base_and_derived(&project);
    project.load("res://derived.br");
    let cache = project.language.cache();
    assert!(cache.has_unit("res://derived.br"));

    cache.remove_unit("res://base.br");
    assert!(!cache.has_unit("res://base.br"));
    assert!(!cache.has_unit("res://derived.br"));
    assert!(cache.dependents("res://base.br").is_empty());

    // Scripts stay valid until they are reloaded.
    assert!(cache.get_cached_script("res://derived.br").unwrap().is_valid());
}

#[test]
fn removed_scripts_are_loaded_fresh() {
    let project = Project::new();
    project.file("res://simple.br", simple);
    let first = project.load("res://simple.br");
    let cache = project.language.cache();

    cache.remove_script("res://simple.br");
    assert!(cache.get_cached_script("res://simple.br").is_none());
    let second = project.load("res://simple.br");
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn moved_scripts_follow_their_new_path() {
    let project = Project::new();
    project.file("res://old.br", |b| {
        simple(b);
        b.inner_class(b.head(), "Part");
    });
    let script = project.load("res://old.br");
    let cache = project.language.cache();

    cache.move_script("res://old.br", "res://new.br");
    assert!(cache.get_cached_script("res://old.br").is_none());
    let moved = cache.get_cached_script("res://new.br").unwrap();
    assert!(Arc::ptr_eq(&moved, &script));
    assert_eq!(script.path(), "res://new.br");
    assert_eq!(script.find_class("Part").unwrap().fqcn(), "res://new.br::Part");
    assert!(!cache.has_unit("res://old.br"));
}

#[test]
fn moved_scripts_keep_their_dependents_and_static_entries() {
    let project = Project::new();
    base_and_derived(&project);
    project.load("res://derived.br");
    let cache = project.language.cache();
    let base = cache.get_cached_script("res://base.br").unwrap();
    cache.add_static_script(&base).unwrap();

    cache.move_script("res://base.br", "res://armor.br");
    assert_eq!(cache.dependents("res://armor.br"), ["res://derived.br"]);
    assert!(cache.dependents("res://base.br").is_empty());
    assert!(cache.remove_static_script("res://base.br").is_none());
    let kept = cache.remove_static_script("res://armor.br").unwrap();
    assert!(Arc::ptr_eq(&kept, &base));
}

fn cycle_diagnostics(project: &Project, paths: &[&str]) -> usize {
    paths
        .iter()
        .flat_map(|path| analysis_errors(project.unit(path)))
        .filter(|d| matches!(d.as_resolution(), Some(ResolutionError::CyclicInheritance { .. })))
        .count()
}

#[test]
fn cyclic_inheritance_is_reported() {
    let project = Project::new();
    project.file("res://a.br", |b| b.extends_path(b.head(), "res://b.br", &[]));
    project.file("res://b.br", |b| b.extends_path(b.head(), "res://a.br", &[]));

    let errors = analysis_errors(project.unit("res://a.br"));
    assert!(
        errors
            .iter()
            .any(|d| matches!(d.as_resolution(), Some(ResolutionError::CyclicInheritance { .. }))),
        "{errors:#?}"
    );
    assert!(project.unit("res://b.br").is_err());
    assert_eq!(cycle_diagnostics(&project, &["res://a.br", "res://b.br"]), 1);

    let b = project.language.cache().get_unit("res://b.br", UnitStatus::Parsed).unwrap();
    assert_eq!(b.with_class(ClassId::HEAD, |class| class.is_poisoned()), Some(true));
}

#[test]
fn longer_cycles_report_once() {
    let project = Project::new();
    project.file("res://a.br", |b| b.extends_path(b.head(), "res://b.br", &[]));
    project.file("res://b.br", |b| b.extends_path(b.head(), "res://c.br", &[]));
    project.file("res://c.br", |b| b.extends_path(b.head(), "res://a.br", &[]));

    assert!(project.unit("res://a.br").is_err());
    assert!(project.unit("res://b.br").is_err());
    assert!(project.unit("res://c.br").is_err());
    assert_eq!(cycle_diagnostics(&project, &["res://a.br", "res://b.br", "res://c.br"]), 1);
}

#[test]
fn concurrent_loads_share_one_script() {
    let project = Project::new();
    base_and_derived(&project);

    let scripts: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| project.load("res://derived.br")))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert!(scripts.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert!(scripts[0].is_valid());
}

#[test]
fn static_initializers_run_outside_the_cache_locks() {
    let project = Project::new();
    project.file("res://other.br", simple);
    project.file("res://boot.br", |b| {
        b.add_function(b.head(), b.func("_static_init", vec![], vec![b.pass_stmt()]).with_static());
    });

    let cache = project.language.cache().clone();
    let loaded = Arc::new(AtomicBool::new(false));
    let flag = loaded.clone();
    project.executor.set_hook(move |function| {
        if function != "_static_init" {
            return;
        }
        let cache = cache.clone();
        let other = std::thread::spawn(move || cache.get_full_script("res://other.br", false).is_ok());
        flag.store(other.join().unwrap_or(false), Ordering::SeqCst);
    });

    let boot = project.load("res://boot.br");
    assert!(boot.is_valid());
    assert!(loaded.load(Ordering::SeqCst));
}

// =============================================================================
// Global classes
// =============================================================================

#[test]
fn global_classes_are_found_without_analysis() {
    let project = Project::new();
    project.file("res://weapon.br", |b| {
        b.set_class_name("Weapon");
        b.set_icon("res://icons/weapon.svg");
        b.extends_name(b.head(), &["Node"]);
        b.add_function(b.head(), b.func("broken", vec![], vec![b.return_stmt(Some(b.ident("nowhere")))]));
    });
    project.file("res://sword.br", |b| b.extends_path(b.head(), "res://weapon.br", &[]));

    let weapon = project.language.get_global_class_name("res://weapon.br").unwrap();
    assert_eq!(weapon.name.as_deref(), Some("Weapon"));
    assert_eq!(weapon.base_type.as_deref(), Some("Node"));
    assert_eq!(weapon.icon_path.as_deref(), Some("res://icons/weapon.svg"));

    let sword = project.language.get_global_class_name("res://sword.br").unwrap();
    assert_eq!(sword.name, None);
    assert_eq!(sword.base_type.as_deref(), Some("Node"));
    assert!(project.language.get_global_class_name("res://missing.br").is_none());
    assert!(!project.language.cache().has_unit("res://weapon.br"));
}

#[test]
fn registered_global_classes_can_be_extended_by_name() {
    let project = Project::new();
    project.file("res://weapon.br", |b| {
        b.set_class_name("Weapon");
        b.extends_name(b.head(), &["Node"]);
        b.add_variable(b.head(), b.var("damage").with_initializer(b.int(3)));
    });
    project.file("res://axe.br", |b| b.extends_name(b.head(), &["Weapon"]));

    assert_eq!(project.language.register_global_class("res://weapon.br").as_deref(), Some("Weapon"));
    assert_eq!(project.registry.global_class("Weapon").unwrap().path, "res://weapon.br");

    let axe = project.load("res://axe.br");
    let (_node, instance) = project.spawn(&axe, &[]);
    assert_eq!(instance.get("damage"), Some(brscript_core::Variant::Int(3)));
    assert_eq!(axe.get_base_script().unwrap().get_global_name().as_deref(), Some("Weapon"));
}
