//! Runtime script classes.
//!
//! A [`Script`] is one class of a script file: the head class or a nested
//! one. The head owns the file's source and its nested scripts; every
//! script owns its compiled class, its static variables, its lambda table
//! and the set of live instances.
//!
//! Scripts are created shallow by the cache (identity and nesting only) and
//! become valid when a compiled file is installed into them. A reload
//! installs a new compiled file into the same `Script` objects, so
//! references held by instances and other scripts stay valid.

use std::sync::{Arc, OnceLock, Weak};

use brscript_compiler::{CompiledBase, CompiledClass, CompiledFunction, CompiledScript};
use brscript_core::{
    AttachedInstance, CallError, Callable, ClassKey, HostObject, MethodInfo, ObjectId, ObjectRef, PropertyInfo,
    ReloadError, Variant,
};
use brscript_parser::ast::ScriptTree;
use brscript_registry::{ClassRegistry, GlobalClass};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::cache::{ScriptCache, ScriptSource};
use crate::callable::{LambdaCallable, LambdaTable, StaticCallable};
use crate::executor::FunctionCall;
use crate::value::{conform, slot_default};
use crate::{ScriptContext, ScriptInstance};

#[derive(Debug, Clone)]
struct Identity {
    path: String,
    fqcn: String,
    name: String,
}

#[derive(Default)]
struct ClassState {
    class: Option<Arc<CompiledClass>>,
    /// Compiled file; set on the head only.
    compiled: Option<Arc<CompiledScript>>,
    base: Option<Arc<Script>>,
    inner: FxHashMap<String, Arc<Script>>,
    /// Nested scripts by arena index; set on the head only. Index 0 is
    /// the head itself and stays empty.
    arena: Vec<Option<Arc<Script>>>,
    lambdas: Arc<LambdaTable>,
    valid: bool,
    static_initialized: bool,
}

/// Statics and instance members of one file, saved by name across a
/// reload.
#[derive(Default)]
pub(crate) struct SavedState {
    statics: Vec<(String, Vec<(String, Variant)>)>,
    instances: Vec<(Arc<ScriptInstance>, Vec<(String, Variant)>)>,
}

/// A script class bound to the cache it was loaded from.
pub struct Script {
    this: Weak<Script>,
    context: Arc<ScriptContext>,
    cache: Weak<ScriptCache>,
    identity: RwLock<Identity>,
    outer: RwLock<Weak<Script>>,
    state: RwLock<ClassState>,
    statics: RwLock<Vec<Variant>>,
    instances: Mutex<FxHashMap<ObjectId, Weak<ScriptInstance>>>,
    source: RwLock<ScriptSource>,
    class_object: OnceLock<ObjectRef>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identity = self.identity.read();
        f.debug_struct("Script")
            .field("fqcn", &identity.fqcn)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Script {
    fn create(context: &Arc<ScriptContext>, cache: &Weak<ScriptCache>, identity: Identity) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            context: context.clone(),
            cache: cache.clone(),
            identity: RwLock::new(identity),
            outer: RwLock::new(Weak::new()),
            state: RwLock::new(ClassState::default()),
            statics: RwLock::new(Vec::new()),
            instances: Mutex::new(FxHashMap::default()),
            source: RwLock::new(ScriptSource::Empty),
            class_object: OnceLock::new(),
        })
    }

    /// A shallow script for a parsed file: the head class with its nested
    /// classes, none of them valid yet.
    pub fn from_tree(context: &Arc<ScriptContext>, cache: &Weak<ScriptCache>, tree: &ScriptTree) -> Arc<Self> {
        let head_node = tree.head();
        let head = Self::create(
            context,
            cache,
            Identity {
                path: tree.path.clone(),
                fqcn: head_node.fqcn.clone(),
                name: head_node.name().unwrap_or(&tree.path).to_string(),
            },
        );

        let mut arena: Vec<Option<Arc<Script>>> = vec![None; tree.classes.len()];
        for node in tree.classes.iter().skip(1) {
            let script = Self::create(
                context,
                cache,
                Identity {
                    path: tree.path.clone(),
                    fqcn: node.fqcn.clone(),
                    name: node.name().unwrap_or_default().to_string(),
                },
            );
            arena[node.id.index()] = Some(script);
        }
        for node in tree.classes.iter().skip(1) {
            let (Some(script), Some(outer)) = (&arena[node.id.index()], node.outer) else {
                continue;
            };
            let outer_script = match arena.get(outer.index()).cloned().flatten() {
                Some(outer_script) => outer_script,
                None => head.clone(),
            };
            *script.outer.write() = Arc::downgrade(&outer_script);
            outer_script
                .state
                .write()
                .inner
                .insert(script.name(), script.clone());
        }
        head.state.write().arena = arena;
        head
    }

    // ========================================================================
    // Identity
    // ========================================================================

    pub fn path(&self) -> String {
        self.identity.read().path.clone()
    }

    pub fn fqcn(&self) -> String {
        self.identity.read().fqcn.clone()
    }

    /// `class_name`, the nested class name, or the path of an unnamed file.
    pub fn name(&self) -> String {
        self.identity.read().name.clone()
    }

    /// Rename the file; nested scripts follow.
    pub(crate) fn set_path(&self, path: &str) {
        let Some(head) = self.head() else {
            return;
        };
        let old = head.path();
        for script in head.arena_scripts() {
            let mut identity = script.identity.write();
            identity.path = path.to_string();
            identity.fqcn = match identity.fqcn.strip_prefix(&old) {
                Some(rest) => format!("{path}{rest}"),
                None => identity.fqcn.clone(),
            };
            if identity.name == old {
                identity.name = path.to_string();
            }
        }
    }

    pub fn context(&self) -> &Arc<ScriptContext> {
        &self.context
    }

    fn handle(&self) -> Option<Arc<Script>> {
        self.this.upgrade()
    }

    /// The head class of this script's file. `None` only while the script
    /// is being dropped.
    pub fn head(&self) -> Option<Arc<Script>> {
        let mut current = self.handle()?;
        loop {
            let outer = current.outer.read().upgrade();
            match outer {
                Some(outer) => current = outer,
                None => return Some(current),
            }
        }
    }

    pub fn is_head(&self) -> bool {
        self.outer.read().upgrade().is_none()
    }

    pub fn outer(&self) -> Option<Arc<Script>> {
        self.outer.read().upgrade()
    }

    /// This script followed by its nested scripts, in arena order.
    fn arena_scripts(&self) -> Vec<Arc<Script>> {
        let state = self.state.read();
        self.handle()
            .into_iter()
            .chain(state.arena.iter().flatten().cloned())
            .collect()
    }

    /// The class at `index` of this script's file.
    pub fn class_at(&self, index: u32) -> Option<Arc<Script>> {
        let head = self.head()?;
        if index == 0 {
            return Some(head);
        }
        let state = head.state.read();
        state.arena.get(index as usize).cloned().flatten()
    }

    /// Find a nested class by dotted name (`Inner.Deeper`) or by FQCN.
    pub fn find_class(&self, qualified: &str) -> Option<Arc<Script>> {
        let head = self.head()?;
        let path = head.path();
        let names: Vec<&str> = match qualified.strip_prefix(&path) {
            Some("") => return Some(head),
            Some(rest) => rest.trim_start_matches("::").split("::").collect(),
            None => qualified.split('.').collect(),
        };
        let mut current = head;
        for name in names {
            let next = current.state.read().inner.get(name).cloned()?;
            current = next;
        }
        Some(current)
    }

    /// The compiled class; `None` until the script is valid.
    pub fn class(&self) -> Option<Arc<CompiledClass>> {
        self.state.read().class.clone()
    }

    pub fn compiled(&self) -> Option<Arc<CompiledScript>> {
        self.head()?.state.read().compiled.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.state.read().valid
    }

    // ========================================================================
    // Source
    // ========================================================================

    pub(crate) fn set_source(&self, source: ScriptSource) {
        *self.source.write() = source;
    }

    pub fn get_source_code(&self) -> Option<String> {
        self.head()?.source.read().as_text().map(str::to_string)
    }

    /// Replace the source text; takes effect on the next reload.
    pub fn set_source_code(&self, code: impl Into<String>) {
        if let Some(head) = self.head() {
            head.set_source(ScriptSource::Text(code.into()));
        }
    }

    /// Hash of the source held by the script.
    pub fn source_hash(&self) -> u64 {
        self.head().map_or(0, |head| head.source.read().hash())
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    pub fn get_base_script(&self) -> Option<Arc<Script>> {
        self.state.read().base.clone()
    }

    /// This script followed by its base scripts, most derived first.
    pub fn chain(&self) -> Vec<Arc<Script>> {
        let mut chain = Vec::new();
        let mut current = self.handle();
        while let Some(script) = current {
            current = script.get_base_script();
            chain.push(script);
        }
        chain
    }

    /// Whether `base` is this script or one of its bases.
    pub fn inherits_script(&self, base: &Script) -> bool {
        self.chain().iter().any(|script| std::ptr::eq(script.as_ref(), base))
    }

    pub fn inherits_class(&self, key: &ClassKey) -> bool {
        self.chain()
            .iter()
            .any(|script| script.class().is_some_and(|class| class.key == *key))
    }

    /// Native class at the root of the chain.
    pub fn get_instance_base_type(&self) -> Option<String> {
        self.class().map(|class| class.native_base.clone())
    }

    pub fn get_global_name(&self) -> Option<String> {
        self.class().and_then(|class| class.global_name.clone())
    }

    // ========================================================================
    // Installing compiled code
    // ========================================================================

    /// Install a compiled file into the head script and its nested scripts.
    ///
    /// Nested scripts are reused by FQCN so existing instances keep their
    /// script. Bases are linked before anything is swapped; a base whose
    /// layout does not match the compiled class fails the install and
    /// leaves the previous version live.
    pub(crate) fn install(&self, compiled: Arc<CompiledScript>) -> Result<(), ReloadError> {
        let Some(head) = self.handle() else {
            return Ok(());
        };
        let path = head.path();

        let previous: FxHashMap<String, Arc<Script>> = head
            .arena_scripts()
            .into_iter()
            .skip(1)
            .map(|script| (script.fqcn(), script))
            .collect();
        let mut scripts: Vec<Arc<Script>> = Vec::with_capacity(compiled.classes.len());
        for (index, class) in compiled.classes.iter().enumerate() {
            let script = if index == 0 {
                head.clone()
            } else {
                match previous.get(&*class.key.fqcn) {
                    Some(script) => script.clone(),
                    None => Self::create(
                        &self.context,
                        &self.cache,
                        Identity {
                            path: path.clone(),
                            fqcn: class.key.fqcn.to_string(),
                            name: class.key.name.to_string(),
                        },
                    ),
                }
            };
            scripts.push(script);
        }

        let mut bases: Vec<Option<Arc<Script>>> = Vec::with_capacity(scripts.len());
        for class in &compiled.classes {
            let (base, base_members) = match &class.base {
                CompiledBase::Native(_) => (None, 0),
                CompiledBase::Script(key) if *key.path == *path => (
                    scripts.get(key.index as usize).cloned(),
                    compiled.class(key.index).map_or(0, |base| base.member_count()),
                ),
                CompiledBase::Script(key) => {
                    let base = self.link_external(&path, key)?;
                    let members = base.class().map_or(0, |base| base.member_count());
                    (Some(base), members)
                }
            };
            if let CompiledBase::Script(key) = &class.base {
                if base.is_none() || class.base_member_count != base_members {
                    return Err(ReloadError::Link {
                        path: path.clone(),
                        base: key.fqcn.to_string(),
                    });
                }
            }
            bases.push(base);
        }

        let mut arena: Vec<Option<Arc<Script>>> = vec![None; scripts.len()];
        for (index, (class, base)) in compiled.classes.iter().zip(bases).enumerate() {
            let script = &scripts[index];
            let mut inner = FxHashMap::default();
            for (name, &inner_index) in &class.inner_classes {
                if let Some(nested) = scripts.get(inner_index as usize) {
                    inner.insert(name.clone(), nested.clone());
                }
            }
            let outer = class
                .outer
                .and_then(|outer| scripts.get(outer as usize))
                .map(Arc::downgrade)
                .unwrap_or_default();
            *script.outer.write() = outer;
            script.swap_class(Arc::new(class.clone()), base, inner);
            if index > 0 {
                arena[index] = Some(script.clone());
            }
        }
        {
            let mut state = head.state.write();
            state.arena = arena;
            state.compiled = Some(compiled.clone());
        }

        for script in &scripts {
            script.run_static_initializers();
        }
        if let Some(class) = head.class() {
            head.register_global_class(&class);
        }
        debug!(path = %path, classes = scripts.len(), "script installed");
        Ok(())
    }

    fn link_external(&self, path: &str, key: &ClassKey) -> Result<Arc<Script>, ReloadError> {
        let link_error = || ReloadError::Link {
            path: path.to_string(),
            base: key.fqcn.to_string(),
        };
        let cache = self.cache.upgrade().ok_or_else(link_error)?;
        let file = match cache.get_full_script(&key.path, false) {
            Ok(file) => file,
            Err(err) => {
                warn!(path, base = %key.fqcn, error = %err, "base script failed to load");
                return Err(link_error());
            }
        };
        file.class_at(key.index)
            .filter(|script| script.fqcn() == *key.fqcn)
            .or_else(|| file.find_class(&key.fqcn))
            .filter(|script| script.is_valid())
            .ok_or_else(link_error)
    }

    fn swap_class(&self, class: Arc<CompiledClass>, base: Option<Arc<Script>>, inner: FxHashMap<String, Arc<Script>>) {
        let statics = {
            let mut statics = Vec::new();
            for slot in class.statics_in_order() {
                let index = slot.index as usize;
                if statics.len() <= index {
                    statics.resize(index + 1, Variant::Nil);
                }
                statics[index] = slot_default(&slot.data_type);
            }
            statics
        };
        {
            let mut state = self.state.write();
            let kept = state.lambdas.retarget(&class.lambdas);
            if !state.lambdas.is_empty() {
                debug!(fqcn = %self.fqcn(), kept, total = state.lambdas.len(), "lambdas retargeted");
            }
            state.lambdas = Arc::new(LambdaTable::new(&class.lambdas));
            state.class = Some(class);
            state.base = base;
            state.inner = inner;
            state.valid = true;
            state.static_initialized = false;
        }
        *self.statics.write() = statics;
    }

    /// Run the static initializer and `_static_init`, bases in the same
    /// file first. Failures are logged; the statics keep their defaults.
    fn run_static_initializers(&self) {
        let Some(script) = self.handle() else {
            return;
        };
        let (class, base) = {
            let mut state = script.state.write();
            if state.static_initialized {
                return;
            }
            state.static_initialized = true;
            (state.class.clone(), state.base.clone())
        };
        if let Some(base) = base.filter(|base| base.path() == script.path()) {
            base.run_static_initializers();
        }
        let Some(class) = class else {
            return;
        };

        let functions = class
            .static_initializer
            .iter()
            .chain(class.functions.get("_static_init"));
        for function in functions {
            if let Err(err) = script.execute(function, None, &[]) {
                error!(fqcn = %script.fqcn(), function = %function.name, error = %err, "static initialization failed");
            }
        }
    }

    fn register_global_class(&self, class: &CompiledClass) {
        let Some(name) = &class.global_name else {
            return;
        };
        let base = match &class.base {
            CompiledBase::Native(native) => native.clone(),
            CompiledBase::Script(key) => key.name.to_string(),
        };
        self.context.registry().add_global_class(GlobalClass {
            name: name.clone(),
            path: self.path(),
            base,
            icon_path: class.icon_path.clone(),
        });
    }

    // ========================================================================
    // Reloading
    // ========================================================================

    /// Recompile the file from the source the script holds.
    ///
    /// Without `keep_state`, a file with live instances is not reloaded.
    /// With it, static variables and instance members are saved by name
    /// and replayed into the new layout. A failing reload keeps the
    /// previous version live.
    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path()))]
    pub fn reload(&self, keep_state: bool) -> Result<(), ReloadError> {
        if let Some(head) = self.head() {
            if !std::ptr::eq(head.as_ref(), self) {
                return head.reload(keep_state);
            }
        }
        let saved = self.save_state(keep_state)?;
        self.recompile()?;
        self.restore_state(saved);
        Ok(())
    }

    /// Save the statics and the live instance members of this file by
    /// name. Without `keep_state`, a file with live instances is refused.
    pub(crate) fn save_state(&self, keep_state: bool) -> Result<SavedState, ReloadError> {
        let scripts = self.arena_scripts();
        let live: usize = scripts.iter().map(|script| script.instance_count()).sum();
        if live > 0 && !keep_state {
            return Err(ReloadError::InUse {
                path: self.path(),
                count: live,
            });
        }

        let statics = scripts
            .iter()
            .map(|script| (script.fqcn(), script.saved_statics()))
            .collect();
        let instances = scripts
            .iter()
            .flat_map(|script| script.live_instances())
            .map(|instance| {
                let values = instance.snapshot();
                (instance, values)
            })
            .collect();
        Ok(SavedState { statics, instances })
    }

    /// Compile the held source and install it. A failure keeps the
    /// previous version live.
    pub(crate) fn recompile(&self) -> Result<(), ReloadError> {
        let path = self.path();
        let cache = self.cache.upgrade().ok_or_else(|| ReloadError::Link {
            path: path.clone(),
            base: "<cache>".to_string(),
        })?;
        let source = self.source.read().clone();
        let was_valid = self.is_valid();
        let installed = cache
            .compile(&path, &source)
            .map_err(ReloadError::from)
            .and_then(|compiled| self.install(compiled));
        if let Err(err) = &installed {
            if was_valid {
                warn!(path = %path, error = %err, "reload failed, keeping the previous version");
            }
        }
        installed
    }

    /// Replay saved values into the layout now installed.
    pub(crate) fn restore_state(&self, saved: SavedState) {
        for (fqcn, values) in saved.statics {
            if let Some(script) = self.find_class(&fqcn) {
                for (name, value) in values {
                    script.set_static(&name, value);
                }
            }
        }
        for (instance, values) in saved.instances {
            if instance.get_script().is_valid() {
                instance.reload_members(values);
            }
        }
    }

    fn saved_statics(&self) -> Vec<(String, Variant)> {
        let Some(class) = self.class() else {
            return Vec::new();
        };
        let statics = self.statics.read();
        class
            .statics_in_order()
            .into_iter()
            .filter_map(|slot| Some((slot.name.clone(), statics.get(slot.index as usize)?.clone())))
            .collect()
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub fn can_instantiate(&self) -> bool {
        self.class()
            .is_some_and(|class| self.is_valid() && self.context.registry().can_instantiate(&class.native_base))
    }

    /// Attach a new instance of this script to `owner` and construct it.
    pub fn instance_create(self: &Arc<Self>, owner: &ObjectRef, args: &[Variant]) -> Result<Arc<ScriptInstance>, CallError> {
        ScriptInstance::create(self, owner, args)
    }

    /// Instantiate the native base and attach a new instance to it.
    pub fn new_object(self: &Arc<Self>, args: &[Variant]) -> Result<ObjectRef, CallError> {
        let native = self.get_instance_base_type().ok_or(CallError::InstanceIsNull)?;
        let object = self
            .context
            .registry()
            .instantiate(&native)
            .ok_or_else(|| CallError::Execution {
                method: "new".to_string(),
                message: format!("native class \"{native}\" cannot be instantiated"),
            })?;
        self.instance_create(&object, args)?;
        Ok(object)
    }

    /// Whether `object` carries an instance of this script.
    pub fn instance_has(&self, object: &ObjectRef) -> bool {
        self.instances.lock().contains_key(&object.id())
    }

    pub fn instance_count(&self) -> usize {
        self.instances
            .lock()
            .values()
            .filter(|instance| instance.strong_count() > 0)
            .count()
    }

    fn live_instances(&self) -> Vec<Arc<ScriptInstance>> {
        self.instances.lock().values().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn register_instance(&self, id: ObjectId, instance: &Arc<ScriptInstance>) {
        self.instances.lock().insert(id, Arc::downgrade(instance));
    }

    pub(crate) fn unregister_instance(&self, id: ObjectId) {
        self.instances.lock().remove(&id);
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// The most derived definition of `name`, with the script declaring it.
    pub fn find_function(&self, name: &str) -> Option<(Arc<Script>, Arc<CompiledFunction>)> {
        self.chain().into_iter().find_map(|script| {
            let function = script.class()?.function(name).cloned()?;
            Some((script, function))
        })
    }

    /// Hand a compiled function of this class to the executor.
    pub fn execute(
        self: &Arc<Self>,
        function: &Arc<CompiledFunction>,
        instance: Option<&Arc<ScriptInstance>>,
        arguments: &[Variant],
    ) -> Result<Variant, CallError> {
        self.context.executor().execute(FunctionCall {
            function,
            script: self,
            instance,
            arguments,
            max_call_depth: self.context.settings().max_call_depth(),
        })
    }

    /// Check the argument count, fit every argument to its declared type,
    /// then execute.
    pub fn invoke(
        self: &Arc<Self>,
        function: &Arc<CompiledFunction>,
        instance: Option<&Arc<ScriptInstance>>,
        args: &[Variant],
    ) -> Result<Variant, CallError> {
        let method = &function.name;
        if args.len() < function.min_arguments() {
            return Err(CallError::TooFewArguments {
                method: method.clone(),
                expected: function.min_arguments(),
                found: args.len(),
            });
        }
        if args.len() > function.argument_count {
            return Err(CallError::TooManyArguments {
                method: method.clone(),
                expected: function.argument_count,
                found: args.len(),
            });
        }

        let registry = self.context.registry();
        let mut arguments = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let fitted = match function.argument_types.get(index) {
                Some(ty) => conform(arg.clone(), ty, registry).ok_or_else(|| CallError::InvalidArgument {
                    method: method.clone(),
                    index,
                    expected: ty.to_string(),
                })?,
                None => arg.clone(),
            };
            arguments.push(fitted);
        }
        let instance = if function.is_static { None } else { instance };
        self.execute(function, instance, &arguments)
    }

    /// Call a static function of the chain.
    pub fn call_static(&self, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let (script, function) = self.find_function(method).ok_or_else(|| CallError::InvalidMethod {
            method: method.to_string(),
        })?;
        if !function.is_static {
            return Err(CallError::InstanceIsNull);
        }
        script.invoke(&function, None, args)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.find_function(name).is_some()
    }

    pub fn get_method_info(&self, name: &str) -> Option<MethodInfo> {
        self.find_function(name).map(|(_, function)| function.method_info())
    }

    /// Script functions of the chain, most derived definitions, by name.
    /// Generated accessors and initializers are left out.
    pub fn get_script_method_list(&self) -> Vec<MethodInfo> {
        let mut methods: FxHashMap<String, MethodInfo> = FxHashMap::default();
        for script in self.chain() {
            let Some(class) = script.class() else {
                continue;
            };
            for (name, function) in &class.functions {
                if !name.starts_with('@') {
                    methods.entry(name.clone()).or_insert_with(|| function.method_info());
                }
            }
        }
        let mut list: Vec<MethodInfo> = methods.into_values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    // ========================================================================
    // Members, signals and constants
    // ========================================================================

    /// Instance variables of the chain, base first, in slot order.
    pub fn get_script_property_list(&self) -> Vec<PropertyInfo> {
        self.chain()
            .iter()
            .rev()
            .filter_map(|script| script.class())
            .flat_map(|class| {
                class
                    .members_in_order()
                    .into_iter()
                    .map(|slot| slot.property_info())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn get_script_signal_list(&self) -> Vec<MethodInfo> {
        let mut signals: Vec<MethodInfo> = self
            .chain()
            .iter()
            .filter_map(|script| script.class())
            .flat_map(|class| class.signals.values().cloned().collect::<Vec<_>>())
            .collect();
        signals.sort_by(|a, b| a.name.cmp(&b.name));
        signals
    }

    pub fn has_script_signal(&self, name: &str) -> bool {
        self.chain()
            .iter()
            .any(|script| script.class().is_some_and(|class| class.signals.contains_key(name)))
    }

    /// Constants and nested classes declared by this class.
    pub fn get_constants(&self) -> FxHashMap<String, Variant> {
        let Some(class) = self.class() else {
            return FxHashMap::default();
        };
        let mut constants = class.constants.clone();
        let inner = self.state.read().inner.clone();
        for (name, script) in inner {
            constants.insert(name, script.class_value());
        }
        constants
    }

    /// Names of the instance variables declared by this class.
    pub fn get_members(&self) -> Vec<String> {
        self.class()
            .map(|class| class.members_in_order().into_iter().map(|slot| slot.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get_member_line(&self, name: &str) -> Option<u32> {
        self.class().and_then(|class| class.member_lines.get(name).copied())
    }

    // ========================================================================
    // Static access
    // ========================================================================

    /// Static variables, then constants and nested classes, then static
    /// functions, each searched through the chain.
    pub fn get(&self, name: &str) -> Option<Variant> {
        if let Some(value) = self.lookup_static(name) {
            return Some(value);
        }
        let (script, function) = self.find_function(name)?;
        function
            .is_static
            .then(|| Variant::Callable(Callable::Custom(Arc::new(StaticCallable::new(&script, name)))))
    }

    /// Static variables, constants and nested classes of the chain.
    pub(crate) fn lookup_static(&self, name: &str) -> Option<Variant> {
        let chain = self.chain();
        for script in &chain {
            let Some(class) = script.class() else {
                continue;
            };
            if let Some(slot) = class.static_variables.get(name) {
                return script.statics.read().get(slot.index as usize).cloned();
            }
        }
        for script in &chain {
            let Some(class) = script.class() else {
                continue;
            };
            if let Some(value) = class.constants.get(name) {
                return Some(value.clone());
            }
            let inner = script.state.read().inner.get(name).cloned();
            if let Some(inner) = inner {
                return Some(inner.class_value());
            }
        }
        None
    }

    /// Whether `name` is a constant or nested class of the chain.
    pub(crate) fn has_constant(&self, name: &str) -> bool {
        self.chain().iter().any(|script| {
            script.class().is_some_and(|class| class.constants.contains_key(name))
                || script.state.read().inner.contains_key(name)
        })
    }

    /// Assign a static variable of the chain. `None` when no static
    /// variable has this name, `Some(false)` when the value does not fit.
    pub fn set_static(&self, name: &str, value: Variant) -> Option<bool> {
        for script in self.chain() {
            let Some(class) = script.class() else {
                continue;
            };
            if let Some(slot) = class.static_variables.get(name) {
                return Some(script.set_static_value(slot.index, value));
            }
        }
        None
    }

    /// Static slot `slot` of this class.
    pub fn static_value(&self, slot: u32) -> Option<Variant> {
        self.statics.read().get(slot as usize).cloned()
    }

    pub fn set_static_value(&self, slot: u32, value: Variant) -> bool {
        let Some(class) = self.class() else {
            return false;
        };
        let Some(member) = class.static_variables.values().find(|member| member.index == slot) else {
            return false;
        };
        let Some(value) = conform(value, &member.data_type, self.context.registry()) else {
            return false;
        };
        match self.statics.write().get_mut(slot as usize) {
            Some(stored) => {
                *stored = value;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Values handed to the executor
    // ========================================================================

    /// The class as a value: an object answering static access and `new`.
    pub fn class_value(&self) -> Variant {
        let object = self.class_object.get_or_init(|| {
            ObjectRef::new(Arc::new(ClassObject {
                id: ObjectId::next(),
                script: self.this.clone(),
            }))
        });
        Variant::Object(object.clone())
    }

    /// The loaded script of a class referenced by compiled code.
    pub fn resolve_class(&self, key: &ClassKey) -> Option<Arc<Script>> {
        let file = if *key.path == self.path() {
            self.head()?
        } else {
            let cache = self.cache.upgrade()?;
            cache.get_full_script(&key.path, false).ok()?
        };
        file.class_at(key.index)
            .filter(|script| script.fqcn() == *key.fqcn)
            .or_else(|| file.find_class(&key.fqcn))
    }

    /// A closure over lambda `index` of this class.
    pub fn create_lambda(
        self: &Arc<Self>,
        index: u32,
        captures: Vec<Variant>,
        instance: Option<&Arc<ScriptInstance>>,
    ) -> Option<Variant> {
        let table = self.state.read().lambdas.clone();
        table.get(index)?;
        let callable = LambdaCallable::new(table, index, self, captures, instance);
        Some(Variant::Callable(Callable::Custom(Arc::new(callable))))
    }

    pub fn lambda_table(&self) -> Arc<LambdaTable> {
        self.state.read().lambdas.clone()
    }
}

// ============================================================================
// Class objects
// ============================================================================

/// The object a class evaluates to: `Class.CONSTANT`, `Class.static_f()`
/// and `Class.new()`.
struct ClassObject {
    id: ObjectId,
    script: Weak<Script>,
}

impl HostObject for ClassObject {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn class_name(&self) -> &str {
        "Script"
    }

    fn get(&self, name: &str) -> Option<Variant> {
        self.script.upgrade()?.get(name)
    }

    fn set(&self, name: &str, value: Variant) -> bool {
        self.script
            .upgrade()
            .and_then(|script| script.set_static(name, value))
            .unwrap_or(false)
    }

    fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let script = self.script.upgrade().ok_or(CallError::InstanceIsNull)?;
        match method {
            "new" => script.new_object(args).map(Variant::Object),
            _ => script.call_static(method, args),
        }
    }

    fn has_method(&self, method: &str) -> bool {
        method == "new" || self.script.upgrade().is_some_and(|script| script.has_method(method))
    }

    fn script_instance(&self) -> Option<AttachedInstance> {
        None
    }

    fn set_script_instance(&self, _instance: Option<AttachedInstance>) {}
}
