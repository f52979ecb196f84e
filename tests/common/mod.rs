//! Shared fixtures for the integration tests.
//!
//! Scripts are built with [`TreeBuilder`] rather than parsed from text. A
//! file's source is a marker line; [`TreeParser`] maps the marker back to
//! the builder function registered for it, so rewriting a file with a new
//! builder changes its source hash the way editing it would.
//!
//! [`Interpreter`] runs the compiler's bytecode for the instructions the
//! tests produce and records every function it is handed.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use brscript::{FunctionCall, FunctionExecutor, Script, ScriptContext, ScriptInstance, ScriptLanguage, conform};
use brscript_compiler::{Address, CompiledScript, Compiler, Constant, Instruction, OpCode, ScriptUnit, UnitStatus};
use brscript_core::{
    Array, CacheError, CallError, Diagnostic, Dictionary, ObjectRef, Operator, ScriptError, ScriptSettings, Span,
    Variant,
};
use brscript_parser::build::TreeBuilder;
use brscript_parser::{LoadError, ParseOutput, ScriptParser, SourceLoader};
use brscript_registry::{ClassDb, ClassRegistry, SharedClassDb};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

pub type Program = Arc<dyn Fn(&TreeBuilder) + Send + Sync>;

// =============================================================================
// Loader and parser
// =============================================================================

/// Script files held in memory.
#[derive(Default)]
pub struct MemoryLoader {
    files: RwLock<FxHashMap<String, String>>,
}

impl MemoryLoader {
    pub fn write(&self, path: &str, source: impl Into<String>) {
        self.files.write().insert(path.to_string(), source.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.write().remove(path);
    }
}

impl SourceLoader for MemoryLoader {
    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    fn read_source(&self, path: &str) -> Result<String, LoadError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_string()))
    }

    fn read_binary(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        self.read_source(path).map(String::into_bytes)
    }
}

/// Builds trees from the programs registered for each source text.
#[derive(Default)]
pub struct TreeParser {
    programs: RwLock<FxHashMap<String, Program>>,
    parses: AtomicUsize,
}

impl TreeParser {
    pub fn register(&self, source: &str, program: Program) {
        self.programs.write().insert(source.to_string(), program);
    }

    /// Number of `parse` calls so far.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }
}

impl ScriptParser for TreeParser {
    fn parse(&self, path: &str, source: &str) -> ParseOutput {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let program = self.programs.read().get(source).cloned();
        match program {
            Some(program) => {
                let builder = TreeBuilder::new(path);
                program(&builder);
                ParseOutput::ok(builder.finish())
            }
            None => ParseOutput::failed(vec![Diagnostic::syntax(
                format!("unexpected source in {path}"),
                Span::default(),
            )]),
        }
    }
}

// =============================================================================
// Project
// =============================================================================

/// A language instance over in-memory files.
pub struct Project {
    pub loader: Arc<MemoryLoader>,
    pub parser: Arc<TreeParser>,
    pub registry: SharedClassDb,
    pub executor: Arc<Interpreter>,
    pub language: ScriptLanguage,
    revision: AtomicUsize,
}

impl Project {
    pub fn new() -> Self {
        Self::with_settings(ScriptSettings::default())
    }

    pub fn with_settings(settings: ScriptSettings) -> Self {
        Self::with_registry(ClassDb::with_core_classes(), settings)
    }

    pub fn with_registry(registry: ClassDb, settings: ScriptSettings) -> Self {
        let loader = Arc::new(MemoryLoader::default());
        let parser = Arc::new(TreeParser::default());
        let registry: SharedClassDb = Arc::new(registry);
        let executor = Arc::new(Interpreter::default());
        let context = ScriptContext::new(registry.clone(), loader.clone(), parser.clone())
            .with_settings(settings)
            .with_executor(executor.clone());
        Self {
            loader,
            parser,
            registry,
            executor,
            language: ScriptLanguage::new(Arc::new(context)),
            revision: AtomicUsize::new(0),
        }
    }

    /// Write `path` with a new revision built by `program`.
    pub fn file(&self, path: &str, program: impl Fn(&TreeBuilder) + Send + Sync + 'static) {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst);
        let source = format!("# {path} r{revision}");
        self.parser.register(&source, Arc::new(program));
        self.loader.write(path, source);
    }

    /// Write `path` with source text no program is registered for.
    pub fn broken_file(&self, path: &str) {
        self.loader.write(path, format!("# {path} does not parse"));
    }

    pub fn load(&self, path: &str) -> Arc<Script> {
        self.language
            .load(path)
            .unwrap_or_else(|err| panic!("failed to load {path}: {err}"))
    }

    pub fn try_load(&self, path: &str) -> Result<Arc<Script>, ScriptError> {
        self.language.load(path)
    }

    pub fn unit(&self, path: &str) -> Result<Arc<ScriptUnit>, CacheError> {
        self.language.cache().get_unit(path, UnitStatus::FullySolved)
    }

    /// Analyze `path`, panicking with its diagnostics on failure.
    pub fn solved(&self, path: &str) -> Arc<ScriptUnit> {
        self.unit(path)
            .unwrap_or_else(|err| panic!("analysis of {path} failed: {err}\n{:#?}", err.diagnostics()))
    }

    pub fn compile(&self, path: &str) -> CompiledScript {
        let unit = self.solved(path);
        Compiler::compile(&unit, self.language.cache().as_ref())
            .unwrap_or_else(|err| panic!("compilation of {path} failed: {err}"))
    }

    pub fn instantiate(&self, class: &str) -> ObjectRef {
        self.registry
            .instantiate(class)
            .unwrap_or_else(|| panic!("cannot instantiate {class}"))
    }

    pub fn node(&self) -> ObjectRef {
        self.instantiate("Node")
    }

    /// Attach an instance of `script` to a new node.
    pub fn spawn(&self, script: &Arc<Script>, args: &[Variant]) -> (ObjectRef, Arc<ScriptInstance>) {
        let node = self.node();
        let instance = script
            .instance_create(&node, args)
            .unwrap_or_else(|err| panic!("construction failed: {err}"));
        (node, instance)
    }
}

/// Errors of a failed analysis, for assertions.
pub fn analysis_errors(result: Result<Arc<ScriptUnit>, CacheError>) -> Vec<Diagnostic> {
    match result {
        Ok(unit) => panic!("expected {} to fail analysis", unit.path()),
        Err(CacheError::AnalysisFailed { diagnostics, .. }) => diagnostics,
        Err(other) => panic!("expected an analysis failure, got {other}"),
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Executes compiled functions and logs `script:function` for each one.
#[derive(Default)]
pub struct Interpreter {
    calls: Mutex<Vec<String>>,
    depth: AtomicUsize,
    hook: Mutex<Option<CallHook>>,
}

/// Called with the name of every function before it runs.
pub type CallHook = Arc<dyn Fn(&str) + Send + Sync>;

impl Interpreter {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Logged calls of `function`, in order.
    pub fn calls_of(&self, function: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|entry| entry.ends_with(&format!(":{function}")))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn set_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }
}

impl FunctionExecutor for Interpreter {
    fn execute(&self, call: FunctionCall<'_>) -> Result<Variant, CallError> {
        self.calls
            .lock()
            .push(format!("{}:{}", call.script.name(), call.function.name));
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&call.function.name);
        }
        if self.depth.fetch_add(1, Ordering::SeqCst) >= call.max_call_depth {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(CallError::Execution {
                method: call.function.name.clone(),
                message: "stack overflow".to_string(),
            });
        }
        let result = Frame::new(&call).run();
        self.depth.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct Frame<'c, 'a> {
    call: &'c FunctionCall<'a>,
    stack: Vec<Variant>,
}

impl<'c, 'a> Frame<'c, 'a> {
    fn new(call: &'c FunctionCall<'a>) -> Self {
        let size = (call.function.stack_size as usize).max(call.arguments.len());
        let mut stack = vec![Variant::Nil; size];
        stack[..call.arguments.len()].clone_from_slice(call.arguments);
        Self { call, stack }
    }

    fn fail(&self, message: impl Into<String>) -> CallError {
        CallError::Execution {
            method: self.call.function.name.clone(),
            message: message.into(),
        }
    }

    fn run(&mut self) -> Result<Variant, CallError> {
        let function = self.call.function;
        let chunk = &function.chunk;
        let mut pc = self.call.entry_offset();
        loop {
            let instruction = chunk
                .instruction_at(pc)
                .ok_or_else(|| self.fail(format!("no instruction at {pc}")))?;
            let next = instruction.next_offset();
            match self.step(&instruction)? {
                Flow::Next => pc = next,
                Flow::Jump(target) => pc = target,
                Flow::Return(value) => return Ok(value),
            }
        }
    }

    fn step(&mut self, i: &Instruction) -> Result<Flow, CallError> {
        match i.op {
            OpCode::Assign => {
                let value = self.read(i, 1)?;
                self.write(i, 0, value)?;
            }
            OpCode::AssignTyped => {
                let value = self.read(i, 1)?;
                let ty = self.type_constant(i, 2)?;
                let registry = self.call.script.context().registry();
                let value = conform(value, &ty, registry)
                    .ok_or_else(|| self.fail(format!("value does not fit \"{ty}\"")))?;
                self.write(i, 0, value)?;
            }
            OpCode::Operator => {
                let a = self.read(i, 1)?;
                let b = self.read(i, 2)?;
                let op = i
                    .word(3)
                    .and_then(Operator::from_index)
                    .ok_or_else(|| self.fail("bad operator"))?;
                let value = op
                    .evaluate(&a, &b)
                    .ok_or_else(|| self.fail(format!("invalid operands for {op:?}")))?;
                self.write(i, 0, value)?;
            }
            OpCode::Jump => return Ok(Flow::Jump(self.target(i, 0)?)),
            OpCode::JumpIf | OpCode::JumpIfNot => {
                let condition = self.read(i, 0)?.booleanize();
                if condition == (i.op == OpCode::JumpIf) {
                    return Ok(Flow::Jump(self.target(i, 1)?));
                }
            }
            OpCode::Return => return Ok(Flow::Return(self.read(i, 0)?)),
            OpCode::Assert => {
                if !self.read(i, 0)?.booleanize() {
                    return Err(self.fail("assertion failed"));
                }
            }
            OpCode::ConstructArray => {
                let elements = self.read_all(i.trailing())?;
                self.write(i, 0, Variant::Array(Array::from_vec(elements)))?;
            }
            OpCode::ConstructDictionary => {
                let values = self.read_all(i.trailing())?;
                let entries = values
                    .chunks(2)
                    .filter_map(|pair| Some((pair.first()?.clone(), pair.get(1)?.clone())))
                    .collect();
                self.write(i, 0, Variant::Dictionary(Dictionary::from_entries(entries)))?;
            }
            OpCode::GetNamed => {
                let base = self.read(i, 1)?;
                let name = self.name_constant(i, 2)?;
                let value = get_named(&base, &name).unwrap_or_default();
                self.write(i, 0, value)?;
            }
            OpCode::SetNamed => {
                let base = self.read(i, 0)?;
                let name = self.name_constant(i, 1)?;
                let value = self.read(i, 2)?;
                if !set_named(&base, &name, value) {
                    return Err(self.fail(format!("cannot set \"{name}\"")));
                }
            }
            OpCode::GetKeyed => {
                let base = self.read(i, 1)?;
                let key = self.read(i, 2)?;
                let value = match (&base, &key) {
                    (Variant::Array(array), Variant::Int(index)) => {
                        usize::try_from(*index).ok().and_then(|index| array.get(index))
                    }
                    (Variant::Dictionary(dictionary), key) => dictionary.get(key),
                    _ => None,
                }
                .ok_or_else(|| self.fail(format!("invalid key {key}")))?;
                self.write(i, 0, value)?;
            }
            OpCode::SetKeyed => {
                let base = self.read(i, 0)?;
                let key = self.read(i, 1)?;
                let value = self.read(i, 2)?;
                let stored = match (&base, &key) {
                    (Variant::Array(array), Variant::Int(index)) => {
                        usize::try_from(*index).is_ok_and(|index| array.set(index, value))
                    }
                    (Variant::Dictionary(dictionary), _) => dictionary.insert(key.clone(), value),
                    _ => false,
                };
                if !stored {
                    return Err(self.fail(format!("cannot set key {key}")));
                }
            }
            OpCode::JumpIfShared => {
                if self.read(i, 0)?.is_shared() {
                    return Ok(Flow::Jump(self.target(i, 1)?));
                }
            }
            OpCode::Construct => {
                let ty = self.type_constant(i, 1)?;
                let args = self.read_all(i.trailing())?;
                let value = match (args.as_slice(), ty.builtin_type()) {
                    ([], _) => ty.default_value(),
                    ([arg], Some(builtin)) => arg
                        .convert(builtin)
                        .ok_or_else(|| self.fail(format!("cannot construct \"{ty}\"")))?,
                    _ => return Err(self.fail(format!("unsupported constructor of \"{ty}\""))),
                };
                self.write(i, 0, value)?;
            }
            OpCode::GetStatic => {
                let script = self.class_constant(i, 1)?;
                let slot = i.word(2).ok_or_else(|| self.fail("missing slot"))?;
                let value = script.static_value(slot).unwrap_or_default();
                self.write(i, 0, value)?;
            }
            OpCode::SetStatic => {
                let script = self.class_constant(i, 0)?;
                let slot = i.word(1).ok_or_else(|| self.fail("missing slot"))?;
                let value = self.read(i, 2)?;
                if !script.set_static_value(slot, value) {
                    return Err(self.fail("static value does not fit"));
                }
            }
            OpCode::GetGlobal => {
                let name = self.name_constant(i, 1)?;
                let registry = self.call.script.context().registry();
                let value = registry.global_constant(&name).unwrap_or_default();
                self.write(i, 0, value)?;
            }
            OpCode::Call => {
                let base = self.read(i, 1)?;
                let name = self.name_constant(i, 2)?;
                let args = self.read_all(i.trailing())?;
                let value = call_named(&base, &name, &args)?;
                self.write(i, 0, value)?;
            }
            OpCode::CallSelf => {
                let name = self.name_constant(i, 1)?;
                let args = self.read_all(i.trailing())?;
                let value = match self.call.instance {
                    Some(instance) => instance.call(&name, &args)?,
                    None => self.call.script.call_static(&name, &args)?,
                };
                self.write(i, 0, value)?;
            }
            OpCode::CallSelfBase => {
                let name = self.name_constant(i, 1)?;
                let args = self.read_all(i.trailing())?;
                let (level, function) = self
                    .call
                    .script
                    .get_base_script()
                    .and_then(|base| base.find_function(&name))
                    .ok_or_else(|| self.fail(format!("no base implementation of \"{name}\"")))?;
                let value = level.invoke(&function, self.call.instance, &args)?;
                self.write(i, 0, value)?;
            }
            OpCode::CallStatic => {
                let script = self.class_constant(i, 1)?;
                let name = self.name_constant(i, 2)?;
                let args = self.read_all(i.trailing())?;
                let value = script.call_static(&name, &args)?;
                self.write(i, 0, value)?;
            }
            OpCode::CallBuiltin => {
                let base = self.read(i, 1)?;
                let name = self.name_constant(i, 2)?;
                let args = self.read_all(i.trailing())?;
                let value = self.call_builtin(&base, &name, &args)?;
                self.write(i, 0, value)?;
            }
            OpCode::CallUtility => {
                let name = self.name_constant(i, 1)?;
                let args = self.read_all(i.trailing())?;
                let value = self.call_utility(&name, &args)?;
                self.write(i, 0, value)?;
            }
            OpCode::CallCallable => {
                let callable = self.read(i, 1)?;
                let args = self.read_all(i.trailing())?;
                let Variant::Callable(callable) = callable else {
                    return Err(self.fail("value is not callable"));
                };
                let value = callable.call(&args)?;
                self.write(i, 0, value)?;
            }
            OpCode::New => {
                let class = self.read(i, 1)?;
                let args = self.read_all(i.trailing())?;
                let value = match class {
                    Variant::Object(class) => class.call("new", &args)?,
                    Variant::StringName(native) => {
                        let registry = self.call.script.context().registry();
                        registry
                            .instantiate(&native)
                            .map(Variant::Object)
                            .ok_or_else(|| self.fail(format!("cannot instantiate \"{native}\"")))?
                    }
                    _ => return Err(self.fail("not a class")),
                };
                self.write(i, 0, value)?;
            }
            OpCode::CreateLambda | OpCode::CreateSelfLambda => {
                let index = i.word(1).ok_or_else(|| self.fail("missing lambda index"))?;
                let captures = self.read_all(i.trailing())?;
                let instance = match i.op {
                    OpCode::CreateSelfLambda => self.call.instance,
                    _ => None,
                };
                let lambda = self
                    .call
                    .script
                    .create_lambda(index, captures, instance)
                    .ok_or_else(|| self.fail(format!("no lambda {index}")))?;
                self.write(i, 0, lambda)?;
            }
            other => return Err(self.fail(format!("unsupported opcode {}", other.name()))),
        }
        Ok(Flow::Next)
    }

    // -------------------------------------------------------------------------
    // Operands
    // -------------------------------------------------------------------------

    fn address(&self, i: &Instruction, index: usize) -> Result<Address, CallError> {
        i.address(index)
            .ok_or_else(|| self.fail(format!("bad address operand {index}")))
    }

    fn target(&self, i: &Instruction, index: usize) -> Result<usize, CallError> {
        i.word(index)
            .map(|word| word as usize)
            .ok_or_else(|| self.fail("missing jump target"))
    }

    fn read(&self, i: &Instruction, index: usize) -> Result<Variant, CallError> {
        let address = self.address(i, index)?;
        self.read_address(address)
    }

    fn read_all(&self, words: &[u32]) -> Result<Vec<Variant>, CallError> {
        words
            .iter()
            .map(|&word| {
                let address = Address::decode(word).ok_or_else(|| self.fail("bad address"))?;
                self.read_address(address)
            })
            .collect()
    }

    fn read_address(&self, address: Address) -> Result<Variant, CallError> {
        Ok(match address {
            Address::Stack(slot) => self.stack.get(slot as usize).cloned().unwrap_or_default(),
            Address::Constant(index) => match self.call.function.constants.get(index) {
                Some(Constant::Value(value)) => value.clone(),
                Some(Constant::Class(key)) => self
                    .call
                    .script
                    .resolve_class(key)
                    .ok_or_else(|| self.fail(format!("class {} is not loaded", key.fqcn)))?
                    .class_value(),
                Some(Constant::Name(name) | Constant::NativeClass(name)) => Variant::StringName(name.clone()),
                Some(Constant::Type(_)) | None => return Err(self.fail(format!("constant {index} is not a value"))),
            },
            Address::Member(slot) => self.instance()?.member(slot).unwrap_or_default(),
            Address::SelfRef => match self.call.instance {
                Some(instance) => Variant::Object(instance.get_owner().ok_or(CallError::InstanceIsNull)?),
                None => self.call.script.class_value(),
            },
            Address::Nil => Variant::Nil,
        })
    }

    fn write(&mut self, i: &Instruction, index: usize, value: Variant) -> Result<(), CallError> {
        match self.address(i, index)? {
            Address::Stack(slot) => {
                let slot = slot as usize;
                if slot >= self.stack.len() {
                    self.stack.resize(slot + 1, Variant::Nil);
                }
                self.stack[slot] = value;
            }
            Address::Member(slot) => {
                if !self.instance()?.set_member(slot, value) {
                    return Err(self.fail(format!("no member slot {slot}")));
                }
            }
            Address::Nil => {}
            Address::Constant(_) | Address::SelfRef => return Err(self.fail("write to a read-only address")),
        }
        Ok(())
    }

    fn instance(&self) -> Result<&'a Arc<ScriptInstance>, CallError> {
        self.call.instance.ok_or(CallError::InstanceIsNull)
    }

    fn name_constant(&self, i: &Instruction, index: usize) -> Result<String, CallError> {
        let word = i.word(index).ok_or_else(|| self.fail("missing name operand"))?;
        self.call
            .function
            .constants
            .get(word)
            .and_then(Constant::as_name)
            .map(str::to_string)
            .ok_or_else(|| self.fail(format!("constant {word} is not a name")))
    }

    fn type_constant(&self, i: &Instruction, index: usize) -> Result<brscript_core::DataType, CallError> {
        let word = i.word(index).ok_or_else(|| self.fail("missing type operand"))?;
        self.call
            .function
            .constants
            .get(word)
            .and_then(Constant::as_type)
            .cloned()
            .ok_or_else(|| self.fail(format!("constant {word} is not a type")))
    }

    fn class_constant(&self, i: &Instruction, index: usize) -> Result<Arc<Script>, CallError> {
        let word = i.word(index).ok_or_else(|| self.fail("missing class operand"))?;
        match self.call.function.constants.get(word) {
            Some(Constant::Class(key)) => self
                .call
                .script
                .resolve_class(key)
                .ok_or_else(|| self.fail(format!("class {} is not loaded", key.fqcn))),
            _ => Err(self.fail(format!("constant {word} is not a class"))),
        }
    }

    // -------------------------------------------------------------------------
    // Builtins
    // -------------------------------------------------------------------------

    fn call_builtin(&self, base: &Variant, name: &str, args: &[Variant]) -> Result<Variant, CallError> {
        match (base, name) {
            (Variant::Array(array), "size") => Ok(Variant::Int(array.len() as i64)),
            (Variant::Array(array), "append" | "push_back") => {
                for arg in args {
                    array.push(arg.clone());
                }
                Ok(Variant::Nil)
            }
            (Variant::Array(array), "has") => Ok(Variant::Bool(args.first().is_some_and(|arg| array.contains(arg)))),
            (Variant::String(text), "length") => Ok(Variant::Int(text.chars().count() as i64)),
            _ => Err(self.fail(format!("unsupported builtin method \"{name}\""))),
        }
    }

    fn call_utility(&self, name: &str, args: &[Variant]) -> Result<Variant, CallError> {
        match (name, args) {
            ("len", [Variant::Array(array)]) => Ok(Variant::Int(array.len() as i64)),
            ("len", [Variant::String(text)]) => Ok(Variant::Int(text.chars().count() as i64)),
            ("str", values) => Ok(Variant::String(values.iter().map(Variant::to_string).collect())),
            ("abs", [Variant::Int(value)]) => Ok(Variant::Int(value.abs())),
            ("print", _) => Ok(Variant::Nil),
            _ => Err(self.fail(format!("unsupported utility \"{name}\""))),
        }
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return(Variant),
}

fn get_named(base: &Variant, name: &str) -> Option<Variant> {
    match base {
        Variant::Object(object) => match ScriptInstance::of(object.object().as_ref()) {
            Some(instance) => instance.get(name),
            None => object.get(name),
        },
        Variant::Dictionary(dictionary) => dictionary.get(&Variant::String(name.to_string())),
        _ => None,
    }
}

fn set_named(base: &Variant, name: &str, value: Variant) -> bool {
    match base {
        Variant::Object(object) => match ScriptInstance::of(object.object().as_ref()) {
            Some(instance) => instance.set(name, value),
            None => object.set(name, value),
        },
        Variant::Dictionary(dictionary) => dictionary.insert(Variant::String(name.to_string()), value),
        _ => false,
    }
}

fn call_named(base: &Variant, name: &str, args: &[Variant]) -> Result<Variant, CallError> {
    match base {
        Variant::Object(object) => match ScriptInstance::of(object.object().as_ref()) {
            Some(instance) => instance.call(name, args),
            None => object.call(name, args),
        },
        Variant::Callable(callable) if name == "call" => callable.call(args),
        _ => Err(CallError::InvalidMethod {
            method: name.to_string(),
        }),
    }
}
