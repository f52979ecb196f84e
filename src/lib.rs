//! BRScript
//!
//! Loading, compiling and running BRScript classes inside a host object
//! system.
//!
//! ## Architecture
//!
//! ```text
//! ScriptLanguage
//!   └── ScriptCache ── ScriptUnit (parse + analysis) ── Compiler
//!         └── Script (runtime class) ── ScriptInstance (per host object)
//!                                    └── FunctionExecutor (host VM)
//! ```
//!
//! The cache drives units up the status ladder and installs compiled files
//! into [`Script`]s. Instances attach to host objects and answer get, set,
//! call and notification requests by walking the script chain.
//!
//! ## Modules
//!
//! - [`context`]: the collaborators supplied by the host
//! - [`cache`]: the dependency-aware script cache
//! - [`script`]: runtime classes and hot reload
//! - [`instance`]: per-object state and member dispatch
//! - [`callable`]: lambdas, bound methods and the lambda indirection table
//! - [`executor`]: the seam to the virtual machine
//! - [`value`]: fitting values to declared types
//! - [`global_class`]: header lookup without analysis
//! - [`language`]: loading and batch reloads
//! - [`logging`]: `tracing-subscriber` setup

pub mod cache;
pub mod callable;
pub mod context;
pub mod executor;
pub mod global_class;
pub mod instance;
pub mod language;
pub mod logging;
pub mod script;
pub mod value;

pub use cache::{ScriptCache, ScriptSource};
pub use callable::{LambdaCallable, LambdaTable, MethodCallable, StaticCallable};
pub use context::ScriptContext;
pub use executor::{FunctionCall, FunctionExecutor, NullExecutor};
pub use global_class::{GlobalClassInfo, get_global_class_name};
pub use instance::{InstanceState, ScriptInstance};
pub use language::{ReloadReport, ScriptLanguage};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use script::Script;
pub use value::{conform, slot_default};
