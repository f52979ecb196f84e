//! Collaborators shared by the cache and the runtime.
//!
//! A [`ScriptContext`] bundles the host registry, the settings, the file
//! loader, the external parser and the executor. It is built once by the
//! host and shared behind an `Arc`; nothing in the crate reads these from
//! global state.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use brscript::{ScriptContext, ScriptLanguage};
//! use brscript_registry::ClassDb;
//!
//! let context = ScriptContext::new(Arc::new(ClassDb::with_core_classes()), loader, parser)
//!     .with_executor(Arc::new(my_vm));
//! let language = ScriptLanguage::new(Arc::new(context));
//! let script = language.load("res://player.br")?;
//! ```

use std::fmt;
use std::sync::Arc;

use brscript_core::ScriptSettings;
use brscript_parser::{ScriptParser, SourceLoader};
use brscript_registry::SharedClassDb;

use crate::executor::{FunctionExecutor, NullExecutor};

/// Everything the pipeline and the runtime consume from the host.
pub struct ScriptContext {
    registry: SharedClassDb,
    settings: ScriptSettings,
    loader: Arc<dyn SourceLoader>,
    parser: Arc<dyn ScriptParser>,
    executor: Arc<dyn FunctionExecutor>,
}

impl ScriptContext {
    /// A context with default settings and no executor.
    pub fn new(registry: SharedClassDb, loader: Arc<dyn SourceLoader>, parser: Arc<dyn ScriptParser>) -> Self {
        Self {
            registry,
            settings: ScriptSettings::default(),
            loader,
            parser,
            executor: Arc::new(NullExecutor),
        }
    }

    pub fn with_settings(mut self, settings: ScriptSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn FunctionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn registry(&self) -> &SharedClassDb {
        &self.registry
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    pub fn loader(&self) -> &dyn SourceLoader {
        self.loader.as_ref()
    }

    pub fn parser(&self) -> &dyn ScriptParser {
        self.parser.as_ref()
    }

    pub fn executor(&self) -> &dyn FunctionExecutor {
        self.executor.as_ref()
    }
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
