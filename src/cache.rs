//! The dependency-aware script cache.
//!
//! The cache maps a path to at most one [`ScriptUnit`] (parse and analysis
//! state) and at most one [`Script`] (the runtime class). Scripts move
//! through two maps: a *shallow* script has its class skeleton and can be
//! referenced by siblings, a *full* script has finished compiling along
//! with its dependencies.
//!
//! Two locks guard the cache:
//!
//! - a re-entrant analysis lock held only while a unit climbs the status
//!   ladder. A stage calls back into the cache for other files on the same
//!   thread, so the lock must be re-entrant. Reading sources, compiling,
//!   installing and running static initializers happen outside it.
//! - a plain mutex over the maps, never held across a call that can reach
//!   the parser, the analyzer, the compiler or a script.
//!
//! Two threads missing the same entry may both parse it; the first one
//! inserted wins and the other result is dropped.

use std::sync::{Arc, Weak};

use brscript_compiler::{CompiledScript, Compiler, ScriptUnit, UnitProvider, UnitStatus};
use brscript_core::{CacheError, ScriptError, ScriptSettings};
use brscript_parser::{LoadError, ScriptParser, SourceLoader};
use brscript_registry::ClassRegistry;
use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, trace, warn};

use crate::{Script, ScriptContext};

// ============================================================================
// Sources
// ============================================================================

/// The text or pre-tokenized bytes a script is compiled from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptSource {
    /// Not loaded yet; read from the loader on demand.
    #[default]
    Empty,
    Text(String),
    Binary(Vec<u8>),
}

impl ScriptSource {
    /// Read `path` through the loader, as bytes when it carries the binary
    /// extension.
    pub fn load(loader: &dyn SourceLoader, settings: &ScriptSettings, path: &str) -> Result<Self, CacheError> {
        let loaded = if settings.is_binary_path(path) {
            loader.read_binary(path).map(ScriptSource::Binary)
        } else {
            loader.read_source(path).map(ScriptSource::Text)
        };
        loaded.map_err(|err| match err {
            LoadError::NotFound(_) => CacheError::FileNotFound { path: path.to_string() },
            LoadError::Io { reason, .. } => CacheError::CantRead {
                path: path.to_string(),
                reason,
            },
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ScriptSource::Empty => &[],
            ScriptSource::Text(text) => text.as_bytes(),
            ScriptSource::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScriptSource::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ScriptSource::Empty)
    }

    /// The hash a unit parsed from this source records.
    pub fn hash(&self) -> u64 {
        ScriptUnit::hash_source(self.as_bytes())
    }

    fn parse_into(&self, unit: &ScriptUnit, parser: &dyn ScriptParser) -> Result<(), CacheError> {
        match self {
            ScriptSource::Binary(bytes) => unit.parse_binary(parser, bytes),
            ScriptSource::Text(text) => unit.parse_source(parser, text),
            ScriptSource::Empty => Err(CacheError::InvalidScript {
                path: unit.path().to_string(),
            }),
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Default)]
struct CacheMaps {
    units: FxHashMap<String, Arc<ScriptUnit>>,
    shallow: FxHashMap<String, Arc<Script>>,
    full: FxHashMap<String, Arc<Script>>,
    /// Scripts kept alive by FQCN.
    static_scripts: FxHashMap<String, Arc<Script>>,
    /// Paths each script referenced, loaded when it finishes compiling.
    dependencies: FxHashMap<String, FxHashSet<String>>,
    /// Scripts that referenced each path.
    inverse: FxHashMap<String, FxHashSet<String>>,
    /// Paths whose reload is running; requests for them return the
    /// script as it stands.
    compiling: FxHashSet<String>,
}

/// Single point of truth from script paths to units and scripts.
pub struct ScriptCache {
    this: Weak<ScriptCache>,
    context: Arc<ScriptContext>,
    analysis: ReentrantMutex<()>,
    maps: Mutex<CacheMaps>,
}

impl std::fmt::Debug for ScriptCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let maps = self.maps.lock();
        f.debug_struct("ScriptCache")
            .field("units", &maps.units.len())
            .field("shallow", &maps.shallow.len())
            .field("full", &maps.full.len())
            .finish()
    }
}

impl ScriptCache {
    pub fn new(context: Arc<ScriptContext>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            context,
            analysis: ReentrantMutex::new(()),
            maps: Mutex::new(CacheMaps::default()),
        })
    }

    pub fn context(&self) -> &Arc<ScriptContext> {
        &self.context
    }

    // ========================================================================
    // Units
    // ========================================================================

    /// The unit of `path`, parsed from the loader on first use and raised
    /// to at least `status`.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn get_unit(&self, path: &str, status: UnitStatus) -> Result<Arc<ScriptUnit>, CacheError> {
        let existing = self.maps.lock().units.get(path).cloned();
        let unit = match existing {
            Some(unit) => {
                trace!(path, "unit cache hit");
                unit
            }
            None => {
                let fresh = Arc::new(ScriptUnit::new(path));
                let parsed = ScriptSource::load(self.context.loader(), self.context.settings(), path)
                    .and_then(|source| source.parse_into(&fresh, self.context.parser()));
                let parsed = match parsed {
                    Err(err @ (CacheError::FileNotFound { .. } | CacheError::CantRead { .. })) => return Err(err),
                    parsed => parsed,
                };
                let (unit, inserted) = self.insert_unit(path, fresh);
                if inserted {
                    parsed?;
                }
                unit
            }
        };
        self.raise(&unit, status)?;
        Ok(unit)
    }

    /// Insert `unit` unless another thread got there first; returns the
    /// unit kept and whether it is `unit`.
    fn insert_unit(&self, path: &str, unit: Arc<ScriptUnit>) -> (Arc<ScriptUnit>, bool) {
        let mut maps = self.maps.lock();
        match maps.units.get(path) {
            Some(existing) => {
                trace!(path, "unit parsed concurrently, keeping the first");
                (existing.clone(), false)
            }
            None => {
                maps.units.insert(path.to_string(), unit.clone());
                (unit, true)
            }
        }
    }

    /// Climb the status ladder under the analysis lock.
    fn raise(&self, unit: &ScriptUnit, status: UnitStatus) -> Result<(), CacheError> {
        let _analysis = self.analysis.lock();
        unit.raise_status(status, self)
    }

    pub fn has_unit(&self, path: &str) -> bool {
        self.maps.lock().units.contains_key(path)
    }

    /// Drop the unit of `path` and, recursively, the units of every script
    /// that referenced it. Dropped units are abandoned, not destroyed: an
    /// analysis still holding one keeps it until it finishes.
    pub fn remove_unit(&self, path: &str) {
        let (unit, dependents) = {
            let mut maps = self.maps.lock();
            (maps.units.remove(path), maps.inverse.remove(path))
        };
        if let Some(unit) = unit {
            unit.abandon();
            debug!(path, "unit abandoned");
        }
        for dependent in dependents.into_iter().flatten() {
            if dependent != path {
                self.remove_unit(&dependent);
            }
        }
    }

    pub fn get_source_hash(&self, path: &str) -> Option<u64> {
        self.maps.lock().units.get(path).map(|unit| unit.source_hash())
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    /// The script of `path` with at least its class skeleton in place.
    ///
    /// `owner` records that the owning script references `path`, so that
    /// `path` is fully compiled once the owner finishes.
    pub fn get_shallow_script(&self, path: &str, owner: Option<&str>) -> Result<Arc<Script>, CacheError> {
        if let Some(owner) = owner {
            self.record_dependencies(owner, [path]);
        }
        {
            let maps = self.maps.lock();
            if let Some(script) = maps.full.get(path).or_else(|| maps.shallow.get(path)) {
                trace!(path, "script cache hit");
                return Ok(script.clone());
            }
        }

        let unit = self.get_unit(path, UnitStatus::Parsed)?;
        let tree = unit.tree().ok_or_else(|| CacheError::InvalidScript { path: path.to_string() })?;
        let source = ScriptSource::load(self.context.loader(), self.context.settings(), path)?;
        let script = Script::from_tree(&self.context, &self.this, &tree);
        script.set_source(source);
        let mut maps = self.maps.lock();
        if let Some(existing) = maps.full.get(path).or_else(|| maps.shallow.get(path)) {
            trace!(path, "script created concurrently, keeping the first");
            return Ok(existing.clone());
        }
        maps.shallow.insert(path.to_string(), script.clone());
        debug!(path, "shallow script created");
        Ok(script)
    }

    /// The fully compiled script of `path`.
    ///
    /// With `update_from_disk` the source is re-read; an unchanged, valid
    /// script is returned as is. A script whose reload is already running
    /// is returned as it stands, shallow or previous version.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_full_script(&self, path: &str, update_from_disk: bool) -> Result<Arc<Script>, ScriptError> {
        {
            let maps = self.maps.lock();
            if !update_from_disk {
                if let Some(script) = maps.full.get(path) {
                    trace!(path, "full script cache hit");
                    return Ok(script.clone());
                }
            }
            if maps.compiling.contains(path) {
                if let Some(script) = maps.full.get(path).or_else(|| maps.shallow.get(path)) {
                    return Ok(script.clone());
                }
            }
        }

        let script = self.get_shallow_script(path, None)?;
        if update_from_disk {
            let source = ScriptSource::load(self.context.loader(), self.context.settings(), path)?;
            if script.is_valid() && source.hash() == script.source_hash() {
                return Ok(script);
            }
            script.set_source(source);
        } else if script.is_valid() {
            self.finish_compiling(path);
            return Ok(script);
        }

        if !self.maps.lock().compiling.insert(path.to_string()) {
            return Ok(script);
        }
        let reloaded = script.reload(true);
        self.maps.lock().compiling.remove(path);
        reloaded?;

        self.finish_compiling(path);
        Ok(script)
    }

    /// A script already in the cache, full or shallow.
    pub fn get_cached_script(&self, path: &str) -> Option<Arc<Script>> {
        let maps = self.maps.lock();
        maps.full.get(path).or_else(|| maps.shallow.get(path)).cloned()
    }

    /// Promote `path` to the full map and compile the scripts it
    /// references. Failing dependencies are logged; they fail again when
    /// used.
    pub fn finish_compiling(&self, path: &str) {
        let dependencies = {
            let mut maps = self.maps.lock();
            if let Some(script) = maps.shallow.remove(path) {
                maps.full.insert(path.to_string(), script);
            }
            maps.dependencies.remove(path).unwrap_or_default()
        };
        for dependency in dependencies {
            if dependency == path {
                continue;
            }
            if let Err(err) = self.get_full_script(&dependency, false) {
                warn!(path, dependency = %dependency, error = %err, "dependency failed to compile");
            }
        }
    }

    /// Keep a valid script alive by its FQCN.
    pub fn add_static_script(&self, script: &Arc<Script>) -> Result<(), CacheError> {
        if !script.is_valid() {
            return Err(CacheError::InvalidScript { path: script.path() });
        }
        self.maps.lock().static_scripts.insert(script.fqcn(), script.clone());
        Ok(())
    }

    pub fn remove_static_script(&self, fqcn: &str) -> Option<Arc<Script>> {
        self.maps.lock().static_scripts.remove(fqcn)
    }

    /// Re-key a script under a new path. Nested classes are renamed with
    /// it and the old unit is abandoned.
    pub fn move_script(&self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let owners = self.maps.lock().inverse.get(from).cloned();
        self.remove_unit(from);

        let mut maps = self.maps.lock();
        if let Some(script) = maps.shallow.remove(from) {
            script.set_path(to);
            maps.shallow.insert(to.to_string(), script);
        }
        if let Some(script) = maps.full.remove(from) {
            script.set_path(to);
            maps.full.insert(to.to_string(), script);
        }
        if let Some(dependencies) = maps.dependencies.remove(from) {
            maps.dependencies.insert(to.to_string(), dependencies);
        }
        if let Some(owners) = owners {
            maps.inverse.insert(to.to_string(), owners);
        }
        let rename = |paths: &mut FxHashSet<String>| {
            if paths.remove(from) {
                paths.insert(to.to_string());
            }
        };
        maps.dependencies.values_mut().for_each(rename);
        maps.inverse.values_mut().for_each(rename);

        let moved: Vec<String> = maps
            .static_scripts
            .iter()
            .filter(|(fqcn, script)| script.fqcn() != **fqcn)
            .map(|(fqcn, _)| fqcn.clone())
            .collect();
        for fqcn in moved {
            if let Some(script) = maps.static_scripts.remove(&fqcn) {
                maps.static_scripts.insert(script.fqcn(), script);
            }
        }
        debug!(from, to, "script moved");
    }

    /// Forget `path`. Units of scripts that referenced it are dropped too.
    pub fn remove_script(&self, path: &str) {
        self.remove_unit(path);

        let mut maps = self.maps.lock();
        maps.shallow.remove(path);
        maps.full.remove(path);
        maps.dependencies.remove(path);
        maps.static_scripts.retain(|_, script| script.path() != path);
        debug!(path, "script removed");
    }

    pub fn clear(&self) {
        let mut maps = self.maps.lock();
        for unit in maps.units.values() {
            unit.abandon();
        }
        *maps = CacheMaps::default();
    }

    /// Every script in the cache.
    pub fn scripts(&self) -> Vec<Arc<Script>> {
        let maps = self.maps.lock();
        maps.full.values().chain(maps.shallow.values()).cloned().collect()
    }

    /// Scripts whose compilation referenced `path`.
    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.maps
            .lock()
            .inverse
            .get(path)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Analyze and compile `path` from `source`.
    ///
    /// A unit whose hash matches and that has not failed is reused;
    /// otherwise the old unit is dropped and the source parsed again.
    #[cfg_attr(feature = "profiling", profiling::function)]
    #[tracing::instrument(level = "debug", skip(self, source))]
    pub(crate) fn compile(&self, path: &str, source: &ScriptSource) -> Result<Arc<CompiledScript>, CacheError> {
        let loaded;
        let source = if source.is_empty() {
            loaded = ScriptSource::load(self.context.loader(), self.context.settings(), path)?;
            &loaded
        } else {
            source
        };

        let hash = source.hash();
        let existing = self.maps.lock().units.get(path).cloned();
        let unit = match existing {
            Some(unit) if unit.source_hash() == hash && !unit.is_failed() && unit.status() != UnitStatus::Empty => unit,
            _ => {
                self.remove_unit(path);
                let fresh = Arc::new(ScriptUnit::new(path));
                let parsed = source.parse_into(&fresh, self.context.parser());
                let (unit, inserted) = self.insert_unit(path, fresh);
                if inserted {
                    parsed?;
                }
                unit
            }
        };

        self.raise(&unit, UnitStatus::FullySolved)?;
        let compiled = Compiler::compile(&unit, self).map_err(|source| {
            error!(path, error = %source, "compilation failed");
            CacheError::CompilationFailed {
                path: path.to_string(),
                source,
            }
        })?;
        unit.release_dependencies();
        self.record_dependencies(path, compiled.dependencies.iter().map(String::as_str));
        Ok(Arc::new(compiled))
    }

    fn record_dependencies<'a>(&self, owner: &str, paths: impl IntoIterator<Item = &'a str>) {
        let mut maps = self.maps.lock();
        for path in paths {
            if path == owner {
                continue;
            }
            maps.dependencies
                .entry(owner.to_string())
                .or_default()
                .insert(path.to_string());
            maps.inverse
                .entry(path.to_string())
                .or_default()
                .insert(owner.to_string());
        }
    }
}

impl UnitProvider for ScriptCache {
    fn get_unit(&self, path: &str, status: UnitStatus) -> Result<Arc<ScriptUnit>, CacheError> {
        ScriptCache::get_unit(self, path, status)
    }

    fn registry(&self) -> &dyn ClassRegistry {
        self.context.registry()
    }

    fn settings(&self) -> &ScriptSettings {
        self.context.settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Files(FxHashMap<String, Vec<u8>>);

    impl SourceLoader for Files {
        fn exists(&self, path: &str) -> bool {
            self.0.contains_key(path)
        }

        fn read_source(&self, path: &str) -> Result<String, LoadError> {
            let bytes = self.read_binary(path)?;
            String::from_utf8(bytes).map_err(|err| LoadError::Io {
                path: path.to_string(),
                reason: err.to_string(),
            })
        }

        fn read_binary(&self, path: &str) -> Result<Vec<u8>, LoadError> {
            self.0.get(path).cloned().ok_or_else(|| LoadError::NotFound(path.to_string()))
        }
    }

    #[test]
    fn sources_load_by_extension() {
        let mut files = Files::default();
        files.0.insert("res://a.br".into(), b"text".to_vec());
        files.0.insert("res://a.brc".into(), vec![0, 1, 2]);
        let settings = ScriptSettings::default();

        let text = ScriptSource::load(&files, &settings, "res://a.br").unwrap();
        assert_eq!(text.as_text(), Some("text"));
        let binary = ScriptSource::load(&files, &settings, "res://a.brc").unwrap();
        assert_eq!(binary, ScriptSource::Binary(vec![0, 1, 2]));
        assert_ne!(text.hash(), binary.hash());
    }

    #[test]
    fn missing_sources_map_to_cache_errors() {
        let files = Files::default();
        let err = ScriptSource::load(&files, &ScriptSettings::default(), "res://gone.br").unwrap_err();
        assert!(matches!(err, CacheError::FileNotFound { path } if path == "res://gone.br"));
    }
}
