//! The language entry point: loading, global classes and reloads.

use std::sync::Arc;

use brscript_core::{ReloadError, ScriptError};
use brscript_registry::GlobalClass;
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::cache::{ScriptCache, ScriptSource};
use crate::global_class::{GlobalClassInfo, get_global_class_name};
use crate::script::SavedState;
use crate::{Script, ScriptContext};

/// Outcome of a batch reload.
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Paths reloaded, in the order they were reloaded.
    pub reloaded: Vec<String>,
    pub failed: Vec<(String, ScriptError)>,
}

impl ReloadReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns the cache built over a [`ScriptContext`].
#[derive(Debug)]
pub struct ScriptLanguage {
    context: Arc<ScriptContext>,
    cache: Arc<ScriptCache>,
}

impl ScriptLanguage {
    pub fn new(context: Arc<ScriptContext>) -> Self {
        let cache = ScriptCache::new(context.clone());
        Self { context, cache }
    }

    pub fn context(&self) -> &Arc<ScriptContext> {
        &self.context
    }

    pub fn cache(&self) -> &Arc<ScriptCache> {
        &self.cache
    }

    /// Load and fully compile the script at `path`.
    pub fn load(&self, path: &str) -> Result<Arc<Script>, ScriptError> {
        self.cache.get_full_script(path, false)
    }

    /// `class_name`, base type and icon of `path` without analysis.
    pub fn get_global_class_name(&self, path: &str) -> Option<GlobalClassInfo> {
        get_global_class_name(
            self.context.loader(),
            self.context.parser(),
            self.context.settings(),
            path,
        )
    }

    /// Register the `class_name` of `path` so other scripts can extend it
    /// by name. Returns the registered name.
    pub fn register_global_class(&self, path: &str) -> Option<String> {
        let info = self.get_global_class_name(path)?;
        let name = info.name?;
        self.context.registry().add_global_class(GlobalClass {
            name: name.clone(),
            path: path.to_string(),
            base: info.base_type.unwrap_or_else(|| self.context.settings().default_base_class.clone()),
            icon_path: info.icon_path,
        });
        debug!(path, name = %name, "global class registered");
        Some(name)
    }

    /// Reload every script in the cache, keeping state when the settings
    /// ask for it.
    pub fn reload_all_scripts(&self) -> ReloadReport {
        let mut paths: Vec<String> = self.cache.scripts().iter().map(|script| script.path()).collect();
        paths.sort();
        paths.dedup();
        let keep_state = self.context.settings().keep_state_on_reload();
        self.reload_scripts(&paths, keep_state)
    }

    /// Re-read `paths` and reload them with every script that depends on
    /// them, bases before the scripts extending them.
    pub fn reload_scripts<S: AsRef<str>>(&self, paths: &[S], keep_state: bool) -> ReloadReport {
        let mut affected: FxHashSet<String> = FxHashSet::default();
        let mut pending: Vec<String> = paths.iter().map(|path| path.as_ref().to_string()).collect();
        while let Some(path) = pending.pop() {
            if affected.insert(path.clone()) {
                pending.extend(self.cache.dependents(&path));
            }
        }
        for path in paths {
            self.cache.remove_unit(path.as_ref());
        }

        let mut scripts: Vec<(usize, String, Arc<Script>)> = affected
            .into_iter()
            .filter_map(|path| {
                let script = self.cache.get_cached_script(&path)?;
                Some((script.chain().len(), path, script))
            })
            .collect();
        scripts.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut report = ReloadReport::default();
        let mut batch: Vec<(String, Arc<Script>, SavedState)> = Vec::with_capacity(scripts.len());
        for (_, path, script) in scripts {
            let source = match ScriptSource::load(self.context.loader(), self.context.settings(), &path) {
                Ok(source) => source,
                Err(err) => {
                    warn!(path = %path, error = %err, "cannot re-read script");
                    report.failed.push((path, ReloadError::from(err).into()));
                    continue;
                }
            };
            match script.save_state(keep_state) {
                Ok(saved) => {
                    script.set_source(source);
                    batch.push((path, script, saved));
                }
                Err(err) => report.failed.push((path, err.into())),
            }
        }

        // Every file is saved before the first install: a base installed
        // early changes the slots of instances of scripts extending it.
        let mut restore = Vec::with_capacity(batch.len());
        for (path, script, saved) in batch {
            match script.recompile() {
                Ok(()) => report.reloaded.push(path),
                Err(err) => report.failed.push((path, err.into())),
            }
            restore.push((script, saved));
        }
        for (script, saved) in restore {
            script.restore_state(saved);
        }
        info!(
            reloaded = report.reloaded.len(),
            failed = report.failed.len(),
            "scripts reloaded"
        );
        report
    }
}
