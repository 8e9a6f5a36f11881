//! Compiled-in plugin registry. Extension modules register themselves here
//! (instead of being discovered by a run-time binary loader) and must export
//! a `load` entry point; the manager resolves and invokes it exactly once
//! when the plugin is added to a pipeline. A module that does not export
//! `load` is a fatal configuration error.

use std::sync::RwLock;

use hashbrown::HashMap;
use once_cell::sync::Lazy;

use crate::{
    ir::Program,
    options::CompilerOptions,
    pass_manager::{manager::PassManager, Pass, PassBehavior},
};

pub const LOAD_ENTRY_POINT: &str = "load";

/// Signature of the `load` entry point: the module receives the manager and
/// a pre-built pass named after the module, fills the pass in, and registers
/// it wherever it belongs.
pub type PluginLoad = fn(&mut PassManager, PluginPass);

pub type PluginRun = fn(&mut Program, &CompilerOptions);

#[derive(Debug, Default, Clone, Copy)]
pub struct PluginCallbacks {
    pub run: Option<PluginRun>,
    pub post_process: Option<fn()>,
}

pub struct PluginModule {
    pub name: String,
    pub version: String,
    entry_points: HashMap<&'static str, PluginLoad>,
}

impl PluginModule {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            entry_points: HashMap::new(),
        }
    }

    pub fn with_load(mut self, load: PluginLoad) -> Self {
        self.entry_points.insert(LOAD_ENTRY_POINT, load);
        self
    }
}

static REGISTRY: Lazy<RwLock<HashMap<String, PluginModule>>> =
    Lazy::new(Default::default);

/// Makes a module available to `PassManager::add_plugin`. Registering twice
/// under the same name replaces the earlier module.
pub fn register_module(module: PluginModule) {
    let mut registry = REGISTRY.write().unwrap();
    registry.insert(module.name.clone(), module);
}

/// Resolves an entry point in a registered module. The error value is the
/// registry's diagnostic text, ready to be attached to the fatal report.
pub fn resolve(module_name: &str, symbol: &str) -> Result<PluginLoad, String> {
    let registry = REGISTRY.read().unwrap();
    let Some(module) = registry.get(module_name) else {
        return Err(format!("module '{module_name}' is not registered"));
    };
    match module.entry_points.get(symbol) {
        Some(entry_point) => Ok(*entry_point),
        None => Err(format!(
            "module '{}' (version {}) does not export symbol '{symbol}'",
            module.name, module.version
        )),
    }
}

/// The pass handed to a module's `load` entry point. Post-load it obeys the
/// same contract as every other pass.
pub struct PluginPass {
    pass: Pass,
    callbacks: PluginCallbacks,
}

impl PluginPass {
    pub(crate) fn new(module_name: &str) -> Self {
        Self {
            pass: Pass::new(
                module_name,
                "",
                PassBehavior::Plugin(PluginCallbacks::default()),
            ),
            callbacks: PluginCallbacks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.pass.name
    }

    pub fn set_description(&mut self, description: &str) {
        self.pass.description = Some(description.to_owned());
    }

    pub fn set_run(&mut self, run: PluginRun) {
        self.callbacks.run = Some(run);
    }

    pub fn set_post_process(&mut self, post_process: fn()) {
        self.callbacks.post_process = Some(post_process);
    }

    pub fn into_pass(mut self) -> Pass {
        self.pass.behavior = PassBehavior::Plugin(self.callbacks);
        self.pass
    }
}
