//! In-memory module sources and the searcher that serves them to `require`.
//!
//! The registry only stores text. Compilation happens inside the engine, on
//! the first `require` of a name; afterwards `package.loaded` answers and the
//! searcher is not consulted again for that name in that engine state.

use crate::error::{Error, Result};
use mlua::{Function, Lua, Table, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Named-registry key marking an engine state whose searcher chain already
/// contains ours.
const SEARCHER_INSTALLED_KEY: &str = "hostlua.searcher";

/// Searcher chain slot: right after `package.preload`, ahead of the
/// filesystem searchers.
const SEARCHER_POSITION: i64 = 2;

/// A registered module source.
#[derive(Debug)]
pub struct VirtualModule {
    name: String,
    source: Arc<str>,
    loads: AtomicU64,
}

impl VirtualModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// How many times this source has been compiled, across all engine
    /// states sharing the registry. Failed compiles count too.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Acquire)
    }

    fn compile<'lua>(&self, lua: &'lua Lua) -> mlua::Result<Function<'lua>> {
        self.loads.fetch_add(1, Ordering::AcqRel);
        lua.load(&*self.source)
            .set_name(format!("={}", self.name))
            .set_mode(mlua::ChunkMode::Text)
            .into_function()
            .map_err(|err| {
                tracing::warn!(module = %self.name, error = %err, "virtual module failed to compile");
                mlua::Error::external(Error::Compile {
                    module: self.name.clone(),
                    message: syntax_message(&err),
                })
            })
    }
}

/// Text the searcher contributes to `require`'s "not found" message.
pub(crate) fn not_found_marker(name: &str) -> String {
    format!("no virtual module '{name}'")
}

fn syntax_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Name -> source table behind the `require` searcher.
#[derive(Debug, Default)]
pub struct VirtualModuleRegistry {
    modules: RwLock<HashMap<String, Arc<VirtualModule>>>,
    sealed: AtomicBool,
}

impl VirtualModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `source` under `name`.
    ///
    /// Returns `false` without touching the table when the name is taken or
    /// the registry is sealed. The text is not validated here; syntax errors
    /// surface at the first `require`.
    pub fn register_source(&self, name: &str, source: &str) -> bool {
        let mut modules = self.modules.write();
        if self.is_sealed() {
            tracing::warn!(module = name, "rejected registration on sealed module registry");
            return false;
        }
        if modules.contains_key(name) {
            tracing::warn!(module = name, "a module with this name already exists");
            return false;
        }

        modules.insert(
            name.to_string(),
            Arc::new(VirtualModule {
                name: name.to_string(),
                source: Arc::from(source),
                loads: AtomicU64::new(0),
            }),
        );
        tracing::debug!(module = name, bytes = source.len(), "registered virtual module");
        true
    }

    /// Read `path` once and register its contents under `name`.
    pub fn register_file(&self, name: &str, path: &Path) -> Result<bool> {
        let source = std::fs::read_to_string(path)?;
        Ok(self.register_source(name, &source))
    }

    pub fn get(&self, name: &str) -> Option<Arc<VirtualModule>> {
        self.modules.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting registrations. The searcher keeps serving.
    pub fn seal(&self) {
        let modules = self.modules.write();
        if !self.sealed.swap(true, Ordering::AcqRel) {
            tracing::debug!(modules = modules.len(), "sealed module registry");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Add this registry's searcher to `lua`'s `require` chain.
    ///
    /// Returns `false` if this engine state already has a hostlua searcher.
    pub fn install(self: &Arc<Self>, lua: &Lua) -> Result<bool> {
        let installed: bool = lua.named_registry_value(SEARCHER_INSTALLED_KEY)?;
        if installed {
            return Ok(false);
        }

        let package: Table = lua.globals().get("package")?;
        // LuaJIT and 5.1 call the chain `loaders`, 5.2+ call it `searchers`.
        let chain: Table = match package.get::<_, Option<Table>>("searchers")? {
            Some(searchers) => searchers,
            None => package.get("loaders")?,
        };

        let searcher = self.searcher(lua)?;
        let table_lib: Table = lua.globals().get("table")?;
        let insert: Function = table_lib.get("insert")?;
        insert.call::<_, ()>((chain, SEARCHER_POSITION, searcher))?;

        lua.set_named_registry_value(SEARCHER_INSTALLED_KEY, true)?;
        tracing::debug!("installed virtual module searcher");
        Ok(true)
    }

    /// Searcher protocol: an explanatory string for unknown names so
    /// `require` keeps walking the chain, otherwise a loader for the freshly
    /// compiled chunk.
    ///
    /// Compiling here, before `require` marks the name as loading, leaves a
    /// failed compile uncached: the next `require` compiles again.
    fn searcher<'lua>(self: &Arc<Self>, lua: &'lua Lua) -> mlua::Result<Function<'lua>> {
        let registry = Arc::clone(self);
        lua.create_function(move |lua, name: String| {
            let Some(module) = registry.get(&name) else {
                let message = lua.create_string(format!("\n\t{}", not_found_marker(&name)))?;
                return Ok(Value::String(message));
            };

            let chunk = lua.create_registry_value(module.compile(lua)?)?;
            let loader = lua.create_function(move |lua, _: mlua::MultiValue| {
                tracing::debug!(module = %module.name, "executing virtual module");
                let chunk: Function = lua.registry_value(&chunk)?;
                chunk.call::<_, Value>(())
            })?;
            Ok(Value::Function(loader))
        })
    }
}
