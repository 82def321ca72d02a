use crate::callback::CallbackRegistry;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::loader::{VirtualModuleRegistry, not_found_marker};
use crate::module::{FfiModule, Module};
use crate::native::{NativeFn, NativePointer};
use mlua::{FromLua, FromLuaMulti, IntoLuaMulti, Lua, LuaOptions, StdLib};
use std::path::Path;
use std::sync::Arc;

/// One LuaJIT state plus the registries it resolves callbacks and modules
/// against.
///
/// Registries are held by `Arc` so several engine states can share them; each
/// state gets its own searcher and its own `package.loaded` cache.
pub struct Engine {
    lua: Lua,
    callbacks: Arc<CallbackRegistry>,
    modules: Arc<VirtualModuleRegistry>,
    config: BridgeConfig,
    ffi: bool,
}

#[allow(unsafe_code)]
fn new_state(ffi: bool) -> Lua {
    if ffi {
        // SAFETY: `StdLib::ALL` opens LuaJIT's `ffi`, letting scripts call any
        // address they can cast. Scripts only receive addresses from the
        // callback registry, whose entries are never freed.
        unsafe { Lua::unsafe_new_with(StdLib::ALL, LuaOptions::default()) }
    } else {
        Lua::new()
    }
}

impl Engine {
    /// Create an engine state with private registries.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        Self::with_registries(config, Arc::default(), Arc::default())
    }

    /// Create an engine state that shares registries with other states.
    pub fn with_registries(
        config: BridgeConfig,
        callbacks: Arc<CallbackRegistry>,
        modules: Arc<VirtualModuleRegistry>,
    ) -> Result<Self> {
        let ffi = config.engine.ffi;
        let engine = Self {
            lua: new_state(ffi),
            callbacks,
            modules,
            config,
            ffi,
        };
        // The searcher reads the registry live, so sources added later
        // through any handle resolve here too.
        engine.install_loader()?;
        tracing::debug!(
            ffi,
            callbacks = engine.callbacks.len(),
            modules = engine.modules.len(),
            "created engine state"
        );
        Ok(engine)
    }

    /// Create an engine state and initialize the built-in [`FfiModule`].
    pub fn bootstrap(config: BridgeConfig) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.initialize(&FfiModule::new(engine.config.ffi.clone()))?;
        Ok(engine)
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }

    pub fn modules(&self) -> &Arc<VirtualModuleRegistry> {
        &self.modules
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether LuaJIT's `ffi` library is open in this state.
    pub fn has_ffi(&self) -> bool {
        self.ffi
    }

    /// Run `module.initialize` against this engine.
    pub fn initialize(&self, module: &dyn Module) -> Result<()> {
        tracing::debug!(module = module.name(), "initializing module");
        if let Err(err) = module.initialize(self) {
            tracing::warn!(module = module.name(), error = %err, "module initialization failed");
            return Err(err);
        }
        if self.config.engine.seal_after_init {
            self.seal();
        }
        Ok(())
    }

    pub fn register_callback<F: NativeFn>(&self, name: &str, func: F) -> Result<NativePointer> {
        self.callbacks.register_callback(name, func)
    }

    pub fn lookup_pointer(&self, name: &str) -> Option<NativePointer> {
        self.callbacks.lookup_pointer(name)
    }

    /// Register a module source; `false` when the name is taken or the
    /// registry is sealed.
    pub fn register_source(&self, name: &str, source: &str) -> Result<bool> {
        Ok(self.modules.register_source(name, source))
    }

    pub fn register_file(&self, name: &str, path: &Path) -> Result<bool> {
        self.modules.register_file(name, path)
    }

    /// Install the virtual module searcher into this state if it is missing.
    ///
    /// Construction already installs it, so this normally returns `false`.
    pub fn install_loader(&self) -> Result<bool> {
        self.modules.install(&self.lua)
    }

    /// Expose a host closure to scripts as the global `name`.
    pub fn register_function<'lua, A, R, F>(&'lua self, name: &str, func: F) -> Result<()>
    where
        A: FromLuaMulti<'lua>,
        R: IntoLuaMulti<'lua>,
        F: Fn(&'lua Lua, A) -> mlua::Result<R> + Send + 'static,
    {
        let function = self.lua.create_function(func)?;
        self.lua.globals().set(name, function)?;
        tracing::debug!(function = name, "registered global host function");
        Ok(())
    }

    /// Call the engine's `require` for `name`.
    pub fn require<'lua, T: FromLua<'lua>>(&'lua self, name: &str) -> Result<T> {
        let require: mlua::Function = self.lua.globals().get("require")?;
        require
            .call::<_, T>(name)
            .map_err(|err| self.classify_require_error(name, err))
    }

    /// `ModuleNotFound` only for names this registry lacks and whose failure
    /// carries the searcher's own marker; a module body raising a look-alike
    /// message stays a plain Lua error.
    fn classify_require_error(&self, name: &str, err: mlua::Error) -> Error {
        match Error::from_lua(err) {
            Error::Lua(err)
                if !self.modules.contains(name) && {
                    let message = err.to_string();
                    message.contains(&format!("module '{name}' not found"))
                        && message.contains(&not_found_marker(name))
                } =>
            {
                Error::ModuleNotFound(name.to_string())
            }
            other => other,
        }
    }

    /// Run a chunk for its side effects.
    pub fn exec(&self, source: &str, chunk_name: &str) -> Result<()> {
        self.lua
            .load(source)
            .set_name(chunk_name)
            .exec()
            .map_err(Error::from_lua)
    }

    /// Run a chunk and convert its return values.
    pub fn eval<'lua, T: FromLuaMulti<'lua>>(
        &'lua self,
        source: &str,
        chunk_name: &str,
    ) -> Result<T> {
        self.lua
            .load(source)
            .set_name(chunk_name)
            .eval::<T>()
            .map_err(Error::from_lua)
    }

    /// Seal both registries.
    pub fn seal(&self) {
        self.callbacks.seal();
        self.modules.seal();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("ffi", &self.ffi)
            .field("callbacks", &self.callbacks)
            .field("modules", &self.modules.names())
            .finish_non_exhaustive()
    }
}
