//! Composition units that wire callbacks and virtual modules into an engine.

use crate::config::FfiConfig;
use crate::engine::Engine;
use crate::error::{Error, RegistryKind, Result};
use mlua::{Function, Table};

/// A unit of host functionality installed into an [`Engine`].
///
/// `initialize` may register native callbacks, register virtual module
/// sources, and require one of its own modules to run bootstrap code. Calling
/// it twice on the same engine fails on the duplicate registrations.
pub trait Module {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn initialize(&self, engine: &Engine) -> Result<()>;
}

const BOOTSTRAP_TEMPLATE: &str = r#"local ffi = require("ffi")
local lookup = __LOOKUP__
local M = {}

-- Cast a registered native callback to a callable FFI function.
-- Returns nil when no callback is registered under `name`.
function M.find(name, signature)
    local address, declared = lookup(name)
    if address == nil then
        return nil
    end
    return ffi.cast(signature or declared, address)
end

-- Like find, and also store the function as a global named `name`.
function M.bind(name, signature)
    local fn = M.find(name, signature)
    if fn ~= nil then
        _G[name] = fn
    end
    return fn
end

return M
"#;

/// Exposes the callback registry to scripts through LuaJIT's FFI.
///
/// Registers a global lookup function returning `pointer, signature` (or
/// `nil`), registers the bootstrap module that turns those into callable FFI
/// functions, and requires it immediately.
#[derive(Debug, Clone, Default)]
pub struct FfiModule {
    config: FfiConfig,
}

impl FfiModule {
    pub fn new(config: FfiConfig) -> Self {
        Self { config }
    }

    /// Lua source of the bootstrap module.
    pub fn bootstrap_source(&self) -> String {
        BOOTSTRAP_TEMPLATE.replace("__LOOKUP__", &self.config.lookup_global)
    }
}

impl Module for FfiModule {
    fn name(&self) -> &str {
        &self.config.module_name
    }

    fn initialize(&self, engine: &Engine) -> Result<()> {
        if !engine.has_ffi() {
            return Err(Error::FfiUnavailable);
        }
        self.config.validate()?;

        let callbacks = engine.callbacks().clone();
        engine.register_function(
            &self.config.lookup_global,
            move |_, name: String| match callbacks.lookup(&name) {
                Some(entry) => Ok((
                    Some(entry.pointer().to_lua()),
                    Some(entry.signature().to_string()),
                )),
                None => Ok((None, None)),
            },
        )?;

        // A registry shared with another engine state may already hold the
        // identical bootstrap text; anything else under the name is a clash.
        let source = self.bootstrap_source();
        if !engine.register_source(&self.config.module_name, &source)? {
            let shared = engine
                .modules()
                .get(&self.config.module_name)
                .is_some_and(|existing| existing.source() == source);
            if !shared {
                return Err(Error::DuplicateRegistration {
                    kind: RegistryKind::Module,
                    name: self.config.module_name.clone(),
                });
            }
        }

        let module: Table = engine.require(&self.config.module_name)?;
        if self.config.bind_globals {
            let bind: Function = module.get("bind")?;
            for name in engine.callbacks().names() {
                bind.call::<_, mlua::Value>(name.as_str())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_uses_configured_lookup_global() {
        let module = FfiModule::new(FfiConfig {
            lookup_global: "my_lookup".to_string(),
            ..FfiConfig::default()
        });
        let source = module.bootstrap_source();
        assert!(source.contains("local lookup = my_lookup"));
        assert!(!source.contains("__LOOKUP__"));
    }

    #[test]
    fn invalid_lookup_global_is_rejected_before_registering() {
        let engine = Engine::new(crate::BridgeConfig::default()).unwrap();
        let module = FfiModule::new(FfiConfig {
            lookup_global: "not-a-name".to_string(),
            ..FfiConfig::default()
        });
        let err = module.initialize(&engine).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(crate::ConfigError::NotAnIdentifier { .. })
        ));
        assert!(!engine.modules().contains("hostlua"));
    }

    #[test]
    fn name_is_module_name() {
        assert_eq!(FfiModule::default().name(), "hostlua");
    }
}
