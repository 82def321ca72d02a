//! Error types for hostlua

use std::fmt;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Which registry an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    /// Native callback pointers
    Callback,
    /// In-memory module sources
    Module,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback => f.write_str("callback"),
            Self::Module => f.write_str("virtual module"),
        }
    }
}

/// Main error type for hostlua
#[derive(Error, Debug)]
pub enum Error {
    /// A name was registered twice in the same registry
    #[error("{kind} '{name}' is already registered")]
    DuplicateRegistration { kind: RegistryKind, name: String },

    /// `require` of a name no searcher could resolve
    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    /// Registered source text failed to compile at first load
    #[error("failed to compile virtual module '{module}': {message}")]
    Compile { module: String, message: String },

    /// Registration attempted after the registry was sealed
    #[error("{0} registry is sealed")]
    Sealed(RegistryKind),

    /// The engine state was created without LuaJIT's FFI library
    #[error("LuaJIT FFI library is not loaded in this engine state")]
    FfiUnavailable,

    /// Errors raised by the engine itself
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Recover a typed bridge error from an engine error.
    ///
    /// Errors raised inside Rust callbacks (the searcher, the pointer lookup)
    /// come back wrapped in `CallbackError`/`ExternalError` layers; this
    /// unwraps them so callers can match on `Compile` and friends. Anything
    /// that did not originate in the bridge stays `Error::Lua`.
    pub fn from_lua(err: mlua::Error) -> Self {
        match find_bridge_error(&err) {
            Some(Self::Compile { module, message }) => Self::Compile {
                module: module.clone(),
                message: message.clone(),
            },
            Some(Self::ModuleNotFound(name)) => Self::ModuleNotFound(name.clone()),
            Some(Self::FfiUnavailable) => Self::FfiUnavailable,
            _ => Self::Lua(err),
        }
    }

    /// Whether scripts can observe (and `pcall`) this kind of failure.
    ///
    /// Duplicate registrations and sealing are host-side programming errors.
    pub fn is_script_visible(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound(_) | Self::Compile { .. } | Self::Lua(_)
        )
    }

    /// One-line remediation hint, when there is an obvious one.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DuplicateRegistration { .. } => {
                Some("Register each name once; names are never evicted for the process lifetime.")
            }
            Self::ModuleNotFound(_) => {
                Some("Register the module source before the first require of that name.")
            }
            Self::Compile { .. } => Some("Fix the syntax error in the registered source text."),
            Self::Sealed(_) => Some("Register everything before sealing the registries."),
            Self::FfiUnavailable => Some("Set `engine.ffi = true` in the bridge configuration."),
            Self::Config(_) => Some("Check the TOML configuration against BridgeConfig."),
            Self::Lua(_) | Self::Io(_) => None,
        }
    }
}

fn find_bridge_error(err: &mlua::Error) -> Option<&Error> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<Error>(),
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            find_bridge_error(cause)
        }
        _ => None,
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be a Lua identifier, got '{value}'")]
    NotAnIdentifier { field: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_survives_callback_wrapping() {
        let inner = mlua::Error::external(Error::Compile {
            module: "m".to_string(),
            message: "unexpected symbol".to_string(),
        });
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback:".to_string(),
            cause: std::sync::Arc::new(inner),
        };

        match Error::from_lua(wrapped) {
            Error::Compile { module, message } => {
                assert_eq!(module, "m");
                assert_eq!(message, "unexpected symbol");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn foreign_lua_errors_stay_lua() {
        let err = Error::from_lua(mlua::Error::RuntimeError("boom".to_string()));
        assert!(matches!(err, Error::Lua(_)));
        assert!(err.is_script_visible());
        assert!(err.hint().is_none());
    }

    #[test]
    fn host_side_errors_are_not_script_visible() {
        let dup = Error::DuplicateRegistration {
            kind: RegistryKind::Callback,
            name: "Add".to_string(),
        };
        assert!(!dup.is_script_visible());
        assert_eq!(dup.to_string(), "callback 'Add' is already registered");
        assert!(!Error::Sealed(RegistryKind::Module).is_script_visible());
    }
}
