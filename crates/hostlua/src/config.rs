//! Bridge configuration.
//!
//! Every section is optional in TOML; missing keys take the defaults below.
//!
//! ```toml
//! [engine]
//! ffi = true
//! seal_after_init = false
//!
//! [ffi]
//! module_name = "hostlua"
//! lookup_global = "hostlua_lookup"
//! bind_globals = false
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Engine state construction options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Open LuaJIT's `ffi` library. Required for the native-pointer path.
    pub ffi: bool,
    /// Seal both registries once the first module has initialized.
    pub seal_after_init: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffi: true,
            seal_after_init: false,
        }
    }
}

/// Options for the built-in FFI bootstrap module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfiConfig {
    /// Name scripts pass to `require` to get the binding helpers.
    pub module_name: String,
    /// Global host function that maps a callback name to `pointer, signature`.
    pub lookup_global: String,
    /// Bind every registered callback as a global of the same name.
    pub bind_globals: bool,
}

const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

fn is_lua_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !LUA_KEYWORDS.contains(&name)
}

impl FfiConfig {
    /// Check that `lookup_global` can be spelled as a bare Lua name; the
    /// bootstrap module refers to it directly.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if is_lua_identifier(&self.lookup_global) {
            Ok(())
        } else {
            Err(ConfigError::NotAnIdentifier {
                field: "ffi.lookup_global",
                value: self.lookup_global.clone(),
            })
        }
    }
}

impl Default for FfiConfig {
    fn default() -> Self {
        Self {
            module_name: "hostlua".to_string(),
            lookup_global: "hostlua_lookup".to_string(),
            bind_globals: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub engine: EngineConfig,
    pub ffi: FfiConfig,
    pub logging: LogConfig,
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(ConfigError::from)?;
        config.ffi.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
