//! hostlua: bridge between a Rust host and an embedded LuaJIT engine.
//!
//! Two facilities are provided:
//!
//! - **Native callbacks**: `extern "C"` functions registered by name in a
//!   [`CallbackRegistry`]. Scripts look the name up and receive a fixed
//!   address plus a C declaration derived from the Rust signature, which
//!   LuaJIT's `ffi.cast` turns into a directly callable function.
//! - **Virtual modules**: Lua source texts registered by name in a
//!   [`VirtualModuleRegistry`] and served to `require` through a searcher
//!   installed into the engine's module-resolution chain. Nothing touches
//!   the filesystem.
//!
//! A [`Module`] wires both into an [`Engine`] and may run bootstrap code;
//! [`FfiModule`] is the built-in one that exposes callbacks to scripts.
//!
//! ```text
//! Module::initialize(engine)
//!   ├─► CallbackRegistry.register_callback   (name -> pointer, signature)
//!   ├─► VirtualModuleRegistry.register_source (name -> text)
//!   └─► require(name) ─► searcher ─► compile + run ─► lookup(name) ─► ffi.cast
//! ```
//!
//! # Ownership
//!
//! Registry entries are never evicted. A callback is a function item whose
//! code lives for the process, so every pointer a script has seen stays
//! callable. The engine owns script values and its own `package.loaded`
//! cache; the bridge only supplies what gets cached.

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod logging;
pub mod module;
pub mod native;

pub use callback::{CallbackRegistry, NativeCallback};
pub use config::{BridgeConfig, EngineConfig, FfiConfig, LogFormat};
pub use engine::Engine;
pub use error::{ConfigError, Error, RegistryKind, Result};
pub use loader::{VirtualModule, VirtualModuleRegistry};
pub use module::{FfiModule, Module};
pub use native::{CReturn, CType, NativeFn, NativePointer, Trampoline};

/// Re-exported so hosts can name engine values without a direct dependency.
pub use mlua;
