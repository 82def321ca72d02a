//! Registry of native callbacks exposed to scripts by address.
//!
//! Entries live in an append-only arena: a pointer handed to the engine is
//! never evicted, replaced, or moved for the lifetime of the registry.

use crate::error::{Error, RegistryKind, Result};
use crate::native::{NativeFn, NativePointer, Trampoline};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A named, registered trampoline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeCallback {
    name: String,
    trampoline: Trampoline,
}

impl NativeCallback {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointer(&self) -> NativePointer {
        self.trampoline.pointer()
    }

    pub fn signature(&self) -> &str {
        self.trampoline.signature()
    }

    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }
}

#[derive(Default)]
struct Arena {
    entries: Vec<NativeCallback>,
    by_name: HashMap<String, usize>,
}

/// Name -> native pointer table shared by every engine state that uses it.
#[derive(Default)]
pub struct CallbackRegistry {
    arena: RwLock<Arena>,
    sealed: AtomicBool,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an `extern "C"` function under `name` and return its pointer.
    pub fn register_callback<F: NativeFn>(&self, name: &str, func: F) -> Result<NativePointer> {
        self.register_trampoline(name, Trampoline::of(func))
    }

    /// Register a prepared trampoline under `name`.
    ///
    /// A name can be registered once; a second registration fails with
    /// `DuplicateRegistration` and leaves the first entry in place.
    pub fn register_trampoline(&self, name: &str, trampoline: Trampoline) -> Result<NativePointer> {
        let mut arena = self.arena.write();
        if self.is_sealed() {
            tracing::warn!(callback = name, "rejected registration on sealed callback registry");
            return Err(Error::Sealed(RegistryKind::Callback));
        }
        if arena.by_name.contains_key(name) {
            tracing::warn!(callback = name, "duplicate callback registration");
            return Err(Error::DuplicateRegistration {
                kind: RegistryKind::Callback,
                name: name.to_string(),
            });
        }

        let pointer = trampoline.pointer();
        let index = arena.entries.len();
        arena.entries.push(NativeCallback {
            name: name.to_string(),
            trampoline,
        });
        arena.by_name.insert(name.to_string(), index);

        tracing::debug!(callback = name, pointer = %pointer, "registered native callback");
        Ok(pointer)
    }

    /// Register an explicit startup table of `(name, trampoline)` pairs.
    ///
    /// Entries are registered in order; the first failure stops the walk and
    /// is returned, leaving earlier entries registered.
    pub fn register_table(&self, table: &[(&str, Trampoline)]) -> Result<Vec<NativePointer>> {
        table
            .iter()
            .map(|(name, trampoline)| self.register_trampoline(name, trampoline.clone()))
            .collect()
    }

    /// Pointer registered under `name`, or `None` for unknown names.
    pub fn lookup_pointer(&self, name: &str) -> Option<NativePointer> {
        self.lookup(name).map(|callback| callback.pointer())
    }

    /// Full entry registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<NativeCallback> {
        let arena = self.arena.read();
        arena
            .by_name
            .get(name)
            .map(|&index| arena.entries[index].clone())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.arena.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.arena.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting registrations. Lookups keep working.
    ///
    /// The flag flips under the write lock, so no registration completes
    /// after this returns.
    pub fn seal(&self) {
        let arena = self.arena.write();
        if !self.sealed.swap(true, Ordering::AcqRel) {
            tracing::debug!(entries = arena.entries.len(), "sealed callback registry");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("names", &self.names())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a.wrapping_add(b)
    }

    extern "C" fn negate(x: f64) -> f64 {
        -x
    }

    fn add_ptr() -> extern "C" fn(i32, i32) -> i32 {
        add
    }

    #[test]
    fn register_then_lookup() {
        let registry = CallbackRegistry::new();
        let pointer = registry.register_callback("Add", add_ptr()).unwrap();
        assert_eq!(registry.lookup_pointer("Add"), Some(pointer));

        let entry = registry.lookup("Add").unwrap();
        assert_eq!(entry.name(), "Add");
        assert_eq!(entry.signature(), "int32_t (*)(int32_t, int32_t)");
    }

    #[test]
    fn unknown_name_is_none() {
        let registry = CallbackRegistry::new();
        assert_eq!(registry.lookup_pointer("missing"), None);
        assert!(registry.lookup("missing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_is_rejected_and_first_entry_kept() {
        let registry = CallbackRegistry::new();
        let first = registry.register_callback("f", add_ptr()).unwrap();
        let err = registry
            .register_callback("f", negate as extern "C" fn(f64) -> f64)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DuplicateRegistration {
                kind: RegistryKind::Callback,
                ..
            }
        ));
        assert_eq!(registry.lookup_pointer("f"), Some(first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn table_registration_stops_at_first_failure() {
        let registry = CallbackRegistry::new();
        let table = [
            ("Add", Trampoline::of(add_ptr())),
            ("Negate", Trampoline::of(negate as extern "C" fn(f64) -> f64)),
            ("Add", Trampoline::of(add_ptr())),
            ("Later", Trampoline::of(add_ptr())),
        ];

        assert!(registry.register_table(&table).is_err());
        assert_eq!(registry.names(), vec!["Add".to_string(), "Negate".to_string()]);
    }

    #[test]
    fn sealed_registry_rejects_writes_but_serves_reads() {
        let registry = CallbackRegistry::new();
        registry.register_callback("Add", add_ptr()).unwrap();
        registry.seal();

        assert!(registry.is_sealed());
        assert!(matches!(
            registry.register_callback("Other", add_ptr()),
            Err(Error::Sealed(RegistryKind::Callback))
        ));
        assert!(registry.lookup_pointer("Add").is_some());
    }

    #[test]
    fn registrations_racing_seal_never_land_afterwards() {
        let registry = std::sync::Arc::new(CallbackRegistry::new());
        std::thread::scope(|scope| {
            let writer = std::sync::Arc::clone(&registry);
            scope.spawn(move || {
                for i in 0..1000 {
                    if writer.register_callback(&format!("cb{i}"), add_ptr()).is_err() {
                        break;
                    }
                }
            });
            std::thread::yield_now();
            registry.seal();
            let at_seal = registry.len();
            std::thread::sleep(std::time::Duration::from_millis(5));
            assert_eq!(registry.len(), at_seal);
        });
    }

    #[test]
    fn same_function_under_two_names_shares_pointer() {
        let registry = CallbackRegistry::new();
        let a = registry.register_callback("a", add_ptr()).unwrap();
        let b = registry.register_callback("b", add_ptr()).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 2);
    }
}
