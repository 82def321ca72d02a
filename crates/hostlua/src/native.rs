//! Native function pointers handed to LuaJIT's FFI.
//!
//! A callback is an `extern "C"` function item. Its address is fixed by the
//! linker and its code lives for the whole process, so the pointer the engine
//! stores can never dangle. The C declaration LuaJIT needs for `ffi.cast` is
//! derived from the Rust parameter and return types through [`CType`].

use std::ffi::c_void;
use std::fmt;

/// Process-stable address of a native callback.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePointer(usize);

impl NativePointer {
    fn from_code(ptr: *const ()) -> Self {
        Self(ptr.expose_provenance())
    }

    /// Numeric address.
    pub fn addr(self) -> usize {
        self.0
    }

    /// Raw pointer form, suitable for a Lua light userdata.
    pub fn as_ptr(self) -> *mut c_void {
        std::ptr::with_exposed_provenance_mut(self.0)
    }

    pub(crate) fn to_lua(self) -> mlua::LightUserData {
        mlua::LightUserData(self.as_ptr())
    }
}

impl fmt::Debug for NativePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePointer({:#x})", self.0)
    }
}

impl fmt::Display for NativePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A scalar type that can cross the FFI boundary by value.
pub trait CType: Copy + 'static {
    /// Spelling of the type in a LuaJIT C declaration.
    const C_NAME: &'static str;
}

/// A type a callback may return: any [`CType`], or `()` for `void`.
///
/// `()` is a return type only; it cannot stand in for a parameter:
///
/// ```compile_fail
/// use hostlua::NativeFn;
///
/// let _ = <extern "C" fn(()) -> i32 as NativeFn>::signature();
/// ```
pub trait CReturn: 'static {
    const C_NAME: &'static str;
}

impl CReturn for () {
    const C_NAME: &'static str = "void";
}

macro_rules! impl_ctype {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl CType for $ty {
                const C_NAME: &'static str = $name;
            }

            impl CReturn for $ty {
                const C_NAME: &'static str = $name;
            }
        )*
    };
}

impl_ctype! {
    bool => "bool",
    i8 => "int8_t",
    i16 => "int16_t",
    i32 => "int32_t",
    i64 => "int64_t",
    u8 => "uint8_t",
    u16 => "uint16_t",
    u32 => "uint32_t",
    u64 => "uint64_t",
    usize => "size_t",
    f32 => "float",
    f64 => "double",
}

/// Format a C function-pointer declaration, e.g. `int32_t (*)(int32_t, int32_t)`.
pub fn c_declaration(ret: &str, params: &[&str]) -> String {
    let params = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };
    format!("{ret} (*)({params})")
}

/// An `extern "C"` function pointer whose parameters are [`CType`]s and whose
/// return type is a [`CReturn`].
///
/// Implemented for arities 0 through 6. `()` is not a parameter type, so
/// `void` only ever appears in return position or as an empty list. Function items must be coerced to a
/// pointer first: `add as extern "C" fn(i32, i32) -> i32`.
pub trait NativeFn: Copy + Send + Sync + 'static {
    /// Number of parameters.
    const ARITY: usize;

    /// Address of the function's code.
    fn address(self) -> NativePointer;

    /// C declaration matching this function's Rust signature.
    fn signature() -> String;
}

macro_rules! impl_native_fn {
    (@count) => { 0usize };
    (@count $head:ident $($tail:ident)*) => { 1usize + impl_native_fn!(@count $($tail)*) };
    ($($arg:ident),*) => {
        impl<R: CReturn, $($arg: CType),*> NativeFn for extern "C" fn($($arg),*) -> R {
            const ARITY: usize = impl_native_fn!(@count $($arg)*);

            fn address(self) -> NativePointer {
                NativePointer::from_code(self as *const ())
            }

            fn signature() -> String {
                let params: &[&str] = &[$(<$arg as CType>::C_NAME),*];
                c_declaration(<R as CReturn>::C_NAME, params)
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A1);
impl_native_fn!(A1, A2);
impl_native_fn!(A1, A2, A3);
impl_native_fn!(A1, A2, A3, A4);
impl_native_fn!(A1, A2, A3, A4, A5);
impl_native_fn!(A1, A2, A3, A4, A5, A6);

/// Fixed-address entry point plus the declaration scripts cast it with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trampoline {
    pointer: NativePointer,
    signature: String,
    arity: usize,
}

impl Trampoline {
    /// Capture a native function's address and derived signature.
    pub fn of<F: NativeFn>(func: F) -> Self {
        Self {
            pointer: func.address(),
            signature: F::signature(),
            arity: F::ARITY,
        }
    }

    pub fn pointer(&self) -> NativePointer {
        self.pointer
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}
