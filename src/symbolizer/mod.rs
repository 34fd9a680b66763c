//! Address to symbol resolution.
//!
//! The default backend asks the dynamic loader (`dladdr`), which only knows
//! exported symbols. With the `debug-info` feature, file and line information
//! is looked up in the debug sections of the loaded objects.

use once_cell::sync::OnceCell;
use std::ffi::CStr;
use std::os::raw::c_char;

mod demangle;
#[cfg(feature = "debug-info")]
mod debuginfo;
mod dynsym;

pub use demangle::{demangle, outstanding_names, DemangledName};
#[cfg(feature = "debug-info")]
pub use debuginfo::DebugInfoSymbolizer;
pub use dynsym::DynamicSymbolizer;

/// A function name handed out by [resolve].
#[derive(Debug)]
pub enum FunctionName {
    /// Lives as long as the process.
    Borrowed(&'static CStr),
    /// Demangled for this result. Must eventually be dropped, or passed back
    /// to [release] after [DemangledName::into_raw].
    Owned(DemangledName),
}

impl FunctionName {
    pub fn as_c_str(&self) -> &CStr {
        match self {
            FunctionName::Borrowed(name) => name,
            FunctionName::Owned(name) => name.as_c_str(),
        }
    }
}

/// What is known about an address. Every field may be missing.
#[derive(Debug, Default)]
pub struct SymbolResult {
    /// Path of the containing executable or library.
    pub module: Option<&'static CStr>,
    pub function: Option<FunctionName>,
    pub file: Option<&'static CStr>,
    pub line: usize,
    /// Address of the first instruction of `function`.
    pub entry: usize,
}

impl SymbolResult {
    #[inline]
    pub fn owns_function_name(&self) -> bool {
        matches!(self.function, Some(FunctionName::Owned(_)))
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.function.is_some()
    }
}

/// A symbolization backend.
pub trait Symbolize: Send + Sync {
    fn symbolize(&self, address: usize) -> SymbolResult;
}

/// Used when the configured backend cannot work in this process.
#[cfg_attr(not(feature = "debug-info"), allow(dead_code))]
struct Unresolved;

impl Symbolize for Unresolved {
    fn symbolize(&self, _address: usize) -> SymbolResult {
        SymbolResult::default()
    }
}

static BACKEND: OnceCell<Box<dyn Symbolize>> = OnceCell::new();

/// The process-wide backend, chosen on first use.
pub fn backend() -> &'static dyn Symbolize {
    BACKEND.get_or_init(default_backend).as_ref()
}

#[cfg(not(feature = "debug-info"))]
fn default_backend() -> Box<dyn Symbolize> {
    Box::new(DynamicSymbolizer)
}

#[cfg(feature = "debug-info")]
fn default_backend() -> Box<dyn Symbolize> {
    match DebugInfoSymbolizer::new() {
        Ok(symbolizer) => Box::new(symbolizer),
        Err(err) => {
            log::warn!("{}", err);
            Box::new(Unresolved)
        }
    }
}

/// Resolves `address` with the process-wide backend. Address 0 resolves to
/// nothing.
pub fn resolve(address: usize) -> SymbolResult {
    if address == 0 {
        return SymbolResult::default();
    }
    backend().symbolize(address)
}

/// Frees a name obtained from [DemangledName::into_raw].
///
/// # Safety
///
/// `raw` must come from [DemangledName::into_raw] and not have been released
/// before.
pub unsafe fn release(raw: *mut c_char) {
    if !raw.is_null() {
        drop(DemangledName::from_raw(raw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_zero() {
        let result = resolve(0);
        assert!(!result.is_resolved());
        assert!(result.module.is_none());
        assert_eq!(result.entry, 0);
    }

    #[test]
    fn test_resolve_libc_function() {
        let address = libc::getpid as usize;
        let result = resolve(address);
        assert!(result.module.is_some());
        let name = result.function.unwrap();
        assert!(name.as_c_str().to_str().unwrap().contains("getpid"));
    }

    #[test]
    fn test_unresolved_backend() {
        assert!(!Unresolved.symbolize(0x1234).is_resolved());
    }
}
