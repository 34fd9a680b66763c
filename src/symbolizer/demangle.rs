use crate::symbolizer::FunctionName;
use cpp_demangle::{DemangleOptions, Symbol};
use rustc_demangle::try_demangle;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);

/// Demangled names currently allocated.
pub fn outstanding_names() -> usize {
    OUTSTANDING.load(Ordering::Relaxed)
}

/// An allocated, NUL-terminated demangled name.
#[derive(Debug)]
pub struct DemangledName(CString);

impl DemangledName {
    fn new(name: CString) -> Self {
        OUTSTANDING.fetch_add(1, Ordering::Relaxed);
        Self(name)
    }

    #[inline]
    pub fn as_c_str(&self) -> &CStr {
        &self.0
    }

    /// Gives up ownership; [DemangledName::from_raw] takes it back.
    pub fn into_raw(self) -> *mut c_char {
        // Still outstanding until taken back.
        let this = ManuallyDrop::new(self);
        let name = unsafe { std::ptr::read(&this.0) };
        name.into_raw()
    }

    /// # Safety
    ///
    /// `raw` must come from [DemangledName::into_raw] and be used only once.
    pub unsafe fn from_raw(raw: *mut c_char) -> Self {
        Self(CString::from_raw(raw))
    }
}

impl Drop for DemangledName {
    fn drop(&mut self) {
        OUTSTANDING.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Demangles Rust (`_ZN`/`_R`) and C++ (`_Z`) symbols. Names that are not
/// mangled, or not understood, come back as they are.
pub fn demangle(raw: &'static CStr) -> FunctionName {
    let bytes = raw.to_bytes();
    let demangled = if bytes.starts_with(b"_R") {
        demangle_rust(raw)
    } else if bytes.starts_with(b"_Z") {
        demangle_rust(raw).or_else(|| demangle_cpp(bytes))
    } else {
        None
    };
    match demangled.and_then(|name| CString::new(name).ok()) {
        Some(name) => FunctionName::Owned(DemangledName::new(name)),
        None => FunctionName::Borrowed(raw),
    }
}

fn demangle_rust(raw: &CStr) -> Option<String> {
    let demangled = try_demangle(raw.to_str().ok()?).ok()?;
    Some(format!("{:#}", demangled))
}

fn demangle_cpp(bytes: &[u8]) -> Option<String> {
    Symbol::new(bytes).ok()?.demangle(&DemangleOptions::default()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(s: &str) -> &'static CStr {
        Box::leak(CString::new(s).unwrap().into_boxed_c_str())
    }

    #[test]
    fn test_demangle() {
        let name = demangle(leak("_ZN4core3ptr13drop_in_place17h0123456789abcdefE"));
        assert!(matches!(name, FunctionName::Owned(_)));
        assert_eq!(name.as_c_str().to_str().unwrap(), "core::ptr::drop_in_place");

        let name = demangle(leak("_RNvCs1234_7mycrate3foo"));
        assert_eq!(name.as_c_str().to_str().unwrap(), "mycrate::foo");

        // Not mangled at all.
        assert!(matches!(demangle(leak("malloc")), FunctionName::Borrowed(_)));
        // C++.
        let name = demangle(leak("_Z3fooi"));
        assert!(matches!(name, FunctionName::Owned(_)));
        assert_eq!(name.as_c_str().to_str().unwrap(), "foo(int)");
        let name = demangle(leak("_ZNSt6vectorIiSaIiEE9push_backERKi"));
        assert!(matches!(name, FunctionName::Owned(_)));
        assert!(name.as_c_str().to_str().unwrap().contains("push_back"));

        // Mangled-looking garbage.
        let name = demangle(leak("_Z!!"));
        assert!(matches!(name, FunctionName::Borrowed(_)));
        assert_eq!(name.as_c_str().to_str().unwrap(), "_Z!!");
    }

    #[test]
    fn test_raw_round_trip_keeps_count() {
        let name = match demangle(leak("_ZN3foo3barE")) {
            FunctionName::Owned(name) => name,
            FunctionName::Borrowed(_) => panic!("not demangled"),
        };
        let raw = name.into_raw();
        let name = unsafe { DemangledName::from_raw(raw) };
        assert_eq!(name.as_c_str().to_str().unwrap(), "foo::bar");
        drop(name);
    }
}
