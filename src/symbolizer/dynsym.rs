use crate::symbolizer::{demangle, SymbolResult, Symbolize};
use std::ffi::CStr;
use std::mem;

/// Symbols of the dynamic symbol table, through `dladdr`.
#[derive(Debug, Default, Copy, Clone)]
pub struct DynamicSymbolizer;

/// The raw `dladdr` answer for `address`.
///
/// The strings belong to the dynamic loader and stay valid while the object
/// is loaded, which is the rest of the process.
pub(crate) fn dladdr(address: usize) -> Option<(Option<&'static CStr>, Option<&'static CStr>, usize)> {
    unsafe {
        let mut info: libc::Dl_info = mem::zeroed();
        if libc::dladdr(address as *const libc::c_void, &mut info) == 0 {
            return None;
        }
        let module = (!info.dli_fname.is_null()).then(|| CStr::from_ptr(info.dli_fname));
        let name = (!info.dli_sname.is_null()).then(|| CStr::from_ptr(info.dli_sname));
        Some((module, name, info.dli_saddr as usize))
    }
}

impl Symbolize for DynamicSymbolizer {
    fn symbolize(&self, address: usize) -> SymbolResult {
        let (module, name, entry) = match dladdr(address) {
            Some(info) => info,
            None => return SymbolResult::default(),
        };
        match name {
            Some(name) => SymbolResult {
                module,
                function: Some(demangle(name)),
                file: None,
                line: 0,
                entry,
            },
            None => SymbolResult {
                module,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dladdr_libc() {
        let address = libc::getpid as usize;
        let result = DynamicSymbolizer.symbolize(address);
        assert!(result.module.is_some());
        let name = result.function.unwrap();
        assert!(name.as_c_str().to_str().unwrap().contains("getpid"));
        assert!(result.entry <= address);
        assert_eq!(result.file, None);
    }

    #[test]
    fn test_dladdr_unmapped() {
        assert!(!DynamicSymbolizer.symbolize(0x10).is_resolved());
    }
}
