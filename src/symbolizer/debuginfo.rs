use crate::symbolizer::dynsym::dladdr;
use crate::symbolizer::{demangle, SymbolResult, Symbolize};
use crate::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::sync::Mutex;

lazy_static! {
    static ref SESSION: Mutex<Session> = Mutex::new(Session::default());
}

/// Strings handed out so far. They are never freed: results borrow them for
/// the rest of the process.
#[derive(Default)]
struct Session {
    strings: HashMap<Vec<u8>, &'static CStr>,
}

impl Session {
    fn intern(&mut self, bytes: &[u8]) -> Option<&'static CStr> {
        if let Some(&s) = self.strings.get(bytes) {
            return Some(s);
        }
        let s: &'static CStr = Box::leak(CString::new(bytes).ok()?.into_boxed_c_str());
        self.strings.insert(bytes.to_vec(), s);
        Some(s)
    }
}

/// File, line and function from the debug information of the loaded
/// objects.
#[derive(Debug)]
pub struct DebugInfoSymbolizer {
    _private: (),
}

impl DebugInfoSymbolizer {
    /// Fails if the executable cannot be located, in which case nothing but
    /// the dynamic symbols could be found anyway.
    pub fn new() -> Result<Self> {
        std::env::current_exe().map_err(|err| Error::SymbolizerUnavailable(err.to_string()))?;
        Ok(Self { _private: () })
    }
}

impl Symbolize for DebugInfoSymbolizer {
    fn symbolize(&self, address: usize) -> SymbolResult {
        let mut session = match SESSION.lock() {
            Ok(session) => session,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut name = None;
        let mut file = None;
        let mut line = 0;
        let mut entry = 0;
        // Inlined frames come innermost first: the location is the innermost
        // one's, the function the outermost one's.
        backtrace::resolve(address as *mut libc::c_void, |symbol| {
            if file.is_none() {
                file = symbol.filename().and_then(|p| session.intern(p.as_os_str().as_bytes()));
                line = symbol.lineno().unwrap_or(0) as usize;
            }
            if let Some(n) = symbol.name() {
                name = session.intern(n.as_bytes());
            }
            if let Some(addr) = symbol.addr() {
                entry = addr as usize;
            }
        });

        let (module, dyn_name, dyn_entry) = dladdr(address).unwrap_or((None, None, 0));
        let name = name.or(dyn_name);
        SymbolResult {
            module,
            function: name.map(demangle),
            file,
            line,
            entry: if entry != 0 { entry } else { dyn_entry },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn target() -> usize {
        line!() as usize
    }

    #[test]
    fn test_intern() {
        let mut session = Session::default();
        let a = session.intern(b"a.rs").unwrap();
        let b = session.intern(b"a.rs").unwrap();
        assert!(std::ptr::eq(a, b));
        assert!(session.intern(b"nul\0inside").is_none());
    }

    #[test]
    fn test_symbolize_with_lines() {
        let symbolizer = DebugInfoSymbolizer::new().unwrap();
        let address = target as usize;
        assert!(target() > 0);
        let result = symbolizer.symbolize(address + 1);
        let name = result.function.unwrap();
        assert!(name.as_c_str().to_str().unwrap().contains("target"));
        let file = result.file.unwrap().to_str().unwrap();
        assert!(file.ends_with("debuginfo.rs"));
        assert!(result.line > 0);
        assert_eq!(result.entry, address);
    }
}
