use cgotraceback::callbacks::{cgotraceback_symbolizer, SymbolizerArg};
use cgotraceback::symbolizer::outstanding_names;
use std::ffi::CStr;

// Exported under a C++ name so dladdr reports it and the name is demangled
// into an owned buffer.
#[export_name = "_Z22cgotraceback_leak_testv"]
#[inline(never)]
pub extern "C" fn exported_target() -> usize {
    std::hint::black_box(exported_target as usize)
}

fn symbolize(arg: &mut SymbolizerArg, pc: usize) {
    arg.pc = pc;
    unsafe { cgotraceback_symbolizer(arg) };
}

#[test]
fn test_no_leak_across_resolve_zero() {
    cgotraceback::init();
    let target = exported_target();
    let before = outstanding_names();

    let mut arg = SymbolizerArg::default();
    symbolize(&mut arg, target);
    assert_ne!(arg.data, 0);
    assert_eq!(arg.data, arg.func as usize);
    let func = unsafe { CStr::from_ptr(arg.func) }.to_str().unwrap();
    assert_eq!(func, "cgotraceback_leak_test()");
    assert_eq!(outstanding_names(), before + 1);
    symbolize(&mut arg, 0);
    assert_eq!(arg.data, 0);
    assert_eq!(outstanding_names(), before);

    let pcs = [target, target + 1, libc::getpid as usize, 0x10];
    for _ in 0..1000 {
        for pc in pcs {
            symbolize(&mut arg, pc);
            symbolize(&mut arg, 0);
            assert_eq!(arg.data, 0);
        }
    }
    assert_eq!(outstanding_names(), before);

    // The host may also resolve several pcs before the final release.
    for pc in pcs {
        symbolize(&mut arg, pc);
        assert!(outstanding_names() <= before + 1);
    }
    symbolize(&mut arg, target);
    assert_eq!(outstanding_names(), before + 1);
    symbolize(&mut arg, 0);
    assert_eq!(outstanding_names(), before);
}
