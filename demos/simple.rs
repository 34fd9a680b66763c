use cgotraceback::symbolizer::{self, FunctionName};

fn main() {
    cgotraceback::init();

    // Do stack backtrace.
    let mut pcs = [0; 64];
    let n = cgotraceback::trace(&mut pcs);

    // Resolve addresses into symbols and display.
    for pc in &pcs[..n] {
        let symbol = symbolizer::resolve(*pc);
        let name = symbol.function.as_ref().map(FunctionName::as_c_str);
        println!("{:#x}: {:?} (+{:#x})", pc, name, pc.wrapping_sub(symbol.entry));
    }
}

