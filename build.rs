use std::env;

fn main() {
    // cfg!(target_arch) here would describe the host.
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let file = match arch.as_str() {
        "x86_64" => "src/arch/x86_64.S",
        "x86" => "src/arch/x86.S",
        "arm" => "src/arch/arm.S",
        "aarch64" => "src/arch/aarch64.S",
        other => panic!("unsupported target architecture: {}", other),
    };
    println!("cargo:rerun-if-changed={}", file);
    // Integration tests resolve their own exported symbols through dladdr.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("linux") {
        println!("cargo:rustc-link-arg-tests=-rdynamic");
    }
    cc::Build::new().file(file).compile("cgotraceback_arch");
}
