//! Host-provided externs callable by name from source programs, matching
//! `examples/original_source/main.cpp`'s `extern "C"` definitions.
//!
//! A script must still declare these with `extern putchard(x); extern
//! printd(x);` before use — the symbols below are only what the
//! linker/JIT binds the declaration to, the same two-step the rest of the
//! prototype-resolution machinery uses for any other function.

use std::io::Write;

/// Writes `x` truncated to a byte to stderr. Returns 0.
#[no_mangle]
pub extern "C" fn putchard(x: f64) -> f64 {
    let _ = std::io::stderr().write_all(&[x as u8]);
    0.0
}

/// Writes `x` as `%f\n` to stdout. Returns 0.
#[no_mangle]
pub extern "C" fn printd(x: f64) -> f64 {
    println!("{x:.6}");
    0.0
}
