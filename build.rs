//! Build script for ue-retarget
//!
//! Reads the BUILD file, bumps it on every build and exposes the number
//! to the binary for `--version`-style reporting.

use std::fs;
use std::path::Path;

fn main() {
    let build_file = Path::new("BUILD");
    let current_build = fs::read_to_string(build_file)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0);

    let new_build = current_build + 1;

    if let Err(e) = fs::write(build_file, new_build.to_string()) {
        println!("cargo:warning=Failed to update BUILD file: {}", e);
    }

    println!("cargo:rustc-env=UE_RETARGET_BUILD_NUMBER={}", new_build);
    println!("cargo:rerun-if-changed=BUILD");
    println!("cargo:rerun-if-changed=src");
}
