use std::{env, path::PathBuf};

fn main() {
    if env::var_os("CARGO_FEATURE_ASDK").is_some() {
        if let Some(lib_dir) = env::var_os("ASDK_LIB_DIR") {
            println!(
                "cargo:rustc-link-search=native={}",
                PathBuf::from(lib_dir).display()
            );
        } else {
            println!("cargo:warning=alpao-dm: ASDK_LIB_DIR is not set, looking for libasdk in the default paths");
        }
    }
    if env::var_os("CARGO_FEATURE_MILK").is_some() {
        let milk_root = env::var_os("MILK_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join("milk")))
            .unwrap_or_else(|| PathBuf::from("milk"));
        cc::Build::new()
            .file("csrc/milk_shim.c")
            .include(milk_root.join("src").join("ImageStreamIO"))
            .include(milk_root.join("include").join("ImageStreamIO"))
            .compile("milkshim");
        println!(
            "cargo:rustc-link-search=native={}",
            milk_root.join("lib").display()
        );
        println!("cargo:rustc-link-lib=imagestreamio");
        println!("cargo:rerun-if-changed=csrc/milk_shim.c");
    }
    println!("cargo:rerun-if-env-changed=ASDK_LIB_DIR");
    println!("cargo:rerun-if-env-changed=MILK_ROOT");
    println!("cargo:rerun-if-changed=build.rs");
}
