use std::env;
use std::path::PathBuf;

const MIN_VERSION: &str = "0.1.0";

fn main() {
    println!("cargo:rerun-if-env-changed=LIBLEVIN_LIB_DIR");
    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("LIBLEVIN_LIB_DIR").map(PathBuf::from) {
        println!("cargo:rustc-link-search=native={}", dir.display());
        println!("cargo:rustc-link-lib=levin");
        return;
    }

    if let Err(err) = pkg_config::Config::new()
        .atleast_version(MIN_VERSION)
        .probe("liblevin")
    {
        eprintln!("liblevin not found via pkg-config: {err}");
        std::process::exit(1);
    }
}
