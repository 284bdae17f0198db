use std::time::{SystemTime, UNIX_EPOCH};

// Display version comes from the package; the build number is a millisecond
// timestamp.
fn main() {
    let build_n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    println!("cargo:rustc-env=SYNBIO_BUILD_N={build_n}");
    println!("cargo:rustc-env=SYNBIO_DISPLAY_VERSION={version}");
}
