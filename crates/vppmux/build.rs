// Stamps the target triple and cargo profile into `vppmux version --extended`.
fn main() {
    for (var, key) in [
        ("TARGET", "VPPMUX_BUILD_TARGET"),
        ("PROFILE", "VPPMUX_BUILD_PROFILE"),
    ] {
        println!("cargo:rerun-if-env-changed={var}");
        let value = std::env::var(var).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={key}={value}");
    }
}
