/// Build script for fdrsim
/// Stamps version metadata into stored results and `fdrsim version`.

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=.git/HEAD");

    if let Ok(version) = std::env::var("CARGO_PKG_VERSION") {
        println!("cargo:rustc-env=FDRSIM_VERSION={version}");
    }

    // Unknown outside a git checkout
    let hash = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |hash| hash.trim().to_string());
    println!("cargo:rustc-env=FDRSIM_GIT_HASH={hash}");
}
