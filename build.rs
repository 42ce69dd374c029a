//! Build script: checks for the Metal shader compiler when `metal` is enabled.

fn main() {
    println!("cargo::rustc-check-cfg=cfg(missing_metal_toolchain)");

    // mistralrs compiles .metal shaders at build time. Without `xcrun metal`
    // the failure surfaces deep inside mistralrs-quant, so report it here.
    #[cfg(all(feature = "metal", target_os = "macos"))]
    {
        let found = std::process::Command::new("xcrun")
            .args(["metal", "--version"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if !found {
            println!(
                "cargo::warning=Metal Toolchain not found. Install it with: \
                 xcodebuild -downloadComponent MetalToolchain"
            );
            println!("cargo::rustc-cfg=missing_metal_toolchain");
        }
    }
}
